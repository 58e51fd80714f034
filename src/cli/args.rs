use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "zcert")]
#[command(version)]
#[command(about = "A small certificate authority that signs CSRs over a MAC-authenticated HTTP API")]
#[command(long_about = None)]
pub struct Cli {
    /// Config file path (default: ./zcert.yml, then ~/.config/zcert/zcert.yml)
    #[arg(long, short = 'c', env = "ZCERT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Shared secret used to authenticate requests and responses
    #[arg(long, env = "ZCERT_AUTHKEY", hide_env_values = true, global = true)]
    pub authkey: Option<String>,

    /// Server base URL for client commands
    #[arg(long, env = "ZCERT_SERVER", global = true)]
    pub server: Option<String>,

    /// Enable verbose logging (repeat for more verbosity: -v INFO, -vv DEBUG, -vvv TRACE)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output raw tab-separated values (no formatting)
    #[arg(short, long, global = true)]
    pub raw: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the certificate authority key and certificate
    Init {
        /// CA common name (default: ca.name from the config)
        #[arg(long)]
        name: Option<String>,
        /// Validity of the CA certificate
        #[arg(long, default_value = "365d", value_parser = humantime::parse_duration)]
        lifetime: Duration,
        /// Replace an existing ca.crt and ca.key
        #[arg(long)]
        force: bool,
    },
    /// Serve GET /ca and POST /sign
    Server {
        /// Bind address (default: listen from the config)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Shared secret management
    Authkey {
        #[command(subcommand)]
        command: AuthkeyCommands,
    },
    /// Talk to a zcert server
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },
    /// Issuance audit records
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },
    /// Generate shell completion scripts
    Completion {
        #[command(subcommand)]
        command: CompletionCommands,
    },
    /// Internal completion helpers (hidden)
    #[command(hide = true)]
    CompletionHelper {
        #[command(subcommand)]
        command: CompletionHelperCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthkeyCommands {
    /// Generate a random 32 character key
    Generate {
        /// Store the key in the config file instead of printing it
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
pub enum ClientCommands {
    /// Send a CSR to the server and write the signed certificate
    Sign {
        /// PEM certificate request, `-` for stdin
        #[arg(long = "in", short = 'i', default_value = "-", value_hint = clap::ValueHint::FilePath)]
        input: String,
        /// Where to write the certificate, `-` for stdout
        #[arg(long, short = 'o', default_value = "-", value_hint = clap::ValueHint::FilePath)]
        out: String,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
        /// Requested certificate lifetime
        #[arg(long, default_value = "8760h", value_parser = humantime::parse_duration)]
        lifetime: Duration,
        /// Request the clientAuth extended key usage
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        client_auth: bool,
        /// Request the serverAuth extended key usage
        #[arg(long)]
        server_auth: bool,
    },
    /// Fetch the authority certificate
    Ca {
        /// Where to write the certificate, `-` for stdout
        #[arg(long, short = 'o', default_value = "-", value_hint = clap::ValueHint::FilePath)]
        out: String,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum RecordsCommands {
    /// List every issued certificate in serial order
    List {
        /// Columns to display (comma-separated): serial,serial_hex,subject,issuer,not_before,not_after,expired
        #[arg(long)]
        columns: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CompletionCommands {
    /// Generate bash completion script
    Bash,
    /// Generate zsh completion script
    Zsh,
    /// Generate fish completion script
    Fish,
    /// Generate PowerShell completion script
    PowerShell,
}

impl CompletionCommands {
    pub fn shell(&self) -> Shell {
        match self {
            CompletionCommands::Bash => Shell::Bash,
            CompletionCommands::Zsh => Shell::Zsh,
            CompletionCommands::Fish => Shell::Fish,
            CompletionCommands::PowerShell => Shell::PowerShell,
        }
    }
}

#[derive(Subcommand)]
pub enum CompletionHelperCommands {
    /// List record columns for completion
    Columns,
}
