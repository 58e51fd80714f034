use crate::cert::authority::authority_files;
use crate::cert::{
    initialize_authority, AuthorityIdentity, AuthorityOptions, CertificateAuthority,
    CertificateParser, IssuanceParams, RecordColumn,
};
use crate::cli::args::*;
use crate::cli::completions::{handle_completion_command, handle_completion_helper_command};
use crate::client::ZcertClient;
use crate::crypto::AuthKey;
use crate::server::{serve, SigningService};
use crate::storage::{JsonlRecordStore, RecordStore};
use crate::utils::config::Config;
use crate::utils::errors::{Result, ZcertError};
use crate::utils::output::{build_table_data, OutputFormat};
use crate::utils::paths::ZcertPaths;
use crate::utils::pem::{decode_pem, CSR_TAG};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub async fn handle_command(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(authkey) = cli.authkey.clone() {
        config.authkey = Some(authkey);
    }
    if let Some(server) = cli.server.clone() {
        config.server = server;
    }

    init_logging(cli.verbose, cli.quiet, config.loglevel.as_deref());
    if let Some(source) = &config.source {
        tracing::debug!("using config {}", source.display());
    }

    let output = OutputFormat::new(cli.raw);

    match cli.command {
        Commands::Init {
            name,
            lifetime,
            force,
        } => handle_init(&config, name, lifetime, force, &output),
        Commands::Server { listen } => handle_server(config, listen).await,
        Commands::Authkey { command } => handle_authkey_command(command, config),
        Commands::Client { command } => handle_client_command(command, &config).await,
        Commands::Records { command } => handle_records_command(command, &config, &output),
        Commands::Completion { ref command } => handle_completion_command(command),
        Commands::CompletionHelper { ref command } => handle_completion_helper_command(command),
    }
}

/// Log to stderr; `RUST_LOG` wins over `-v` and the configured level
fn init_logging(verbose: u8, quiet: bool, configured: Option<&str>) {
    if quiet {
        return;
    }

    let level = match verbose {
        0 => configured.unwrap_or("warn"), // Default: warnings only
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zcert={level},tower_http={level}")));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

fn handle_init(
    config: &Config,
    name: Option<String>,
    lifetime: Duration,
    force: bool,
    output: &OutputFormat,
) -> Result<()> {
    let common_name = name.or_else(|| config.ca.name.clone()).unwrap_or_default();
    let dir = config.storage_dir()?;
    // refuse before the record store is created on disk
    let (cert_path, key_path) = authority_files(&dir);
    for path in [&key_path, &cert_path] {
        refuse_existing(path, force)?;
    }
    ZcertPaths::ensure_dir_exists(&dir)?;
    let records = JsonlRecordStore::open(config.database_path()?)?;

    let identity = initialize_authority(
        &AuthorityOptions {
            dir: &dir,
            common_name: &common_name,
            lifetime,
            force,
        },
        &records,
    )?;

    let summary = CertificateParser::parse_pem(identity.certificate_pem())?;
    eprintln!("Created certificate authority");
    output.print_key_value(&[
        ("Subject", identity.subject().to_string()),
        ("Serial", summary.serial.as_colon_hex()),
        ("Expires", summary.not_after.format("%Y-%m-%d %H:%M UTC").to_string()),
        ("Directory", dir.display().to_string()),
        ("Records", records.path().display().to_string()),
    ]);
    Ok(())
}

async fn handle_server(config: Config, listen: Option<String>) -> Result<()> {
    let secret = config.auth_key()?;
    let listen = match listen {
        Some(addr) => addr
            .parse()
            .map_err(|e| ZcertError::InvalidInput(format!("invalid listen address {addr}: {e}")))?,
        None => config.listen_addr()?,
    };

    let identity = AuthorityIdentity::load(&config.storage_dir()?)?;
    let records: Arc<dyn RecordStore> = Arc::new(JsonlRecordStore::open(config.database_path()?)?);
    let authority = CertificateAuthority::new(identity, records)?;
    tracing::info!(
        "next serial will be {}",
        authority.serials().current() + 1
    );

    let service = SigningService::new(secret, authority, config.request_timeout);
    serve(Arc::new(service), listen).await
}

fn handle_authkey_command(command: AuthkeyCommands, mut config: Config) -> Result<()> {
    match command {
        AuthkeyCommands::Generate { save } => {
            let key = AuthKey::generate();
            if save {
                config.authkey = Some(key);
                let path = config.save()?;
                println!("authkey saved to {}", path.display());
            } else {
                println!("{key}");
            }
            Ok(())
        }
    }
}

async fn handle_client_command(command: ClientCommands, config: &Config) -> Result<()> {
    let client = ZcertClient::new(&config.server, config.auth_key()?, config.request_timeout)?;

    match command {
        ClientCommands::Sign {
            input,
            out,
            force,
            lifetime,
            client_auth,
            server_auth,
        } => {
            // check before talking to the server so a signed cert is never thrown away
            if out != "-" {
                refuse_existing(Path::new(&out), force)?;
            }

            let csr_pem = read_input(&input)?;
            let csr_der = decode_pem(&csr_pem, CSR_TAG)?;
            let params = IssuanceParams {
                lifetime,
                client_auth,
                server_auth,
            };

            let pem = client.sign(&csr_der, params).await?;
            let summary = CertificateParser::parse_pem(&pem)?;
            tracing::info!(
                "received certificate {} for {} from {}",
                summary.serial.as_colon_hex(),
                summary.subject,
                client.server()
            );
            write_output(&out, &pem, force)
        }
        ClientCommands::Ca { out, force } => {
            if out != "-" {
                refuse_existing(Path::new(&out), force)?;
            }
            let pem = client.ca().await?;
            write_output(&out, &pem, force)
        }
    }
}

fn handle_records_command(
    command: RecordsCommands,
    config: &Config,
    output: &OutputFormat,
) -> Result<()> {
    match command {
        RecordsCommands::List { columns } => {
            let path = config.database_path()?;
            if !path.exists() {
                return Err(ZcertError::Storage(format!(
                    "no record store at {} (did you run `zcert init`?)",
                    path.display()
                )));
            }
            let records = JsonlRecordStore::open(&path)?.list()?;

            let columns = match columns {
                Some(list) => RecordColumn::parse_list(&list).map_err(ZcertError::InvalidInput)?,
                None => RecordColumn::defaults(),
            };

            if records.is_empty() {
                eprintln!("No records found");
                return Ok(());
            }

            let mut table: Vec<Vec<String>> = Vec::with_capacity(records.len() + 1);
            if !output.raw {
                table.push(columns.iter().map(|c| c.header().to_string()).collect());
            }
            table.extend(build_table_data(&records, &columns));
            output.print_table(&table);
            Ok(())
        }
    }
}

fn refuse_existing(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ZcertError::InvalidInput(format!(
            "file {} already exists! will not proceed without --force",
            path.display()
        )));
    }
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }
    fs::read_to_string(input)
        .map_err(|e| ZcertError::InvalidInput(format!("cannot read {input}: {e}")))
}

fn write_output(out: &str, pem: &str, force: bool) -> Result<()> {
    if out == "-" {
        io::stdout().write_all(pem.as_bytes())?;
        return Ok(());
    }

    let path = Path::new(out);
    ZcertPaths::clear_existing(path, force)?;
    ZcertPaths::write_new_file(path, pem.as_bytes(), 0o644)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::authority::DEFAULT_CA_LIFETIME;

    #[test]
    fn test_refuse_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.crt");
        assert!(refuse_existing(&path, false).is_ok());

        fs::write(&path, "old").unwrap();
        assert!(matches!(
            refuse_existing(&path, false),
            Err(ZcertError::InvalidInput(_))
        ));
        assert!(refuse_existing(&path, true).is_ok());
    }

    #[test]
    fn test_write_output_replaces_with_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.crt");
        let out = path.to_str().unwrap();

        write_output(out, "first", false).unwrap();
        assert!(write_output(out, "second", false).is_err());
        write_output(out, "second", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_init_then_list_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.path = Some(dir.path().join("authority"));
        config.ca.name = Some("Records Test CA".to_string());

        handle_init(&config, None, DEFAULT_CA_LIFETIME, false, &OutputFormat::new(true)).unwrap();
        assert!(handle_init(&config, None, DEFAULT_CA_LIFETIME, false, &OutputFormat::new(true)).is_err());

        let records = JsonlRecordStore::open(config.database_path().unwrap())
            .unwrap()
            .list()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "CN=Records Test CA");
        assert!(handle_records_command(
            RecordsCommands::List { columns: None },
            &config,
            &OutputFormat::new(true)
        )
        .is_ok());
    }

    #[test]
    fn test_init_refusal_leaves_no_record_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ca.crt"), "existing").unwrap();
        let mut config = Config::default();
        config.storage.path = Some(dir.path().to_path_buf());
        config.ca.name = Some("Refused CA".to_string());

        assert!(matches!(
            handle_init(&config, None, DEFAULT_CA_LIFETIME, false, &OutputFormat::new(true)),
            Err(ZcertError::InvalidInput(_))
        ));
        assert!(!config.database_path().unwrap().exists());
        assert_eq!(fs::read_to_string(dir.path().join("ca.crt")).unwrap(), "existing");
    }

    #[test]
    fn test_init_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.path = Some(dir.path().to_path_buf());
        assert!(matches!(
            handle_init(&config, None, DEFAULT_CA_LIFETIME, false, &OutputFormat::new(true)),
            Err(ZcertError::Config(_))
        ));
    }
}
