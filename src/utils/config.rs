use crate::crypto::AuthKey;
use crate::server::DEFAULT_REQUEST_TIMEOUT;
use crate::utils::errors::{Result, ZcertError};
use crate::utils::paths::ZcertPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE: &str = "records.jsonl";

/// Settings read from `zcert.yml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authkey: Option<String>,
    pub server: String,
    pub listen: String,
    #[serde(with = "timeout_format")]
    pub request_timeout: Duration,
    pub storage: StorageConfig,
    pub ca: CaConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<String>,

    /// Where this config was read from, and where `save` writes it
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub database: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authkey: None,
            server: crate::client::DEFAULT_SERVER.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            storage: StorageConfig::default(),
            ca: CaConfig::default(),
            loglevel: None,
            source: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl Config {
    /// Load from `explicit` if given, else `./zcert.yml`, else the user config file.
    ///
    /// An explicit path must exist; otherwise a missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ZcertError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Self::load_from(path);
        }

        let user = ZcertPaths::user_config_file().ok();
        let candidates: Vec<PathBuf> = std::iter::once(ZcertPaths::local_config_file())
            .chain(user.clone())
            .collect();

        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(path),
            None => {
                tracing::debug!("no config file found in {candidates:?}, using defaults");
                Ok(Self {
                    source: user,
                    ..Self::default()
                })
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ZcertError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                ZcertError::Config(format!("cannot parse config {}: {e}", path.display()))
            })?
        };
        config.source = Some(path.to_path_buf());
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config back to the file it was loaded from
    pub fn save(&self) -> Result<PathBuf> {
        let path = match &self.source {
            Some(path) => path.clone(),
            None => ZcertPaths::user_config_file()?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ZcertPaths::ensure_dir_exists(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(&path, yaml)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("saved config to {}", path.display());
        Ok(path)
    }

    /// The shared secret; absent or empty is a configuration error
    pub fn auth_key(&self) -> Result<AuthKey> {
        match self.authkey.as_deref() {
            Some(key) => AuthKey::new(key),
            None => Err(ZcertError::Config(
                "no authkey configured! generate one with `zcert authkey generate --save`"
                    .to_string(),
            )),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| ZcertError::Config(format!("invalid listen address {}: {e}", self.listen)))
    }

    /// Authority directory holding `ca.crt`, `ca.key` and the record store
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => ZcertPaths::default_storage_dir(),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.storage_dir()?.join(&self.storage.database))
    }
}

mod timeout_format {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*timeout))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}
