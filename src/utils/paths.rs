use crate::utils::errors::{Result, ZcertError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ZcertPaths;
const PROGRAM_NAME: &str = "zcert";
const CONFIG_FILE_NAME: &str = "zcert.yml";

impl ZcertPaths {
    /// Get the base data directory: ~/.local/share/zcert/
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join(PROGRAM_NAME))
            .ok_or_else(|| ZcertError::Config("Cannot determine local data directory".to_string()))
    }

    /// Get the config directory: ~/.config/zcert/
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(PROGRAM_NAME))
            .ok_or_else(|| ZcertError::Config("Cannot determine config directory".to_string()))
    }

    /// Config file in the working directory: ./zcert.yml
    pub fn local_config_file() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }

    /// Per-user config file: ~/.config/zcert/zcert.yml
    pub fn user_config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Default authority directory: ~/.local/share/zcert/
    pub fn default_storage_dir() -> Result<PathBuf> {
        Self::data_dir()
    }

    /// Ensure a directory exists with proper permissions
    pub fn ensure_dir_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;

            // Restrictive permissions on authority and config directories (700)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(path)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(path, perms)?;
            }
        }
        Ok(())
    }

    /// Create `path` (which must not exist) with `mode` and write `contents`
    pub fn write_new_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(path).map_err(|e| {
            ZcertError::Storage(format!("cannot create {}: {e}", path.display()))
        })?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }

    /// Remove `path` when `force` is set, otherwise refuse if it exists
    pub fn clear_existing(path: &Path, force: bool) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        if !force {
            return Err(ZcertError::InvalidInput(format!(
                "file {} already exists! will not proceed without --force",
                path.display()
            )));
        }
        tracing::debug!("removing existing {}", path.display());
        fs::remove_file(path)?;
        Ok(())
    }
}
