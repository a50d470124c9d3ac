//! Persisted per-installation identity.
//!
//! The receiver recognises a returning player by the id sent in `login`, so
//! the id must survive restarts and reconnects.  It is a v4 UUID generated
//! the first time the store is opened and written to `install_id` in the
//! config directory; every later open reads it back unchanged.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::transport::IdentityProvider;
use crate::infrastructure::storage::config::{config_dir, ConfigError};

/// File name of the identity file inside the config directory.
pub const IDENTITY_FILE_NAME: &str = "install_id";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error accessing identity at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a UUID.  It is left untouched so a
    /// damaged id is never silently replaced.
    #[error("identity file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: uuid::Error,
    },
}

/// File-backed [`IdentityProvider`].
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
    id: Uuid,
}

impl FileIdentityStore {
    /// Opens the identity file in the platform config directory.
    ///
    /// # Errors
    ///
    /// See [`FileIdentityStore::open`].
    pub fn open_default() -> Result<Self, IdentityError> {
        Self::open(&config_dir()?.join(IDENTITY_FILE_NAME))
    }

    /// Reads the id stored at `path`, generating and persisting a new one if
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Io`] on file-system failures and
    /// [`IdentityError::Corrupt`] if the file holds something other than a
    /// UUID.
    pub fn open(path: &Path) -> Result<Self, IdentityError> {
        let io_err = |source: std::io::Error| IdentityError::Io {
            path: path.to_path_buf(),
            source,
        };

        let id = match std::fs::read_to_string(path) {
            Ok(content) => Uuid::parse_str(content.trim()).map_err(|source| {
                IdentityError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let id = Uuid::new_v4();
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).map_err(io_err)?;
                }
                std::fs::write(path, id.to_string()).map_err(io_err)?;
                info!("generated new install id at {}", path.display());
                id
            }
            Err(e) => return Err(io_err(e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            id,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl IdentityProvider for FileIdentityStore {
    fn install_id(&self) -> String {
        self.id.to_string()
    }
}
