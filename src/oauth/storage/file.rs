//! File-based credential storage with secure permissions.
//!
//! Each user gets one JSON file named after the URL-safe base64 encoding of
//! the user identifier:
//! - File permissions set to 0600 on Unix (owner read/write only)
//! - Directory held at 0700, re-applied on every write
//! - Atomic writes via a uniquely named temp file + rename

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{debug, instrument};

use super::{validate_user_id, CredentialStore};
use crate::oauth::error::StoreError;
use crate::oauth::token::Credential;

/// File permissions for credential files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Credentials directory under the user data directory.
const APP_DIR: &str = "oauth2client";
const CREDENTIALS_DIR: &str = "credentials";

/// File-based credential storage.
///
/// # Layout
///
/// ```text
/// {dir}/
///   YWxpY2U.json      <- "alice"
///   Ym9i.json         <- "bob"
/// ```
///
/// Separate files mean writes for different users never touch each other's
/// records.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Create a store rooted at `dir`. `~` is expanded to the home directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = expand_tilde(dir.as_ref())?;
        Ok(Self { dir })
    }

    /// Default location: `{data_dir}/oauth2client/credentials`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join(CREDENTIALS_DIR))
    }

    /// Create a store at [`FileCredentialStore::default_dir`].
    pub fn app_data() -> Result<Self, StoreError> {
        let dir = Self::default_dir().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "cannot determine user data directory",
            ))
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the credential files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `user_id`.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(user_id.as_bytes())))
    }

    /// Create the directory if needed and tighten it to owner-only access.
    ///
    /// Runs on every write so a pre-existing or user-supplied directory is
    /// corrected too.
    async fn ensure_dir(&self) -> Result<(), StoreError> {
        if !tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::create_dir_all(&self.dir).await?;
            debug!(dir = %self.dir.display(), "Created credential directory");
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(DIR_MODE);
            tokio::fs::set_permissions(&self.dir, perms).await?;
        }

        Ok(())
    }

    /// Write `content` to `path` through a temp file in the same directory.
    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), StoreError> {
        let temp_path = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(e) = write_private(&temp_path, content).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Create `path` exclusively, owner-only from the first byte on Unix.
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[instrument(skip(self, credential), fields(backend = "file"))]
    async fn put(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError> {
        validate_user_id(user_id)?;
        self.ensure_dir().await?;

        let content = serde_json::to_vec_pretty(credential)
            .map_err(|e| StoreError::corrupt(user_id, e))?;
        self.write_atomic(&self.path_for(user_id), &content).await?;

        debug!("Stored credential");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        validate_user_id(user_id)?;

        let content = match tokio::fs::read(self.path_for(user_id)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credential = serde_json::from_slice(&content)
            .map_err(|e| StoreError::corrupt(user_id, e))?;
        Ok(Some(credential))
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        validate_user_id(user_id)?;

        match tokio::fs::remove_file(self.path_for(user_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        validate_user_id(user_id)?;
        Ok(tokio::fs::try_exists(self.path_for(user_id)).await?)
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Expand `~` prefix to user's home directory.
fn expand_tilde(path: &Path) -> Result<PathBuf, StoreError> {
    let path_str = path.to_string_lossy();
    match path_str.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().ok_or_else(|| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cannot determine home directory",
                ))
            })?;
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            Ok(if rest.is_empty() { home } else { home.join(rest) })
        }
        None => Ok(path.to_path_buf()),
    }
}
