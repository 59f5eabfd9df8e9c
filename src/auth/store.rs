use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::AuthError;
use super::token::Credential;

/// File name of the shared credential file inside the tool directory.
pub const CREDENTIAL_FILE_NAME: &str = "custom_oauth_credentials.json";

/// JSON file holding exactly one [`Credential`].
///
/// The store does no locking of its own; callers wrap every read/write in a
/// [`CrossProcessLock`](super::lock::CrossProcessLock).
///
/// # Example
/// ```no_run
/// use custom_oauth::auth::{Credential, CredentialStore};
///
/// # async fn example() -> Result<(), custom_oauth::auth::AuthError> {
/// let store = CredentialStore::new("/tmp/custom_oauth_credentials.json");
/// store.write(&Credential::default()).await?;
/// assert!(store.read().await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential.
    ///
    /// A missing or blank file is `Ok(None)`. Contents that do not parse as a
    /// credential are an error, never `None`.
    pub async fn read(&self) -> Result<Option<Credential>, AuthError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| AuthError::CorruptStore {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }

    /// Replace the file's contents with `credential`.
    ///
    /// The new contents are written to a sibling temp file and renamed into
    /// place, so readers never see a partial document.
    pub async fn write(&self, credential: &Credential) -> Result<(), AuthError> {
        let serialized = serde_json::to_vec_pretty(credential)?;
        ensure_parent(&self.path).await?;

        let file_name = self.path.file_name().ok_or_else(|| {
            AuthError::Configuration(format!(
                "Credential path {} has no file name",
                self.path.display()
            ))
        })?;
        let temp_path = self.path.with_file_name(format!(
            ".{}.tmp-{}",
            file_name.to_string_lossy(),
            uuid::Uuid::new_v4().simple()
        ));

        if let Err(err) = write_private(&temp_path, &serialized).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        Ok(())
    }
}

pub(crate) async fn ensure_parent(path: &Path) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, CredentialStore) {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join(CREDENTIAL_FILE_NAME));
        (dir, store)
    }

    fn sample() -> Credential {
        Credential {
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            expiry_date: Some(1_750_000_000_000),
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_absent() {
        let (_dir, store) = temp_store();
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_file_reads_as_absent() {
        let (_dir, store) = temp_store();
        ensure_parent(store.path()).await.unwrap();
        std::fs::write(store.path(), "").unwrap();
        assert!(store.read().await.unwrap().is_none());
        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let (_dir, store) = temp_store();
        ensure_parent(store.path()).await.unwrap();
        std::fs::write(store.path(), "{not-json").unwrap();
        let err = store.read().await.unwrap_err();
        assert!(matches!(err, AuthError::CorruptStore { .. }));
    }

    #[tokio::test]
    async fn write_replaces_whole_file() {
        let (_dir, store) = temp_store();
        store.write(&sample()).await.unwrap();
        let replacement = Credential {
            access_token: Some("second".to_string()),
            ..Credential::default()
        };
        store.write(&replacement).await.unwrap();
        assert_eq!(store.read().await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files() {
        let (dir, store) = temp_store();
        store.write(&sample()).await.unwrap();
        let has_tmp = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .any(|name| name.contains(".tmp-"));
        assert!(!has_tmp);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.write(&sample()).await.unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
