use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;

use super::error::StorageError;
use super::traits::{Credential, RemoteLink, RemoteStorage, StoredFile};

/// Development backend that stores files on local disk.
///
/// Each credential names an account directory. Files inside it are
/// content-addressed in a Git-style sharded layout:
/// `{base_path}/{credential}/{first 2 hex chars}/{remaining 62 hex chars}`.
/// The file ID is the SHA-256 hex digest, which doubles as the content hash.
pub struct LocalStorage {
    base_path: PathBuf,
    public_url: String,
    link_ttl: Duration,
}

impl LocalStorage {
    pub async fn new(
        base_path: PathBuf,
        public_url: impl Into<String>,
        link_ttl: Duration,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            link_ttl,
        })
    }

    fn account_dir(&self, credential: &Credential) -> Result<PathBuf, StorageError> {
        let name = credential.expose();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidCredential(
                "local account names may only contain [A-Za-z0-9_-]".into(),
            ));
        }
        Ok(self.base_path.join(name))
    }

    fn relative_path(file_id: &str) -> Result<PathBuf, StorageError> {
        if file_id.len() != 64 || !file_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::NotFound(file_id.to_string()));
        }
        Ok(Path::new(&file_id[..2]).join(&file_id[2..]))
    }
}

#[async_trait]
impl RemoteStorage for LocalStorage {
    async fn upload_file(
        &self,
        credential: &Credential,
        data: Vec<u8>,
        _filename: &str,
    ) -> Result<StoredFile, StorageError> {
        let account_dir = self.account_dir(credential)?;
        let digest = hex::encode(Sha256::digest(&data));
        let target = account_dir.join(Self::relative_path(&digest)?);

        if fs::try_exists(&target).await? {
            return Ok(StoredFile {
                remote_file_id: digest.clone(),
                content_hash: digest,
            });
        }

        let temp_path = self
            .base_path
            .join(".tmp")
            .join(format!("{digest}.{}", rand::random::<u32>()));
        if let Err(e) = fs::write(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(StoredFile {
            remote_file_id: digest.clone(),
            content_hash: digest,
        })
    }

    async fn get_file_link(
        &self,
        credential: &Credential,
        remote_file_id: &str,
    ) -> Result<RemoteLink, StorageError> {
        let relative = Self::relative_path(remote_file_id)?;
        let path = self.account_dir(credential)?.join(&relative);

        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(remote_file_id.to_string()));
        }

        let expires = Utc::now() + self.link_ttl;
        Ok(RemoteLink {
            url: format!(
                "{}/{}/{}/{}",
                self.public_url,
                credential.expose(),
                &remote_file_id[..2],
                &remote_file_id[2..]
            ),
            expires_raw: Some(expires.to_rfc2822()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_storage() -> (LocalStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(
            dir.path().join("videos"),
            "http://localhost/media/",
            Duration::hours(6),
        )
        .await
        .unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn upload_is_content_addressed_per_account() {
        let (storage, dir) = temp_storage().await;
        let account = Credential::new("acct-1");

        let first = storage
            .upload_file(&account, b"clip".to_vec(), "a.mp4")
            .await
            .unwrap();
        let again = storage
            .upload_file(&account, b"clip".to_vec(), "b.mp4")
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(first.remote_file_id.len(), 64);

        let on_disk = dir
            .path()
            .join("videos/acct-1")
            .join(&first.remote_file_id[..2])
            .join(&first.remote_file_id[2..]);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"clip");
    }

    #[tokio::test]
    async fn link_points_at_public_url_and_expires() {
        let (storage, _dir) = temp_storage().await;
        let account = Credential::new("acct-1");
        let stored = storage
            .upload_file(&account, b"video bytes".to_vec(), "v.mp4")
            .await
            .unwrap();

        let link = storage
            .get_file_link(&account, &stored.remote_file_id)
            .await
            .unwrap();

        assert!(link.url.starts_with("http://localhost/media/acct-1/"));
        let expires = chrono::DateTime::parse_from_rfc2822(link.expires_raw.as_deref().unwrap())
            .unwrap()
            .with_timezone(&Utc);
        assert!(expires > Utc::now() + Duration::hours(5));
    }

    #[tokio::test]
    async fn link_for_other_account_is_not_found() {
        let (storage, _dir) = temp_storage().await;
        let stored = storage
            .upload_file(&Credential::new("acct-1"), b"x".to_vec(), "x.mp4")
            .await
            .unwrap();

        let result = storage
            .get_file_link(&Credential::new("acct-2"), &stored.remote_file_id)
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn path_like_credentials_are_rejected() {
        let (storage, _dir) = temp_storage().await;
        let result = storage
            .upload_file(&Credential::new("../escape"), b"x".to_vec(), "x.mp4")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn malformed_file_id_is_not_found() {
        let (storage, _dir) = temp_storage().await;
        let result = storage
            .get_file_link(&Credential::new("acct-1"), "../../etc/passwd")
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
