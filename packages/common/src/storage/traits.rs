use std::fmt;

use async_trait::async_trait;

use super::error::StorageError;

/// Opaque provider credential for one storage account.
///
/// `Debug` redacts the secret and the type has no `Serialize` impl.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building provider requests.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A file accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Provider-side file identifier.
    pub remote_file_id: String,
    /// Provider-reported content checksum.
    pub content_hash: String,
}

/// A time-limited direct URL for a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLink {
    pub url: String,
    /// Expiry exactly as the provider reported it. Parsing is the caller's
    /// concern; providers differ and some omit it.
    pub expires_raw: Option<String>,
}

/// Third-party storage that hosts video source files.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Upload `data` as `filename` into the account behind `credential`.
    async fn upload_file(
        &self,
        credential: &Credential,
        data: Vec<u8>,
        filename: &str,
    ) -> Result<StoredFile, StorageError>;

    /// Ask the provider for a fresh streaming URL.
    async fn get_file_link(
        &self,
        credential: &Credential,
        remote_file_id: &str,
    ) -> Result<RemoteLink, StorageError>;
}
