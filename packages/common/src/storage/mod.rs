//! Remote storage accounts: the provider contract and its implementations.

mod error;
mod traits;

pub mod local;
#[cfg(feature = "http-provider")]
pub mod pcloud;

pub use error::StorageError;
pub use traits::{Credential, RemoteLink, RemoteStorage, StoredFile};
