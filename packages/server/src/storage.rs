//! Storage rotation: picks the storage account for each upload and keeps
//! the local usage estimate in step with what was sent to the provider.
//!
//! Selection reads usage, uploads, then writes usage back with no
//! reservation in between. Two concurrent uploads can therefore pick the
//! same account and together overshoot it; the per-file cap and the usage
//! margin keep that overshoot small.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::storage::{Credential, RemoteStorage, StorageError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::entity::storage_account;
use crate::error::ServiceError;

/// An account must have at least this much free space to be selected.
pub const MIN_FREE_GB: f64 = 0.1;

/// No single file may take more than this share of an account's limit.
pub const MAX_FILE_SHARE: f64 = 0.10;

/// Usage is bumped by file size times this factor to cover provider overhead.
pub const USAGE_SAFETY_MARGIN: f64 = 1.05;

/// Expiry assumed when the provider's value cannot be parsed.
pub const DEFAULT_LINK_TTL_HOURS: i64 = 24;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

/// The active account with the most free space, if any has at least
/// [`MIN_FREE_GB`]. On equal free space the earlier account wins.
pub fn pick_account(accounts: &[storage_account::Model]) -> Option<&storage_account::Model> {
    accounts
        .iter()
        .filter(|a| a.is_active && a.free_gb() >= MIN_FREE_GB)
        .fold(None, |best: Option<&storage_account::Model>, candidate| {
            match best {
                Some(b) if b.free_gb() >= candidate.free_gb() => Some(b),
                _ => Some(candidate),
            }
        })
}

/// Parse a provider expiry (RFC 1123 / RFC 2822, or RFC 3339), falling back
/// to `now + 24h`.
pub fn parse_expiry(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.map(str::trim)
        .and_then(|raw| {
            DateTime::parse_from_rfc2822(raw)
                .or_else(|_| DateTime::parse_from_rfc3339(raw))
                .ok()
        })
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(|| now + chrono::Duration::hours(DEFAULT_LINK_TTL_HOURS))
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// The account as it was when selected, before the usage bump.
    pub account: storage_account::Model,
    pub remote_file_id: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct StorageRotator {
    catalog: Arc<dyn CatalogStore>,
    provider: Arc<dyn RemoteStorage>,
    upload_timeout: Duration,
    link_timeout: Duration,
}

/// Run a provider call under a deadline and a cancellation token.
async fn guarded<T, F>(
    fut: F,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = tokio::time::timeout(timeout, fut) => {
            result.map_err(|_| StorageError::TimedOut(timeout))?
        }
    }
}

impl StorageRotator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        provider: Arc<dyn RemoteStorage>,
        upload_timeout: Duration,
        link_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            provider,
            upload_timeout,
            link_timeout,
        }
    }

    /// The active account with the most free space.
    pub async fn select_account(&self) -> Result<storage_account::Model, ServiceError> {
        let accounts = self.catalog.list_storage_accounts(true).await?;
        pick_account(&accounts)
            .cloned()
            .ok_or(ServiceError::NoCapacityAvailable {
                min_free_gb: MIN_FREE_GB,
            })
    }

    /// Look up an account by ID, for link resolution.
    pub async fn account(&self, id: Uuid) -> Result<storage_account::Model, ServiceError> {
        self.catalog
            .get_storage_account(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("storage account {id}")))
    }

    /// Upload `data` to the best account and record the added usage.
    ///
    /// Nothing is recorded when the upload fails, times out or is cancelled.
    /// A failure to record usage after a successful upload is logged and
    /// ignored: the file exists remotely and the estimate under-counts.
    #[instrument(skip(self, data, cancel))]
    pub async fn upload(
        &self,
        data: Vec<u8>,
        filename: &str,
        size_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, ServiceError> {
        let file_gb = bytes_to_gb(size_bytes);
        let account = self.select_account().await?;

        let available_gb = account.free_gb();
        if file_gb > available_gb {
            return Err(ServiceError::InsufficientStorage {
                account: account.account_name.clone(),
                file_gb,
                available_gb,
            });
        }

        let max_gb = account.storage_limit_gb * MAX_FILE_SHARE;
        if file_gb > max_gb {
            return Err(ServiceError::FileTooLarge {
                account: account.account_name.clone(),
                file_gb,
                max_gb,
            });
        }

        let credential = account.credential();
        let stored = guarded(
            self.provider.upload_file(&credential, data, filename),
            self.upload_timeout,
            cancel,
        )
        .await
        .map_err(ServiceError::UploadFailed)?;

        let used_gb = account.storage_used_gb + file_gb * USAGE_SAFETY_MARGIN;
        match self.catalog.update_storage_used(account.id, used_gb).await {
            Ok(()) => info!(
                account = %account.account_name,
                remote_file_id = %stored.remote_file_id,
                used_gb,
                "Upload stored"
            ),
            Err(e) => warn!(
                account = %account.account_name,
                remote_file_id = %stored.remote_file_id,
                error = %e,
                "Upload stored but usage bookkeeping failed, estimate now under-counts"
            ),
        }

        Ok(UploadReceipt {
            account,
            remote_file_id: stored.remote_file_id,
            content_hash: stored.content_hash,
        })
    }

    /// Ask the provider for a fresh direct URL. No local state changes.
    pub async fn resolve_link(
        &self,
        remote_file_id: &str,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<ResolvedLink, ServiceError> {
        let link = guarded(
            self.provider.get_file_link(credential, remote_file_id),
            self.link_timeout,
            cancel,
        )
        .await
        .map_err(ServiceError::LinkResolutionFailed)?;

        Ok(ResolvedLink {
            expires_at: parse_expiry(link.expires_raw.as_deref(), Utc::now()),
            url: link.url,
        })
    }
}
