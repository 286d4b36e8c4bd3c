//! Fixtures shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::storage::{Credential, RemoteLink, RemoteStorage, StorageError, StoredFile};
use uuid::Uuid;

use crate::entity::{storage_account, video};

pub fn video(published_at: Option<DateTime<Utc>>, views: i64, likes: i64) -> video::Model {
    let now = Utc::now();
    video::Model {
        id: Uuid::new_v4(),
        title: "clip".into(),
        description: String::new(),
        thumbnail_url: None,
        source_url: "https://cdn.example/clip.mp4".into(),
        source_url_expires_at: Some(now + chrono::Duration::hours(6)),
        duration_seconds: 120,
        file_size_bytes: 1024,
        remote_file_id: Some("42".into()),
        storage_account_id: None,
        category: None,
        tags: serde_json::json!([]),
        wrapper_token: Uuid::new_v4().simple().to_string(),
        view_count: views,
        like_count: likes,
        is_published: published_at.is_some(),
        published_at,
        created_at: now,
        updated_at: now,
    }
}

pub fn account(name: &str, used_gb: f64, limit_gb: f64) -> storage_account::Model {
    let now = Utc::now();
    storage_account::Model {
        id: Uuid::new_v4(),
        account_name: name.into(),
        api_token: format!("token-{name}"),
        storage_used_gb: used_gb,
        storage_limit_gb: limit_gb,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Scripted `RemoteStorage` that records what it was asked to do.
pub struct FakeStorage {
    pub uploads: AtomicU32,
    pub link_calls: AtomicU32,
    pub fail_uploads: AtomicBool,
    /// File IDs whose link resolution fails.
    pub failing_links: Mutex<Vec<String>>,
    /// `expires` value reported for every link.
    pub expires_raw: Mutex<Option<String>>,
    /// Artificial latency for every call.
    pub delay: Mutex<Duration>,
    /// Credentials seen by `upload_file`, in call order.
    pub upload_credentials: Mutex<Vec<String>>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self {
            uploads: AtomicU32::new(0),
            link_calls: AtomicU32::new(0),
            fail_uploads: AtomicBool::new(false),
            failing_links: Mutex::new(Vec::new()),
            expires_raw: Mutex::new(Some(
                (Utc::now() + chrono::Duration::hours(4)).to_rfc2822(),
            )),
            delay: Mutex::new(Duration::ZERO),
            upload_credentials: Mutex::new(Vec::new()),
        }
    }
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_link_for(&self, remote_file_id: &str) {
        self.failing_links
            .lock()
            .unwrap()
            .push(remote_file_id.to_string());
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteStorage for FakeStorage {
    async fn upload_file(
        &self,
        credential: &Credential,
        data: Vec<u8>,
        _filename: &str,
    ) -> Result<StoredFile, StorageError> {
        self.pause().await;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected {
                code: 5000,
                message: "Internal upload error.".into(),
            });
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.upload_credentials
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        Ok(StoredFile {
            remote_file_id: format!("file-{n}"),
            content_hash: format!("hash-{}", data.len()),
        })
    }

    async fn get_file_link(
        &self,
        _credential: &Credential,
        remote_file_id: &str,
    ) -> Result<RemoteLink, StorageError> {
        self.pause().await;
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_links
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == remote_file_id)
        {
            return Err(StorageError::Transport("connection reset".into()));
        }
        Ok(RemoteLink {
            url: format!("https://p-def1.example/{remote_file_id}/video.mp4"),
            expires_raw: self.expires_raw.lock().unwrap().clone(),
        })
    }
}
