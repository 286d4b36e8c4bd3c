use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::error::StorageError;
use super::traits::{Credential, RemoteLink, RemoteStorage, StoredFile};

/// pCloud-compatible HTTP provider.
///
/// Every response carries a numeric `result`; anything other than zero is a
/// rejection and comes with an `error` message.
pub struct PCloudProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    result: i64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    metadata: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FileLinkResponse {
    result: i64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    hosts: Vec<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

fn check_result(result: i64, error: Option<String>) -> Result<(), StorageError> {
    match result {
        0 => Ok(()),
        code => Err(StorageError::Rejected {
            code,
            message: error.unwrap_or_else(|| "unknown provider error".into()),
        }),
    }
}

/// Request URLs carry the account token, so errors drop them before display.
fn transport_error(e: reqwest::Error) -> StorageError {
    StorageError::Transport(e.without_url().to_string())
}

fn decode_error(e: reqwest::Error) -> StorageError {
    StorageError::Malformed(e.without_url().to_string())
}

/// Provider file IDs and hashes arrive as JSON numbers or strings.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl PCloudProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn parse_upload(body: UploadResponse) -> Result<StoredFile, StorageError> {
        check_result(body.result, body.error)?;

        let meta = body
            .metadata
            .first()
            .ok_or_else(|| StorageError::Malformed("upload response has no metadata".into()))?;
        let remote_file_id = meta
            .get("fileid")
            .and_then(scalar_to_string)
            .ok_or_else(|| StorageError::Malformed("upload metadata has no fileid".into()))?;
        let content_hash = meta
            .get("hash")
            .and_then(scalar_to_string)
            .unwrap_or_default();

        Ok(StoredFile {
            remote_file_id,
            content_hash,
        })
    }

    fn parse_link(body: FileLinkResponse) -> Result<RemoteLink, StorageError> {
        check_result(body.result, body.error)?;

        let host = body
            .hosts
            .first()
            .ok_or_else(|| StorageError::Malformed("file link response has no hosts".into()))?;
        let path = body
            .path
            .ok_or_else(|| StorageError::Malformed("file link response has no path".into()))?;

        Ok(RemoteLink {
            url: format!("https://{host}{path}"),
            expires_raw: body.expires,
        })
    }
}

#[async_trait]
impl RemoteStorage for PCloudProvider {
    #[instrument(skip(self, credential, data), fields(bytes = data.len()))]
    async fn upload_file(
        &self,
        credential: &Credential,
        data: Vec<u8>,
        filename: &str,
    ) -> Result<StoredFile, StorageError> {
        let part = Part::bytes(data).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/uploadfile", self.base_url))
            .query(&[
                ("auth", credential.expose()),
                ("filename", filename),
                ("nopartial", "1"),
            ])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(decode_error)?;

        let stored = Self::parse_upload(body)?;
        debug!(remote_file_id = %stored.remote_file_id, "Upload accepted");
        Ok(stored)
    }

    #[instrument(skip(self, credential))]
    async fn get_file_link(
        &self,
        credential: &Credential,
        remote_file_id: &str,
    ) -> Result<RemoteLink, StorageError> {
        let response = self
            .client
            .get(format!("{}/getfilelink", self.base_url))
            .query(&[("auth", credential.expose()), ("fileid", remote_file_id)])
            .send()
            .await
            .map_err(transport_error)?;

        let body: FileLinkResponse = response
            .json()
            .await
            .map_err(decode_error)?;

        Self::parse_link(body)
    }
}
