use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::storage_account;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StorageAccountResponse {
    pub id: Uuid,
    #[schema(example = "pcloud-eu-1")]
    pub account_name: String,
    /// Local usage estimate in GB.
    #[schema(example = 105.25)]
    pub storage_used_gb: f64,
    #[schema(example = 500.0)]
    pub storage_limit_gb: f64,
    pub free_gb: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<storage_account::Model> for StorageAccountResponse {
    fn from(m: storage_account::Model) -> Self {
        Self {
            free_gb: m.free_gb(),
            id: m.id,
            account_name: m.account_name,
            storage_used_gb: m.storage_used_gb,
            storage_limit_gb: m.storage_limit_gb,
            is_active: m.is_active,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateStorageAccountRequest {
    pub account_name: String,
    /// Provider credential. Write-only.
    pub api_token: String,
    pub storage_limit_gb: f64,
    /// Usage already present on the account. Default: 0.
    pub storage_used_gb: Option<f64>,
    /// Default: true.
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetAccountActiveRequest {
    pub is_active: bool,
}
