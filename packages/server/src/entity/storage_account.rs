use common::storage::Credential;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_account")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub account_name: String,
    /// Provider credential. Never serialized.
    #[serde(skip_serializing)]
    pub api_token: String,

    /// Local estimate, updated after each upload. May drift from the provider.
    pub storage_used_gb: f64,
    pub storage_limit_gb: f64,
    pub is_active: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn credential(&self) -> Credential {
        Credential::new(self.api_token.clone())
    }

    pub fn free_gb(&self) -> f64 {
        self.storage_limit_gb - self.storage_used_gb
    }
}

impl ActiveModelBehavior for ActiveModel {}
