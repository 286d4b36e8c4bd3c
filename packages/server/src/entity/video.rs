use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "video")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub thumbnail_url: Option<String>,

    /// Resolved streaming URL. Never sent to untrusted callers.
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub source_url: String,
    pub source_url_expires_at: Option<DateTimeUtc>,

    pub duration_seconds: i32,
    pub file_size_bytes: i64,

    /// Provider-side file ID on the owning storage account.
    pub remote_file_id: Option<String>,
    pub storage_account_id: Option<Uuid>,

    /// Free-form category name, e.g. "music".
    pub category: Option<String>,

    /// Tag list stored as a JSON array of strings.
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: serde_json::Value,

    /// Opaque public identifier used by the stream endpoint.
    #[sea_orm(unique)]
    pub wrapper_token: String,

    pub view_count: i64,
    pub like_count: i64,

    pub is_published: bool,
    pub published_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `other` is in the same category or shares at least one tag.
    pub fn is_related_to(&self, other: &Model) -> bool {
        if self.category.is_some() && self.category == other.category {
            return true;
        }
        let tags = self.tag_list();
        other.tag_list().iter().any(|t| tags.contains(t))
    }
}

impl ActiveModelBehavior for ActiveModel {}
