//! Persistent store collaborator for conversation records.
//!
//! Records carry their `messages` as an encoded JSON text blob; decoding into
//! the in-memory shape happens in [`crate::codec`], never here.

mod error;
pub mod json_file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::compare_timestamps;

pub use error::{StoreError, StoreResult};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

pub const UPDATED_AT_FIELD: &str = "updatedAt";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Filter and ordering for [`ConversationStore::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub owner: String,
    pub order_by: OrderBy,
}

impl ListQuery {
    /// All records owned by `owner`, most recently updated first.
    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            order_by: OrderBy {
                field: UPDATED_AT_FIELD.to_string(),
                direction: SortDirection::Desc,
            },
        }
    }
}

/// A conversation as the store holds it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Encoded text blob in well-formed records; older records may hold an
    /// array or nothing at all.
    #[serde(default)]
    pub messages: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationRecord {
    pub title: String,
    pub messages: String,
    pub created_at: String,
    pub updated_at: String,
    pub user_id: String,
}

impl NewConversationRecord {
    pub fn into_record(self, id: String) -> ConversationRecord {
        ConversationRecord {
            id,
            title: Some(self.title),
            messages: Some(serde_json::Value::String(self.messages)),
            created_at: self.created_at,
            updated_at: self.updated_at,
            user_id: self.user_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<String>,
    pub updated_at: String,
}

impl ConversationRecordPatch {
    pub fn apply_to(&self, record: &mut ConversationRecord) {
        if let Some(title) = &self.title {
            record.title = Some(title.clone());
        }
        if let Some(messages) = &self.messages {
            record.messages = Some(serde_json::Value::String(messages.clone()));
        }
        record.updated_at = self.updated_at.clone();
    }
}

/// Backend holding the durable copy of every conversation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Raw listing as the backend returns it: an array of records, a keyed
    /// object of records, or `null`.
    async fn list(&self, query: &ListQuery) -> StoreResult<serde_json::Value>;

    /// Persist a new record; the store assigns its id.
    async fn create(&self, record: NewConversationRecord) -> StoreResult<ConversationRecord>;

    async fn update(&self, id: &str, patch: ConversationRecordPatch) -> StoreResult<()>;

    async fn delete(&self, id: &str) -> StoreResult<()>;
}

fn sort_records(records: &mut [ConversationRecord], order_by: &OrderBy) {
    if order_by.field != UPDATED_AT_FIELD {
        return;
    }
    match order_by.direction {
        SortDirection::Asc => {
            records.sort_by(|a, b| compare_timestamps(&a.updated_at, &b.updated_at))
        }
        SortDirection::Desc => {
            records.sort_by(|a, b| compare_timestamps(&b.updated_at, &a.updated_at))
        }
    }
}
