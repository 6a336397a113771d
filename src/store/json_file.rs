//! File-backed conversation store.
//!
//! All records live in one JSON document keyed by conversation id. `list`
//! answers with the keyed object itself, filtered to the owner, the same
//! shape a document backend hands out (an empty object when nothing matches).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::{
    ConversationRecord, ConversationRecordPatch, ConversationStore, ListQuery,
    NewConversationRecord, StoreError, StoreResult,
};
use crate::types::next_message_id;

const FILE_NAME: &str = "conversations.json";

type Document = BTreeMap<String, ConversationRecord>;

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes reads and read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under `dir`, or the platform local-data directory when `None`.
    pub fn in_dir(dir: Option<&Path>) -> Self {
        let base = match dir {
            Some(dir) => dir.to_path_buf(),
            None => default_data_dir(),
        };
        Self::new(base.join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StoreResult<Document> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_document(&self, document: &Document) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(document)?;
        // Write to a sibling temp file, then rename over the document
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join("chatdesk");
    }

    PathBuf::from("cache").join("chatdesk")
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn list(&self, query: &ListQuery) -> StoreResult<serde_json::Value> {
        let document = {
            let _guard = self.write_lock.lock().await;
            self.read_document().await?
        };
        let mut matching = serde_json::Map::new();
        for (id, record) in document {
            if record.user_id == query.owner {
                matching.insert(id, serde_json::to_value(record)?);
            }
        }
        Ok(serde_json::Value::Object(matching))
    }

    async fn create(&self, record: NewConversationRecord) -> StoreResult<ConversationRecord> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        let record = record.into_record(format!("conv-{}", next_message_id()));
        document.insert(record.id.clone(), record.clone());
        self.write_document(&document).await?;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: ConversationRecordPatch) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        let record = document
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        patch.apply_to(record);
        self.write_document(&document).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        if document.remove(id).is_none() {
            return Err(StoreError::not_found(id));
        }
        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(owner: &str) -> NewConversationRecord {
        NewConversationRecord {
            title: "New Chat".to_string(),
            messages: "[]".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            user_id: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_lists_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(Some(dir.path()));

        let listing = store.list(&ListQuery::owned_by("u1")).await.unwrap();

        assert_eq!(listing, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let created = {
            let store = JsonFileStore::in_dir(Some(dir.path()));
            store.create(new_record("u1")).await.unwrap()
        };

        let reopened = JsonFileStore::in_dir(Some(dir.path()));
        let listing = reopened.list(&ListQuery::owned_by("u1")).await.unwrap();

        assert!(listing.get(&created.id).is_some());
        assert_eq!(listing[&created.id]["messages"], "[]");
    }

    #[tokio::test]
    async fn test_list_hides_other_owners() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(Some(dir.path()));
        store.create(new_record("u1")).await.unwrap();

        let listing = store.list(&ListQuery::owned_by("u2")).await.unwrap();

        assert_eq!(listing, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_write_replaces_document_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(Some(dir.path()));
        let created = store.create(new_record("u1")).await.unwrap();

        store
            .update(
                &created.id,
                ConversationRecordPatch {
                    title: Some("Renamed".to_string()),
                    messages: None,
                    updated_at: "2024-01-02T00:00:00Z".to_string(),
                },
            )
            .await
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(FILE_NAME)]);
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let document: Document = serde_json::from_str(&raw).unwrap();
        assert_eq!(document[&created.id].title.as_deref(), Some("Renamed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_during_writes_never_sees_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JsonFileStore::in_dir(Some(dir.path())));
        let created = store.create(new_record("u1")).await.unwrap();

        let writer = {
            let store = store.clone();
            let id = created.id.clone();
            tokio::spawn(async move {
                for n in 0..50 {
                    let patch = ConversationRecordPatch {
                        title: Some(format!("Title {n}")),
                        messages: None,
                        updated_at: "2024-01-02T00:00:00Z".to_string(),
                    };
                    store.update(&id, patch).await.unwrap();
                }
            })
        };
        for _ in 0..50 {
            let listing = store.list(&ListQuery::owned_by("u1")).await.unwrap();
            assert!(listing.get(&created.id).is_some());
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(Some(dir.path()));
        let created = store.create(new_record("u1")).await.unwrap();

        store.delete(&created.id).await.unwrap();

        assert!(matches!(
            store.delete(&created.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
