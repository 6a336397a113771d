use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    ConversationRecord, ConversationRecordPatch, ConversationStore, ListQuery,
    NewConversationRecord, StoreError, StoreResult, sort_records,
};

/// In-memory conversation store.
/// Useful for testing and for running without a backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, ConversationRecord>>>,
    counter: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as-is, bypassing id assignment.
    pub fn insert_record(&self, record: ConversationRecord) -> StoreResult<()> {
        self.lock()?.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn record(&self, id: &str) -> Option<ConversationRecord> {
        self.lock().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, ConversationRecord>>> {
        self.records.lock().map_err(|e| StoreError::Backend {
            message: format!("Failed to lock conversations: {}", e),
        })
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn list(&self, query: &ListQuery) -> StoreResult<serde_json::Value> {
        let mut matching: Vec<ConversationRecord> = self
            .lock()?
            .values()
            .filter(|record| record.user_id == query.owner)
            .cloned()
            .collect();
        sort_records(&mut matching, &query.order_by);
        Ok(serde_json::to_value(matching)?)
    }

    async fn create(&self, record: NewConversationRecord) -> StoreResult<ConversationRecord> {
        let id = format!("conv-{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let record = record.into_record(id);
        self.lock()?.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: ConversationRecordPatch) -> StoreResult<()> {
        let mut records = self.lock()?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id))?;
        patch.apply_to(record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.lock()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(id))
    }
}
