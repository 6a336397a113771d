//! Shared fakes for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chatdesk::ai::{ChatError, ChatResult, FragmentStream, GenerationRequest, TextGenerator};
use chatdesk::controller::ConversationController;
use chatdesk::events::{ChatEvent, EventBus};
use chatdesk::store::{
    ConversationRecord, ConversationRecordPatch, ConversationStore, ListQuery, MemoryStore,
    NewConversationRecord, StoreError, StoreResult,
};
use chatdesk::types::User;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const USER_ID: &str = "user-1";

/// Memory store whose operations can be switched to fail, and whose listing
/// can be replaced with an arbitrary raw value.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_list: Arc<AtomicBool>,
    fail_create: Arc<AtomicBool>,
    fail_update: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
    listing_override: Arc<Mutex<Option<serde_json::Value>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn override_listing(&self, listing: serde_json::Value) {
        *self.listing_override.lock().unwrap() = Some(listing);
    }

    pub fn seed(&self, id: &str, owner: &str, title: &str, updated_at: &str) {
        self.inner
            .insert_record(ConversationRecord {
                id: id.to_string(),
                title: Some(title.to_string()),
                messages: Some(serde_json::Value::String("[]".to_string())),
                created_at: updated_at.to_string(),
                updated_at: updated_at.to_string(),
                user_id: owner.to_string(),
            })
            .unwrap();
    }
}

fn injected(operation: &str) -> StoreError {
    StoreError::Backend {
        message: format!("injected {operation} failure"),
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn list(&self, query: &ListQuery) -> StoreResult<serde_json::Value> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        let listing = self.listing_override.lock().unwrap().clone();
        if let Some(listing) = listing {
            return Ok(listing);
        }
        self.inner.list(query).await
    }

    async fn create(&self, record: NewConversationRecord) -> StoreResult<ConversationRecord> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }
        self.inner.create(record).await
    }

    async fn update(&self, id: &str, patch: ConversationRecordPatch) -> StoreResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(id).await
    }
}

/// Generator that replays fixed fragments, or fails, and records requests.
#[derive(Default)]
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    failure: Option<String>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &GenerationRequest) -> ChatResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.failure {
            Some(message) => Err(ChatError::new(message.clone())),
            None => Ok(self.fragments.concat()),
        }
    }

    async fn stream(&self, request: &GenerationRequest) -> ChatResult<FragmentStream> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = &self.failure {
            return Err(ChatError::new(message.clone()));
        }
        let items: Vec<ChatResult<String>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Generator whose fragments are fed by the test through a channel; the
/// stream ends when the sender is dropped.
pub struct ChannelGenerator {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ChatResult<String>>>>,
}

impl ChannelGenerator {
    pub fn new() -> (Self, mpsc::UnboundedSender<ChatResult<String>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                receiver: Mutex::new(Some(receiver)),
            },
            sender,
        )
    }
}

#[async_trait]
impl TextGenerator for ChannelGenerator {
    async fn complete(&self, _request: &GenerationRequest) -> ChatResult<String> {
        Err(ChatError::new("channel generator only streams"))
    }

    async fn stream(&self, _request: &GenerationRequest) -> ChatResult<FragmentStream> {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChatError::new("channel generator already used"))?;
        let fragments = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(Box::pin(fragments))
    }
}

pub fn user() -> User {
    User::new(USER_ID)
}

pub async fn signed_in_controller(store: &FlakyStore) -> ConversationController {
    let controller = ConversationController::new(Arc::new(store.clone()), EventBus::new());
    controller.on_auth_change(Some(user())).await;
    controller
}

pub fn ids(controller: &ConversationController) -> Vec<String> {
    controller
        .conversations()
        .into_iter()
        .map(|conversation| conversation.id)
        .collect()
}

/// Wait until an event matching `predicate` arrives.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<ChatEvent>, predicate: F) -> ChatEvent
where
    F: Fn(&ChatEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
