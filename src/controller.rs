//! Session and conversation controller.
//!
//! Owns the canonical in-memory conversation list, the active selection and
//! the signed-in user. Every store call is absorbed here: failures are logged
//! and the operation becomes a no-op, nothing propagates to callers.
//!
//! The list is ordered most recently updated first as of the last load.
//! Updates replace entries in place without re-sorting; newly created
//! conversations are prepended.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::auth::AuthSubscription;
use crate::codec::{self, encode_messages};
use crate::events::{ChatEvent, EventBus};
use crate::store::{ConversationRecordPatch, ConversationStore, ListQuery, NewConversationRecord};
use crate::types::{Conversation, ConversationPatch, DEFAULT_TITLE, User, now_timestamp};

#[derive(Default)]
struct ControllerState {
    user: Option<User>,
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    loading: bool,
}

#[derive(Clone)]
pub struct ConversationController {
    store: Arc<dyn ConversationStore>,
    state: Arc<Mutex<ControllerState>>,
    events: EventBus,
}

impl ConversationController {
    pub fn new(store: Arc<dyn ConversationStore>, events: EventBus) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(ControllerState::default())),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user.clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state()
            .conversations
            .iter()
            .find(|conversation| conversation.id == id)
            .cloned()
    }

    pub fn active_id(&self) -> Option<String> {
        self.state().active_id.clone()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        let state = self.state();
        let active_id = state.active_id.as_deref()?;
        state
            .conversations
            .iter()
            .find(|conversation| conversation.id == active_id)
            .cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    /// Select a conversation, or clear the selection with `None`. Unknown
    /// ids are refused.
    pub fn set_active(&self, id: Option<&str>) -> bool {
        {
            let mut state = self.state();
            if let Some(id) = id
                && !state.conversations.iter().any(|c| c.id == id)
            {
                return false;
            }
            if state.active_id.as_deref() == id {
                return true;
            }
            state.active_id = id.map(str::to_string);
        }
        self.events
            .emit(ChatEvent::ActiveConversationChanged(id.map(str::to_string)));
        true
    }

    /// React to a sign-in, sign-out or account switch.
    ///
    /// The list is cleared whenever the account changes, before any reload,
    /// so a failed load never leaves another user's conversations visible.
    pub async fn on_auth_change(&self, user: Option<User>) {
        let signed_in = user.is_some();
        let cleared = {
            let mut state = self.state();
            let same_account = match (&state.user, &user) {
                (Some(previous), Some(next)) => previous.id == next.id,
                _ => false,
            };
            state.user = user.clone();
            if !same_account {
                state.conversations.clear();
                state.active_id = None;
                state.loading = false;
            }
            !same_account
        };
        self.events.emit(ChatEvent::UserChanged(user));

        if cleared {
            if signed_in {
                debug!("Account changed, conversation list cleared");
            } else {
                info!("Signed out, conversation list cleared");
            }
            self.events.emit(ChatEvent::ActiveConversationChanged(None));
            self.events.emit(ChatEvent::ConversationsChanged);
        }
        if signed_in {
            self.load_conversations().await;
        }
    }

    /// Apply every later auth change from `subscription` until the provider
    /// goes away. The state current at subscription time is not replayed.
    pub async fn follow_auth(&self, mut subscription: AuthSubscription) {
        while let Some(user) = subscription.changed().await {
            self.on_auth_change(user).await;
        }
        debug!("Auth subscription closed");
    }

    /// Replace the in-memory list with the signed-in user's conversations.
    /// On failure the existing list is kept as it was.
    pub async fn load_conversations(&self) {
        let Some(owner) = self.current_user().map(|user| user.id) else {
            warn!("Cannot load conversations without a signed-in user");
            return;
        };

        self.state().loading = true;
        let result = self.store.list(&ListQuery::owned_by(owner.clone())).await;

        let loaded = match result {
            Ok(listing) => codec::decode_listing(listing).map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };

        let changed = {
            let mut state = self.state();
            state.loading = false;
            match loaded {
                Ok(mut conversations) => {
                    if state.user.as_ref().map(|user| user.id.as_str()) != Some(owner.as_str()) {
                        debug!(user_id = %owner, "Discarding load for a user who is no longer signed in");
                        false
                    } else {
                        conversations.retain(|conversation| conversation.user_id == owner);
                        let active_gone = state
                            .active_id
                            .as_deref()
                            .is_some_and(|id| !conversations.iter().any(|c| c.id == id));
                        if active_gone {
                            state.active_id = None;
                        }
                        debug!(count = conversations.len(), "Loaded conversations");
                        state.conversations = conversations;
                        true
                    }
                }
                Err(err) => {
                    error!(user_id = %owner, error = %err, "Failed to load conversations");
                    false
                }
            }
        };

        if changed {
            self.events.emit(ChatEvent::ConversationsChanged);
        }
    }

    /// Create an empty conversation owned by the signed-in user, prepend it
    /// and make it active.
    pub async fn create_conversation(&self) -> Option<Conversation> {
        let Some(owner) = self.current_user().map(|user| user.id) else {
            warn!("Cannot create a conversation without a signed-in user");
            return None;
        };

        let messages = match encode_messages(&[]) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(error = %err, "Failed to encode empty message list");
                return None;
            }
        };
        let now = now_timestamp();
        let new_record = NewConversationRecord {
            title: DEFAULT_TITLE.to_string(),
            messages,
            created_at: now.clone(),
            updated_at: now,
            user_id: owner,
        };

        let record = match self.store.create(new_record).await {
            Ok(record) => record,
            Err(err) => {
                error!(error = %err, "Failed to create conversation");
                return None;
            }
        };
        let conversation = match codec::decode_record(record) {
            Ok(conversation) => conversation,
            Err(err) => {
                error!(error = %err, "Store returned an unreadable conversation");
                return None;
            }
        };

        {
            let mut state = self.state();
            state.conversations.insert(0, conversation.clone());
            state.active_id = Some(conversation.id.clone());
        }
        info!(conversation_id = %conversation.id, "Created conversation");
        self.events.emit(ChatEvent::ConversationsChanged);
        self.events
            .emit(ChatEvent::ActiveConversationChanged(Some(conversation.id.clone())));
        Some(conversation)
    }

    /// Merge `patch` into a conversation, bumping its update time. Returns
    /// whether the store accepted the write and a local entry was updated.
    pub async fn update_conversation(&self, id: &str, patch: ConversationPatch) -> bool {
        let messages = match patch.messages.as_deref().map(encode_messages).transpose() {
            Ok(messages) => messages,
            Err(err) => {
                error!(conversation_id = %id, error = %err, "Failed to encode messages");
                return false;
            }
        };
        let updated_at = now_timestamp();
        let record_patch = ConversationRecordPatch {
            title: patch.title.clone(),
            messages,
            updated_at: updated_at.clone(),
        };

        if let Err(err) = self.store.update(id, record_patch).await {
            error!(conversation_id = %id, error = %err, "Failed to update conversation");
            return false;
        }

        let applied = {
            let mut state = self.state();
            match state.conversations.iter_mut().find(|c| c.id == id) {
                Some(conversation) => {
                    conversation.apply(&patch, &updated_at);
                    true
                }
                None => false,
            }
        };

        if applied {
            self.events.emit(ChatEvent::ConversationsChanged);
            if patch.messages.is_some() {
                self.events.emit(ChatEvent::TranscriptChanged {
                    conversation_id: id.to_string(),
                });
            }
        } else {
            debug!(conversation_id = %id, "Updated a conversation that is not in the local list");
        }
        applied
    }

    /// Delete a conversation, clearing the selection if it was active.
    pub async fn delete_conversation(&self, id: &str) -> bool {
        if let Err(err) = self.store.delete(id).await {
            error!(conversation_id = %id, error = %err, "Failed to delete conversation");
            return false;
        }

        let cleared_active = {
            let mut state = self.state();
            state.conversations.retain(|conversation| conversation.id != id);
            let was_active = state.active_id.as_deref() == Some(id);
            if was_active {
                state.active_id = None;
            }
            was_active
        };

        info!(conversation_id = %id, "Deleted conversation");
        self.events.emit(ChatEvent::ConversationsChanged);
        if cleared_active {
            self.events.emit(ChatEvent::ActiveConversationChanged(None));
        }
        true
    }
}
