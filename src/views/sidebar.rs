use std::sync::Arc;
use tracing::debug;

use crate::auth::AuthProvider;
use crate::controller::ConversationController;
use crate::types::{Conversation, ConversationPatch};

/// One row of the conversation list as the sidebar draws it.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationListItem {
    pub id: String,
    pub title: String,
    pub updated_at: String,
    pub is_active: bool,
    pub is_editing: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Renamed,
    /// Blank draft: edit mode closed, title left unchanged.
    Reverted,
    /// The controller could not persist the new title.
    Failed,
    NotEditing,
}

struct EditState {
    id: String,
    draft: String,
}

/// Sidebar over the controller's conversation list. Holds only the inline
/// rename state; every mutation goes through the controller.
pub struct ConversationListPresenter {
    controller: ConversationController,
    auth: Arc<dyn AuthProvider>,
    editing: Option<EditState>,
}

impl ConversationListPresenter {
    pub fn new(controller: ConversationController, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            controller,
            auth,
            editing: None,
        }
    }

    pub fn items(&self) -> Vec<ConversationListItem> {
        let active_id = self.controller.active_id();
        let editing_id = self.editing_id();
        self.controller
            .conversations()
            .into_iter()
            .map(|conversation| ConversationListItem {
                is_active: active_id.as_deref() == Some(conversation.id.as_str()),
                is_editing: editing_id == Some(conversation.id.as_str()),
                id: conversation.id,
                title: conversation.title,
                updated_at: conversation.updated_at,
            })
            .collect()
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_ref().map(|edit| edit.id.as_str())
    }

    pub fn edit_draft(&self) -> Option<&str> {
        self.editing.as_ref().map(|edit| edit.draft.as_str())
    }

    /// Make a conversation active. Refused while a rename is open.
    pub fn select(&self, id: &str) -> bool {
        if self.editing.is_some() {
            debug!(conversation_id = %id, "Selection ignored while renaming");
            return false;
        }
        self.controller.set_active(Some(id))
    }

    pub async fn new_chat(&self) -> Option<Conversation> {
        self.controller.create_conversation().await
    }

    /// Open the inline rename for `id`, seeding the draft with its title.
    pub fn begin_edit(&mut self, id: &str) -> bool {
        let Some(conversation) = self.controller.conversation(id) else {
            return false;
        };
        self.editing = Some(EditState {
            id: conversation.id,
            draft: conversation.title,
        });
        true
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        if let Some(edit) = self.editing.as_mut() {
            edit.draft = draft.into();
        }
    }

    pub async fn commit_edit(&mut self) -> CommitOutcome {
        let Some(edit) = self.editing.take() else {
            return CommitOutcome::NotEditing;
        };

        let title = edit.draft.trim();
        if title.is_empty() {
            return CommitOutcome::Reverted;
        }

        if self
            .controller
            .update_conversation(&edit.id, ConversationPatch::title(title))
            .await
        {
            CommitOutcome::Renamed
        } else {
            CommitOutcome::Failed
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Delete without confirmation.
    pub async fn delete(&mut self, id: &str) -> bool {
        let deleted = self.controller.delete_conversation(id).await;
        if deleted && self.editing_id() == Some(id) {
            self.editing = None;
        }
        deleted
    }

    pub async fn logout(&mut self) {
        self.editing = None;
        self.auth.logout().await;
    }
}
