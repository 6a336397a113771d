use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Title every conversation starts with until the first message renames it.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Id of the synthetic in-progress message shown while a response streams.
pub const STREAMING_MESSAGE_ID: &str = "streaming";

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Role and content only: what the generation service sees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: next_message_id(),
            content: content.into(),
            role,
            timestamp: now_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: String,
    pub updated_at: String,
    pub user_id: String,
}

impl Conversation {
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Merge a patch into this conversation and stamp `updated_at`.
    pub fn apply(&mut self, patch: &ConversationPatch, updated_at: &str) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(messages) = &patch.messages {
            self.messages = messages.clone();
        }
        self.updated_at = updated_at.to_string();
    }
}

/// Partial update accepted by the controller. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
}

impl ConversationPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            messages: None,
        }
    }

    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            title: None,
            messages: Some(messages),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// RFC 3339 UTC timestamp used for `created_at` / `updated_at`.
pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| now_millis().to_string())
}

/// Chronological order of two RFC 3339 stamps. Fractional seconds vary in
/// width, so lexical order is wrong within a second; stamps that do not parse
/// fall back to plain string order.
pub fn compare_timestamps(a: &str, b: &str) -> std::cmp::Ordering {
    match (
        OffsetDateTime::parse(a, &Rfc3339),
        OffsetDateTime::parse(b, &Rfc3339),
    ) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}

/// `<epoch-millis>-<counter>`; the counter keeps ids distinct within a millisecond.
pub fn next_message_id() -> String {
    let seq = MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", now_millis(), seq)
}
