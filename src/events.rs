use tokio::sync::broadcast;

use crate::types::User;

const EVENT_CAPACITY: usize = 256;

/// State-change notifications for whatever renders the controller, the
/// sidebar and the chat panel. Each variant names what changed so
/// subscribers can redraw selectively.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    UserChanged(Option<User>),
    ConversationsChanged,
    ActiveConversationChanged(Option<String>),
    SubmittingChanged(bool),
    StreamStarted {
        conversation_id: String,
    },
    StreamFragment {
        conversation_id: String,
        text: String,
    },
    StreamFinished {
        conversation_id: String,
    },
    /// Persisted or transient messages of a conversation changed; views
    /// scroll to the newest content.
    TranscriptChanged {
        conversation_id: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
