pub mod chat;
pub mod sidebar;

pub use chat::{ExchangePanel, Modifiers, SubmitOutcome, TranscriptEntry};
pub use sidebar::{CommitOutcome, ConversationListItem, ConversationListPresenter};
