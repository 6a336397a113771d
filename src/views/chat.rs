use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

use crate::ai::{ChatError, GenerationRequest, TextGenerator};
use crate::controller::ConversationController;
use crate::events::{ChatEvent, EventBus};
use crate::types::{ConversationPatch, Message, Role, STREAMING_MESSAGE_ID, now_millis};

pub const TITLE_MAX_CHARS: usize = 50;
pub const TITLE_ELLIPSIS: &str = "...";

/// Title for a conversation named after its first message.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}{TITLE_ELLIPSIS}")
    } else {
        head
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::NONE
        }
    }

    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt || self.meta
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, or another submission still in flight.
    Rejected,
    Completed { conversation_id: String },
    Cancelled { conversation_id: String },
    /// Logged; no assistant message was added.
    Failed,
}

/// A transcript row. `in_progress` marks the synthetic streaming message.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptEntry {
    pub message: Message,
    pub in_progress: bool,
}

struct StreamingState {
    conversation_id: String,
    text: String,
}

#[derive(Default)]
struct PanelState {
    draft: String,
    submitting: bool,
    streaming: Option<StreamingState>,
}

enum GenerationEnd {
    Finished(String),
    Cancelled,
}

/// Chat pane: takes user input, runs one exchange at a time against the
/// generation service and exposes the live transcript.
///
/// A streaming response stays bound to the conversation it started in. If
/// the selection moves mid-stream, the reply is still appended to the
/// original conversation and the in-progress message only shows while that
/// conversation is active.
#[derive(Clone)]
pub struct ExchangePanel {
    controller: ConversationController,
    generator: Arc<dyn TextGenerator>,
    model: String,
    state: Arc<Mutex<PanelState>>,
    cancel_requested: Arc<AtomicBool>,
}

/// Clears the in-flight markers however the submission ends, including when
/// its future is dropped.
struct SubmitGuard<'a> {
    panel: &'a ExchangePanel,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.panel.state();
            state.submitting = false;
            state.streaming = None;
        }
        self.panel.events().emit(ChatEvent::SubmittingChanged(false));
    }
}

impl ExchangePanel {
    pub fn new(
        controller: ConversationController,
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            generator,
            model: model.into(),
            state: Arc::new(Mutex::new(PanelState::default())),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    fn state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn events(&self) -> &EventBus {
        self.controller.events()
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.state().draft = draft.into();
    }

    pub fn is_submitting(&self) -> bool {
        self.state().submitting
    }

    /// Accumulated text of the in-flight response, if any.
    pub fn streaming_text(&self) -> Option<String> {
        self.state()
            .streaming
            .as_ref()
            .map(|streaming| streaming.text.clone())
    }

    /// Stop consuming the in-flight response. The partial text is dropped and
    /// nothing is appended.
    pub fn cancel(&self) {
        if self.is_submitting() {
            self.cancel_requested.store(true, Ordering::Relaxed);
        }
    }

    /// Enter submits; Enter with any modifier held inserts a line break.
    pub async fn handle_enter(&self, modifiers: Modifiers) -> Option<SubmitOutcome> {
        if modifiers.any() {
            self.state().draft.push('\n');
            return None;
        }
        Some(self.submit_draft().await)
    }

    pub async fn submit_draft(&self) -> SubmitOutcome {
        let draft = self.draft();
        self.submit(&draft).await
    }

    /// Run one exchange: append the user message, stream the reply, append
    /// the assistant message. Failures are logged, never returned.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        {
            let mut state = self.state();
            if text.is_empty() || state.submitting {
                return SubmitOutcome::Rejected;
            }
            state.draft.clear();
            state.submitting = true;
            state.streaming = None;
        }
        self.cancel_requested.store(false, Ordering::Relaxed);
        self.events().emit(ChatEvent::SubmittingChanged(true));
        let _guard = SubmitGuard { panel: self };

        self.exchange(text).await
    }

    async fn exchange(&self, text: &str) -> SubmitOutcome {
        let conversation = match self.controller.active_conversation() {
            Some(conversation) => conversation,
            None => match self.controller.create_conversation().await {
                Some(conversation) => conversation,
                None => {
                    error!("Could not create a conversation for the new message");
                    return SubmitOutcome::Failed;
                }
            },
        };
        let conversation_id = conversation.id.clone();

        let mut messages = conversation.messages.clone();
        messages.push(Message::user(text));

        let mut patch = ConversationPatch::messages(messages.clone());
        if conversation.has_default_title() {
            patch = patch.with_title(derive_title(text));
        }

        let request = GenerationRequest::new(
            messages.iter().map(Message::to_chat_message).collect(),
            self.model.clone(),
        );

        // The user-message write runs alongside generation and settles before
        // the assistant message is written.
        let (_, reply) = tokio::join!(
            self.controller.update_conversation(&conversation_id, patch),
            self.generate(&conversation_id, &request),
        );

        match reply {
            Ok(GenerationEnd::Finished(content)) => {
                messages.push(Message::assistant(content));
                self.controller
                    .update_conversation(&conversation_id, ConversationPatch::messages(messages))
                    .await;
                self.finish_stream(&conversation_id);
                SubmitOutcome::Completed { conversation_id }
            }
            Ok(GenerationEnd::Cancelled) => {
                info!(conversation_id = %conversation_id, "Response cancelled");
                self.finish_stream(&conversation_id);
                SubmitOutcome::Cancelled { conversation_id }
            }
            Err(err) => {
                error!(conversation_id = %conversation_id, error = %err, "Generation failed");
                self.finish_stream(&conversation_id);
                SubmitOutcome::Failed
            }
        }
    }

    async fn generate(
        &self,
        conversation_id: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationEnd, ChatError> {
        self.state().streaming = Some(StreamingState {
            conversation_id: conversation_id.to_string(),
            text: String::new(),
        });
        self.events().emit(ChatEvent::StreamStarted {
            conversation_id: conversation_id.to_string(),
        });

        let mut fragments = self.generator.stream(request).await?;
        let mut accumulated = String::new();
        while let Some(fragment) = fragments.next().await {
            if self.cancel_requested.load(Ordering::Relaxed) {
                return Ok(GenerationEnd::Cancelled);
            }
            let fragment = fragment?;
            accumulated.push_str(&fragment);
            if let Some(streaming) = self.state().streaming.as_mut() {
                streaming.text.clone_from(&accumulated);
            }
            self.events().emit(ChatEvent::StreamFragment {
                conversation_id: conversation_id.to_string(),
                text: fragment,
            });
            self.events().emit(ChatEvent::TranscriptChanged {
                conversation_id: conversation_id.to_string(),
            });
        }

        if self.cancel_requested.load(Ordering::Relaxed) {
            return Ok(GenerationEnd::Cancelled);
        }
        debug!(conversation_id = %conversation_id, chars = accumulated.len(), "Stream complete");
        Ok(GenerationEnd::Finished(accumulated))
    }

    fn finish_stream(&self, conversation_id: &str) {
        self.state().streaming = None;
        self.events().emit(ChatEvent::StreamFinished {
            conversation_id: conversation_id.to_string(),
        });
        self.events().emit(ChatEvent::TranscriptChanged {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Persisted messages of the active conversation, followed by the
    /// in-progress response when it belongs to that conversation.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        let Some(conversation) = self.controller.active_conversation() else {
            return Vec::new();
        };

        let mut entries: Vec<TranscriptEntry> = conversation
            .messages
            .into_iter()
            .map(|message| TranscriptEntry {
                message,
                in_progress: false,
            })
            .collect();

        let state = self.state();
        if let Some(streaming) = state.streaming.as_ref()
            && streaming.conversation_id == conversation.id
        {
            entries.push(TranscriptEntry {
                message: Message {
                    id: STREAMING_MESSAGE_ID.to_string(),
                    content: streaming.text.clone(),
                    role: Role::Assistant,
                    timestamp: now_millis(),
                },
                in_progress: true,
            });
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_the_title() {
        let text = "a".repeat(50);
        assert_eq!(derive_title(&text), text);
        assert_eq!(derive_title("Hello"), "Hello");
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let text = "b".repeat(51);
        assert_eq!(derive_title(&text), format!("{}...", "b".repeat(50)));
    }

    #[test]
    fn truncation_counts_characters() {
        let text = "é".repeat(60);
        let title = derive_title(&text);
        assert_eq!(title.chars().count(), 53);
        assert!(title.starts_with(&"é".repeat(50)));
    }

    #[test]
    fn any_modifier_counts() {
        assert!(!Modifiers::NONE.any());
        assert!(Modifiers::shift().any());
        assert!(
            Modifiers {
                meta: true,
                ..Modifiers::NONE
            }
            .any()
        );
    }
}
