use super::{ChatError, ChatResult, GenerationRequest, TextGenerator};
use crate::types::{ChatMessage, Role};
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Chat;
use rig::providers;

const PREAMBLE: &str = "You are a helpful assistant. Be concise and format with markdown when appropriate.";

pub enum RigProvider {
    OpenAI(providers::openai::Client),
    Anthropic(providers::anthropic::Client),
}

/// Hosted providers reached through Rig. Rig's chat call is non-streaming, so
/// responses arrive as a single fragment.
pub struct RigBackend {
    provider: RigProvider,
}

impl RigBackend {
    pub fn openai(api_key: &str) -> Self {
        Self {
            provider: RigProvider::OpenAI(providers::openai::Client::new(api_key)),
        }
    }

    pub fn anthropic(api_key: &str) -> Self {
        Self {
            provider: RigProvider::Anthropic(providers::anthropic::Client::new(api_key)),
        }
    }
}

/// Split a transcript into Rig's `(prompt, history)` pair: the last message
/// is the prompt.
fn split_prompt(messages: &[ChatMessage]) -> ChatResult<(&str, Vec<rig::message::Message>)> {
    let (last, earlier) = messages
        .split_last()
        .ok_or_else(|| ChatError::new("No messages provided"))?;
    let history = earlier
        .iter()
        .map(|msg| match msg.role {
            Role::User => rig::message::Message::user(&msg.content),
            Role::Assistant => rig::message::Message::assistant(&msg.content),
        })
        .collect();
    Ok((&last.content, history))
}

#[async_trait]
impl TextGenerator for RigBackend {
    async fn complete(&self, request: &GenerationRequest) -> ChatResult<String> {
        let (prompt, history) = split_prompt(&request.messages)?;

        let reply = match &self.provider {
            RigProvider::OpenAI(client) => {
                let agent = client
                    .agent(&request.model)
                    .preamble(PREAMBLE)
                    .max_tokens(4096)
                    .temperature(0.7)
                    .build();
                agent.chat(prompt, history).await
            }
            RigProvider::Anthropic(client) => {
                let agent = client
                    .agent(&request.model)
                    .preamble(PREAMBLE)
                    .max_tokens(4096)
                    .temperature(0.7)
                    .build();
                agent.chat(prompt, history).await
            }
        };

        reply.map_err(|e| ChatError::new(format!("Chat error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_message_becomes_prompt() {
        let messages = vec![
            ChatMessage {
                role: Role::User,
                content: "first".to_string(),
            },
            ChatMessage {
                role: Role::Assistant,
                content: "reply".to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: "second".to_string(),
            },
        ];

        let (prompt, history) = split_prompt(&messages).unwrap();

        assert_eq!(prompt, "second");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn empty_transcript_is_an_error() {
        assert!(split_prompt(&[]).is_err());
    }
}
