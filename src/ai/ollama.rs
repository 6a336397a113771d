use super::client::LineBuffer;
use super::{ChatError, ChatResult, FragmentStream, GenerationRequest, TextGenerator};
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434/api/chat";

/// Local Ollama chat API. Streamed replies arrive as one JSON object per line.
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
}

impl OllamaBackend {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    async fn post(&self, request: &GenerationRequest, stream: bool) -> ChatResult<reqwest::Response> {
        let body = ChatBody {
            model: &request.model,
            messages: &request.messages,
            stream,
        };
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(ChatError::new(format!("Ollama error {status}: {detail}")))
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT.to_string())
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

/// A whole reply, or one line of a streamed reply; both share this shape.
#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    done: bool,
}

impl ChatReply {
    fn into_parts(self) -> (String, bool) {
        let text = self.message.map(|message| message.content).unwrap_or_default();
        (text, self.done)
    }
}

/// Decode one line of a streamed reply into `(fragment, done)`. Blank or
/// unreadable lines yield `None`.
pub fn parse_stream_line(line: &str) -> Option<(String, bool)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str::<ChatReply>(line)
        .ok()
        .map(ChatReply::into_parts)
}

#[async_trait]
impl TextGenerator for OllamaBackend {
    async fn complete(&self, request: &GenerationRequest) -> ChatResult<String> {
        let body = self.post(request, false).await?.text().await?;
        match serde_json::from_str::<ChatReply>(&body) {
            Ok(ChatReply {
                message: Some(message),
                ..
            }) => Ok(message.content),
            _ => Ok(body),
        }
    }

    async fn stream(&self, request: &GenerationRequest) -> ChatResult<FragmentStream> {
        let response = self.post(request, true).await?;

        let fragments = async_stream::stream! {
            let mut lines = LineBuffer::default();
            let mut bytes = response.bytes_stream();
            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(ChatError::from(err));
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    let Some((text, done)) = parse_stream_line(&line) else {
                        continue;
                    };
                    if !text.is_empty() {
                        yield Ok(text);
                    }
                    if done {
                        return;
                    }
                }
            }
            if let Some((text, _)) = lines.finish().as_deref().and_then(parse_stream_line)
                && !text.is_empty()
            {
                yield Ok(text);
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::parse_stream_line;

    #[test]
    fn stream_lines_accumulate_until_done() {
        let mut text = String::new();
        let mut finished = false;
        for line in [
            r#"{"message":{"role":"assistant","content":"Hello"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":" world"},"done":false}"#,
            r#"{"done":true,"total_duration":1234}"#,
        ] {
            let (piece, done) = parse_stream_line(line).unwrap();
            text.push_str(&piece);
            finished = done;
        }
        assert_eq!(text, "Hello world");
        assert!(finished);
    }

    #[test]
    fn blank_and_garbage_lines_are_skipped() {
        assert!(parse_stream_line("   ").is_none());
        assert!(parse_stream_line("{oops").is_none());
    }
}
