use super::client::LineBuffer;
use super::{ChatError, ChatResult, FragmentStream, GenerationRequest, TextGenerator};
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

/// OpenAI-compatible chat-completions endpoint, streamed over SSE.
pub struct HostedBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HostedBackend {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }

    fn request(&self, request: &GenerationRequest, stream: bool) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.endpoint).json(&HostedRequest {
            model: Some(&request.model).filter(|model| !model.is_empty()),
            messages: &request.messages,
            stream: stream.then_some(true),
        });
        if stream {
            builder = builder.header("accept", "text/event-stream");
        }
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[derive(serde::Serialize)]
struct HostedRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a String>,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct OpenAIShape {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct ContentOnly {
    content: String,
}

/// Parse one SSE `data` payload into `(fragment, done)`.
pub fn parse_sse_data(data: &str) -> Option<(String, bool)> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == "[DONE]" {
        return Some((String::new(), true));
    }

    if let Ok(parsed) = serde_json::from_str::<OpenAIShape>(trimmed) {
        if let Some(first) = parsed.choices.into_iter().next() {
            if let Some(piece) = first.delta.and_then(|delta| delta.content) {
                return Some((piece, false));
            }
            if let Some(msg) = first.message {
                return Some((msg.content, false));
            }
        }
        return Some((String::new(), false));
    }

    if let Ok(parsed) = serde_json::from_str::<ContentOnly>(trimmed) {
        return Some((parsed.content, false));
    }

    None
}

/// Reassembles SSE events from arbitrarily split chunks. Consecutive `data:`
/// lines are joined; a blank line ends the event.
#[derive(Default)]
pub struct SseDecoder {
    lines: LineBuffer,
    data: Option<String>,
}

impl SseDecoder {
    /// Feed a chunk, returning the data payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            self.take_line(&line, &mut events);
        }
        events
    }

    /// Payload of an event left unterminated when the body ended.
    pub fn finish(&mut self) -> Option<String> {
        if let Some(line) = self.lines.finish() {
            let mut events = Vec::new();
            self.take_line(&line, &mut events);
        }
        self.data.take()
    }

    fn take_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if let Some(data) = self.data.take() {
                events.push(data);
            }
            return;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let fragment = rest.trim_start();
            match &mut self.data {
                Some(existing) => existing.push_str(fragment),
                None => self.data = Some(fragment.to_string()),
            }
        }
    }
}

#[async_trait]
impl TextGenerator for HostedBackend {
    async fn complete(&self, request: &GenerationRequest) -> ChatResult<String> {
        let response = self.request(request, false).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::new(format!("Hosted API error {status}: {body}")));
        }

        if let Ok(parsed) = serde_json::from_str::<OpenAIShape>(&body)
            && let Some(choice) = parsed.choices.into_iter().next()
            && let Some(msg) = choice.message
        {
            return Ok(msg.content);
        }
        if let Ok(parsed) = serde_json::from_str::<ContentOnly>(&body) {
            return Ok(parsed.content);
        }
        Ok(body)
    }

    async fn stream(&self, request: &GenerationRequest) -> ChatResult<FragmentStream> {
        let response = self.request(request, true).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::new(format!("Hosted API error {status}: {body}")));
        }

        let fragments = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            let mut bytes = response.bytes_stream();
            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(ChatError::from(err));
                        return;
                    }
                };
                for data in decoder.push(&chunk) {
                    if let Some((piece, done)) = parse_sse_data(&data) {
                        if !piece.is_empty() {
                            yield Ok(piece);
                        }
                        if done {
                            return;
                        }
                    }
                }
            }
            if let Some((piece, _)) = decoder.finish().as_deref().and_then(parse_sse_data)
                && !piece.is_empty()
            {
                yield Ok(piece);
            }
        };

        Ok(Box::pin(fragments))
    }
}
