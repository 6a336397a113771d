use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;

// ============================================
// Error Types
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChatError(String);

impl ChatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ChatError {}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::new(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::new(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::new(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ============================================
// Generation Interface
// ============================================

/// Text fragments of a response in delivery order. The stream ends when
/// generation ends; an `Err` item aborts it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ChatResult<String>> + Send>>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
        }
    }
}

/// AI text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Whole response as a single value.
    async fn complete(&self, request: &GenerationRequest) -> ChatResult<String>;

    /// Response as incremental fragments. Backends without native streaming
    /// deliver the full completion as one fragment.
    async fn stream(&self, request: &GenerationRequest) -> ChatResult<FragmentStream> {
        let content = self.complete(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(content) })))
    }
}

/// Drain a stream into one string.
pub async fn collect_fragments(mut stream: FragmentStream) -> ChatResult<String> {
    let mut content = String::new();
    while let Some(fragment) = stream.next().await {
        content.push_str(&fragment?);
    }
    Ok(content)
}

/// Reassembles text lines from raw body chunks.
///
/// Bytes are buffered until a newline arrives, so a multi-byte character
/// split across chunks is decoded whole. Carriage returns are stripped.
#[derive(Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk, returning every line it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..pos]));
        }
        lines
    }

    /// Trailing text left without a newline when the body ended.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn complete(&self, _request: &GenerationRequest) -> ChatResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn default_stream_yields_whole_completion() {
        let request = GenerationRequest::new(Vec::new(), "m");
        let stream = Fixed("all at once").stream(&request).await.unwrap();
        assert_eq!(collect_fragments(stream).await.unwrap(), "all at once");
    }

    #[test]
    fn line_buffer_keeps_partial_tail() {
        let mut lines = LineBuffer::default();
        assert_eq!(lines.push(b"one\r\ntwo\nthr"), vec!["one", "two"]);
        assert_eq!(lines.finish().as_deref(), Some("thr"));
        assert!(lines.finish().is_none());
    }

    #[test]
    fn line_buffer_joins_character_split_across_chunks() {
        let text = "caf\u{e9} \u{1f600}\n".as_bytes();
        let mut lines = LineBuffer::default();

        let mut out = Vec::new();
        for chunk in [&text[..4], &text[4..7], &text[7..9], &text[9..]] {
            out.extend(lines.push(chunk));
        }

        assert_eq!(out, vec!["caf\u{e9} \u{1f600}"]);
    }
}
