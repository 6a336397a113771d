/// AI module for chatdesk
///
/// This module provides the text-generation collaborator used by the chat
/// panel. Every backend implements [`TextGenerator`], answering either with a
/// single value or with a stream of text fragments.
///
/// # Architecture
///
/// - `client` - Error types, the `TextGenerator` trait and request shape
/// - `hosted` - OpenAI-compatible endpoint with SSE streaming
/// - `ollama` - Local Ollama chat API with JSON-lines streaming
/// - `rig_backend` - OpenAI / Anthropic through Rig
/// - `providers` - Backend selection from configuration
///
/// # Usage
///
/// ```rust,no_run
/// use chatdesk::ai::{GenerationRequest, TextGenerator, collect_fragments};
/// use chatdesk::ai::ollama::OllamaBackend;
/// use chatdesk::types::{ChatMessage, Role};
///
/// # async fn example() -> Result<(), chatdesk::ai::ChatError> {
/// let backend = OllamaBackend::default();
/// let request = GenerationRequest::new(
///     vec![ChatMessage { role: Role::User, content: "Hello!".into() }],
///     "llama3.1:latest",
/// );
/// let reply = collect_fragments(backend.stream(&request).await?).await?;
/// # Ok(())
/// # }
/// ```
mod client;
pub mod hosted;
pub mod ollama;
pub mod providers;
pub mod rig_backend;

// Re-export main types
pub use client::{
    ChatError, ChatResult, FragmentStream, GenerationRequest, TextGenerator, collect_fragments,
};
