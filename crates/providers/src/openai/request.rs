use chatstream_core::chat::{Message, Model};
use serde::Serialize;

/// Wire body for the chat-completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: Model,
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl ChatRequest {
    /// Appends a user message built from `prompt` to the prior history.
    /// Content is passed through unvalidated.
    pub(crate) fn new(history: &[Message], prompt: &str, stream: bool, model: Model) -> Self {
        let mut messages = history.to_vec();
        messages.push(Message::user(prompt));
        Self {
            model,
            messages,
            stream,
        }
    }
}
