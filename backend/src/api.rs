use anyhow::*;
use async_trait::async_trait;

use crate::chat::Turn;
pub use crate::orchestrator::Exchange;

/// The top-level API of this project
#[async_trait(?Send)]
pub trait ClientApi: Send + Sync + 'static {
    /// Detects the language of the text and returns the text-to-speech locale to speak it with.
    async fn detect_language(&self, text: &str) -> Result<String>;

    /// Continues the conversation.
    ///
    /// Asks the chat model for a reply, running the exhibit lookup when the model requests it,
    /// and returns the extended transcript together with any product cards.
    async fn message(&self, transcript: Vec<Turn>) -> Result<Exchange>;
}
