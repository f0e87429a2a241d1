//! Generation orchestrator.
//!
//! Ties the query pipeline together: retrieve context, render the system
//! prompt, call the language model, extract the answer. Every way a request
//! can come back empty is an explicit [`ChatOutcome`] variant rather than a
//! null sentinel, so the HTTP boundary has to decide what the user sees.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::llm::LlmClient;
use crate::prompt;
use crate::retrieval::{RetrievalAugmenter, RetrievalError};

/// The result of one chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The model produced an answer.
    Answer(String),
    /// The model responded but carried no usable output.
    NoAnswer,
    /// Retrieval found nothing above the similarity threshold and empty
    /// context is disallowed; the model was never called.
    NoContext,
}

pub struct ChatService {
    augmenter: RetrievalAugmenter,
    llm: Arc<dyn LlmClient>,
}

impl ChatService {
    pub fn new(augmenter: RetrievalAugmenter, llm: Arc<dyn LlmClient>) -> Self {
        Self { augmenter, llm }
    }

    pub async fn answer(&self, user_message: &str) -> Result<ChatOutcome> {
        info!(user_message, "handling chat request");

        let context = match self.augmenter.augment(user_message).await {
            Ok(context) => context,
            Err(RetrievalError::NoContext) => {
                info!("no context cleared the threshold, refusing");
                return Ok(ChatOutcome::NoContext);
            }
            Err(RetrievalError::Index(e)) => return Err(e.into()),
        };

        let rendered = prompt::render(prompt::SYSTEM_PROMPT, &context, user_message);

        match self.llm.complete(&rendered).await? {
            Some(text) => {
                info!(answer_len = text.len(), "chat request answered");
                Ok(ChatOutcome::Answer(text))
            }
            None => {
                info!("model returned no usable output");
                Ok(ChatOutcome::NoAnswer)
            }
        }
    }
}
