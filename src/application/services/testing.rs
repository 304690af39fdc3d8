use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ports::LlmService, DomainError};

type Responder = Box<dyn Fn(&str) -> Result<String, DomainError> + Send + Sync>;

/// LLM double that records prompts and answers from a script.
pub struct ScriptedLlm {
    responder: Responder,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    /// Replies in order; errors once the script runs out.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(replies.into_iter().map(Into::into).collect());
        Self::from_fn(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DomainError::external("no scripted reply left"))
        })
    }

    pub fn failing() -> Self {
        Self::from_fn(|_| Err(DomainError::external("model unavailable")))
    }

    pub fn from_fn(
        responder: impl Fn(&str) -> Result<String, DomainError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.responder)(prompt)
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// LLM double whose completions never finish.
pub struct StalledLlm;

#[async_trait]
impl LlmService for StalledLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, DomainError> {
        std::future::pending().await
    }

    fn model(&self) -> &str {
        "stalled"
    }
}
