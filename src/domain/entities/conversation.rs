use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainError;

/// Turn log of one chat session.
///
/// The log is append-only. A question moves the conversation from `Idle` to
/// `AwaitingAnswer`; resolving it appends exactly one assistant turn (the
/// answer, or a description of the failure) and returns to `Idle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub messages: Vec<Message>,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingAnswer,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            state: ConversationState::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a user question. Rejected while a previous question is unanswered.
    pub fn submit(&mut self, question: impl Into<String>) -> Result<(), DomainError> {
        if self.state == ConversationState::AwaitingAnswer {
            return Err(DomainError::conflict(
                "a question is already awaiting an answer",
            ));
        }
        self.push(MessageRole::User, question.into());
        self.state = ConversationState::AwaitingAnswer;
        Ok(())
    }

    /// Closes the pending question with the pipeline outcome.
    pub fn resolve<E: std::fmt::Display>(
        &mut self,
        outcome: &Result<String, E>,
    ) -> Result<(), DomainError> {
        if self.state != ConversationState::AwaitingAnswer {
            return Err(DomainError::conflict("no question is awaiting an answer"));
        }
        let content = match outcome {
            Ok(answer) => answer.clone(),
            Err(e) => format!("Error: {e}"),
        };
        self.push(MessageRole::Assistant, content);
        self.state = ConversationState::Idle;
        Ok(())
    }

    fn push(&mut self, role: MessageRole, content: String) {
        self.messages.push(Message { role, content });
        self.updated_at = Utc::now();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}
