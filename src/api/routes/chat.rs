use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::{AppState, Conversations};
use crate::domain::{Conversation, DomainError, Message};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<Uuid>,
    pub k: Option<usize>,
    pub use_compression: Option<bool>,
    pub model: Option<String>,
    pub max_tokens: Option<usize>,
    pub index_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub answer: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answers one question within a conversation.
///
/// Pipeline failures are recorded as an assistant turn and returned with
/// `error` set; only request and conversation-state problems are HTTP errors.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if request.message.trim().is_empty() {
        return Err(DomainError::validation("message must not be empty").into());
    }
    let settings = state.retrieval_settings(
        request.k,
        request.use_compression,
        request.max_tokens,
        request.index_name,
    )?;

    let conversation_id = {
        let mut conversations = state.conversations.write().await;
        let conversation = match request.conversation_id {
            Some(id) => conversations
                .get_mut(&id)
                .ok_or_else(|| DomainError::not_found(format!("conversation {id}")))?,
            None => {
                let conversation = Conversation::new();
                conversations.entry(conversation.id).or_insert(conversation)
            }
        };
        conversation.submit(request.message.clone())?;
        conversation.id
    };
    let turn = PendingTurn::new(state.conversations.clone(), conversation_id);

    let outcome = match state.chat_service(request.model.as_deref()) {
        Ok(chat) => chat.answer(&request.message, &settings).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        tracing::warn!(conversation_id = %conversation_id, error = %e, "answer failed");
    }

    let messages = turn.resolve(&outcome).await?;
    let (answer, error) = match outcome {
        Ok(answer) => (Some(answer), None),
        Err(e) => (None, Some(e.to_string())),
    };

    Ok(Json(ChatResponse {
        conversation_id,
        answer,
        messages,
        error,
    }))
}

const CANCELLED: &str = "request cancelled before an answer was produced";

/// A submitted question that still owes the conversation an assistant turn.
///
/// Dropping it unresolved (client disconnect, request timeout) closes the
/// turn with a cancellation error so the conversation returns to idle.
struct PendingTurn {
    conversations: Conversations,
    id: Uuid,
    armed: bool,
}

impl PendingTurn {
    fn new(conversations: Conversations, id: Uuid) -> Self {
        Self {
            conversations,
            id,
            armed: true,
        }
    }

    async fn resolve(mut self, outcome: &Result<String, DomainError>) -> ApiResult<Vec<Message>> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&self.id)
            .ok_or_else(|| DomainError::internal("conversation vanished while answering"))?;
        conversation.resolve(outcome)?;
        let messages = conversation.messages.clone();
        drop(conversations);

        self.armed = false;
        Ok(messages)
    }
}

fn cancel_turn(conversations: &mut HashMap<Uuid, Conversation>, id: Uuid) {
    if let Some(conversation) = conversations.get_mut(&id) {
        if conversation.resolve(&Err::<String, _>(CANCELLED)).is_ok() {
            tracing::warn!(conversation_id = %id, "chat request cancelled");
        }
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        match self.conversations.try_write() {
            Ok(mut conversations) => cancel_turn(&mut conversations, id),
            Err(_) => {
                let conversations = self.conversations.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        cancel_turn(&mut *conversations.write().await, id);
                    });
                }
            }
        }
    }
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    let conversations = state.conversations.read().await;
    let conversation = conversations
        .get(&id)
        .cloned()
        .ok_or_else(|| DomainError::not_found(format!("conversation {id}")))?;
    Ok(Json(conversation))
}
