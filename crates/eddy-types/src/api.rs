use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

// -- JWT Claims --

/// JWT claims shared across eddy-api (REST middleware) and eddy-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// eddy-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub login: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub login: String,
    pub token: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub name: String,
    pub description: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub body: String,
    pub attachment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub author_login: String,
    pub body: String,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn from_message(message: Message, author_login: String) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            author_id: message.author_id,
            author_login,
            body: message.body,
            attachment: message.attachment,
            created_at: message.created_at,
        }
    }
}
