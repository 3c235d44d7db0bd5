use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use eddy_types::api::{Claims, CreateConversationRequest};
use eddy_types::events::GatewayEvent;
use eddy_types::models::Conversation;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let conversation = tokio::task::spawn_blocking(move || {
        st.conversations.create(claims.sub, &req.name, req.description.as_deref())
    })
    .await
    .map_err(ApiError::join)??;

    broadcast_created(&state, &conversation);
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let conversations = tokio::task::spawn_blocking(move || st.conversations.list())
        .await
        .map_err(ApiError::join)??;

    Ok(Json(conversations))
}

/// Spin a message off into its own conversation, owned by the caller.
pub async fn spawn_conversation(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let conversation =
        tokio::task::spawn_blocking(move || st.conversations.spawn(message_id, claims.sub))
            .await
            .map_err(ApiError::join)??;

    broadcast_created(&state, &conversation);
    Ok((StatusCode::CREATED, Json(conversation)))
}

fn broadcast_created(state: &AppState, conversation: &Conversation) {
    state.dispatcher.broadcast(GatewayEvent::ConversationCreated {
        conversation_id: conversation.id,
        owner_id: conversation.owner_id,
        name: conversation.name.clone(),
        parent_message_id: conversation.parent_message_id,
    });
}
