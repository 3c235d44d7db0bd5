use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use eddy_types::api::{Claims, MessageResponse, PostMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Ids strictly greater than this: the incremental sync cursor a
    /// watcher uses after a `NewMessages` delta.
    pub after: Option<i64>,
    /// Ids strictly smaller than this; pages backward through history.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let author_login = claims.login.clone();

    // Run blocking DB work off the async runtime
    let message = tokio::task::spawn_blocking(move || {
        st.messages.post(conversation_id, claims.sub, &req.body, req.attachment.as_deref())
    })
    .await
    .map_err(ApiError::join)??;

    Ok((StatusCode::CREATED, Json(MessageResponse::from_message(message, author_login))))
}

/// Published messages only; quarantined ids silently disappear from
/// listings, exactly as they do from watcher deltas.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let limit = query.limit.min(200);

    let rows = tokio::task::spawn_blocking(move || {
        st.db.get_messages(&conversation_id.to_string(), limit, query.after, query.before)
    })
    .await
    .map_err(ApiError::join)??;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let author_login = row.author_login.clone();
        let message = row.into_message()?;
        messages.push(MessageResponse::from_message(message, author_login));
    }

    Ok(Json(messages))
}
