use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use eddy_core::CoreError;
use eddy_types::api::Claims;
use eddy_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiError;

/// File an abuse report against a message. Duplicate reports from the
/// same user succeed without changing anything.
pub async fn report_abuse(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let (outcome, conversation_id) = tokio::task::spawn_blocking(move || {
        let message = st.messages.get(message_id)?;
        let outcome = st.moderation.report(message_id, claims.sub)?;
        Ok::<_, CoreError>((outcome, message.conversation_id))
    })
    .await
    .map_err(ApiError::join)??;

    if outcome.quarantined {
        state
            .dispatcher
            .broadcast(GatewayEvent::MessageQuarantined { conversation_id, message_id });
    }

    Ok(Json(outcome))
}
