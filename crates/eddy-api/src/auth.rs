use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use eddy_core::{Conversations, Messages, Moderation};
use eddy_db::Database;
use eddy_gateway::Dispatcher;
use eddy_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub messages: Messages,
    pub moderation: Moderation,
    pub conversations: Conversations,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.login.len() < 3 || req.login.len() > 32 {
        return Err(ApiError::BadRequest("login must be 3-32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    let user_id = Uuid::new_v4();

    // Argon2 hashing and the insert are blocking; run off the async runtime
    let st = state.clone();
    let login = req.login.clone();
    tokio::task::spawn_blocking(move || {
        if st.db.get_user_by_login(&login)?.is_some() {
            return Err(ApiError::Conflict("login is taken".into()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|_| ApiError::Internal)?
            .to_string();

        st.db.create_user(&user_id.to_string(), &login, &password_hash)?;
        Ok(())
    })
    .await
    .map_err(ApiError::join)??;

    let token = create_token(&state.jwt_secret, user_id, &req.login).map_err(|_| ApiError::Internal)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let login = req.login.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<eddy_db::models::UserRow, ApiError> {
        let user = st.db.get_user_by_login(&login)?.ok_or(ApiError::Unauthorized)?;

        let parsed_hash = PasswordHash::new(&user.password).map_err(|_| ApiError::Internal)?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(user)
    })
    .await
    .map_err(ApiError::join)??;

    let user_id: Uuid = user.id.parse().map_err(|_| ApiError::Internal)?;
    let token = create_token(&state.jwt_secret, user_id, &user.login).map_err(|_| ApiError::Internal)?;

    Ok(Json(LoginResponse { user_id, login: user.login, token }))
}

fn create_token(secret: &str, user_id: Uuid, login: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        login: login.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
