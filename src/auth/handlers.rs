use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{AuthenticatedUser, Session};
use crate::shared::error::ApiResult;
use crate::shared::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: AuthenticatedUser,
    pub token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(req) = payload?;
    debug!("Login attempt for {}", req.email.trim());
    let user = state.authenticator.authenticate(&req.email, &req.password).await?;
    let token = state.sessions.issue(&user)?;
    Ok(Json(LoginResponse {
        success: true,
        user,
        token,
    }))
}

pub async fn current_session(session: Session) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "session": session }))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(current_session))
}
