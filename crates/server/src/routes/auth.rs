use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use service::auth::domain::TokenPair;

use crate::errors::ApiError;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: String,
}

/// Spend a refresh token for a new pair.
pub async fn refresh(State(state): State<AppState>, Json(input): Json<RefreshInput>) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.tokens.refresh(&input.refresh_token).await?;
    Ok(Json(pair))
}

/// Revoke the session behind a refresh token. Repeating it is harmless.
pub async fn logout(State(state): State<AppState>, Json(input): Json<RefreshInput>) -> Result<StatusCode, ApiError> {
    state.tokens.revoke(&input.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
