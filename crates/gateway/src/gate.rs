use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use kma_core::mask_secret;
use log::{error, warn};
use serde_json::json;

use crate::{ApiKeyStoreError, AppState};

pub const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(thiserror::Error, Debug)]
pub enum GateError {
    #[error("missing api key")]
    MissingKey,
    #[error("unknown api key")]
    UnknownKey,
    #[error("api key is inactive")]
    InactiveKey,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("api key lookup failed: {0}")]
    Store(#[from] ApiKeyStoreError),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::MissingKey | GateError::UnknownKey | GateError::InactiveKey => {
                StatusCode::UNAUTHORIZED
            }
            GateError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let message = match self {
            GateError::Store(_) => String::from("internal error"),
            ref other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

/// Owner of the key that passed the gate, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedKey {
    pub owner: String,
    pub limit_per_minute: u32,
}

/// Rejects requests without a known, active `X-API-KEY`, then spends one
/// token from that key's bucket.
pub async fn rate_limit_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or(GateError::MissingKey)?
        .to_string();

    let credential = state
        .api_keys
        .find(&api_key)
        .await
        .map_err(|e| {
            error!("error looking up api key {}: {}", mask_secret(&api_key), e);
            e
        })?
        .ok_or_else(|| {
            warn!("rejected unknown api key {}", mask_secret(&api_key));
            GateError::UnknownKey
        })?;

    if !credential.active {
        warn!("rejected inactive api key of {}", credential.owner);
        return Err(GateError::InactiveKey);
    }

    if !state
        .rate_limiter
        .admit(&credential.api_key, credential.limit_per_minute)
    {
        warn!(
            "rate limit of {} req/min exceeded by {}",
            credential.limit_per_minute, credential.owner
        );
        return Err(GateError::RateLimited);
    }

    request.extensions_mut().insert(AuthenticatedKey {
        owner: credential.owner,
        limit_per_minute: credential.limit_per_minute,
    });
    Ok(next.run(request).await)
}
