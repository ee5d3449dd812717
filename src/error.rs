//! Unified application error model and mapping helpers.
//! `AuthError` is the taxonomy raised by the identity layer; `AppError` is what
//! HTTP handlers return, and knows how to render itself as a JSON response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

use crate::identity::StoreError;

/// Failures of the authentication flow. Provider-call failures are always
/// converted into one of these; raw transport errors never reach a client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Provider rejected the authorization code or client credentials. Codes are single-use, never retried.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    /// Provider rejected the bearer token (401/403).
    #[error("access token rejected by provider")]
    TokenInvalid,
    /// Network failure, timeout, 5xx, or an undecodable userinfo body.
    #[error("user info unavailable: {0}")]
    UserInfoUnavailable(String),
    #[error("profile {0} does not belong to the current identity")]
    InvalidProfile(i64),
    #[error("not authenticated")]
    Unauthenticated,
}

impl AuthError {
    /// Only these failures make the gate drop the access_token cookie.
    pub fn evicts_token(&self) -> bool {
        matches!(self, AuthError::TokenInvalid | AuthError::UserInfoUnavailable(_))
    }
}

/// What a gateway handler answers with when it cannot complete a request.
/// The variant picks the status line; `code` is the stable machine-readable
/// tag and `message` is shown to the browser as-is, so it must never carry
/// provider or store internals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    /// An upstream collaborator (provider userinfo, profile store) is unavailable.
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    fn parts(&self) -> (&str, &str) {
        match self {
            AppError::UserInput { code, message }
            | AppError::Auth { code, message }
            | AppError::Forbidden { code, message }
            | AppError::NotFound { code, message }
            | AppError::Conflict { code, message }
            | AppError::Io { code, message }
            | AppError::Internal { code, message } => (code, message),
        }
    }

    pub fn code_str(&self) -> &str { self.parts().0 }

    pub fn message(&self) -> &str { self.parts().1 }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Status line of the JSON error response.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (code, message) = self.parts();
        write!(f, "{} ({}): {}", code, self.http_status(), message)
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

// Startup-time failures only; the cause stays in the server log.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(target: "sessiongate::http", "internal error: {:#}", err);
        AppError::internal("internal_error", "Internal server error")
    }
}

/// Upstream detail (provider or store error text) is logged where it happens
/// and replaced by a fixed message here.
impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExchangeFailed(_) => AppError::internal("token_exchange_failed", "Token exchange failed"),
            AuthError::TokenInvalid => AppError::auth("token_invalid", "Access token rejected by provider"),
            AuthError::UserInfoUnavailable(_) => AppError::io("user_info_unavailable", "Identity provider unavailable"),
            AuthError::InvalidProfile(_) => AppError::user("invalid_profile".to_string(), err.to_string()),
            AuthError::Unauthenticated => AppError::auth("unauthenticated", "Not authenticated"),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => AppError::conflict("profile_exists".to_string(), err.to_string()),
            StoreError::NotFound(_) => AppError::not_found("profile_not_found".to_string(), err.to_string()),
            StoreError::Backend(_) => AppError::io("profile_store_unavailable", "Profile store unavailable"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({"success": false, "error": self.message(), "code": self.code_str()});
        (status, Json(body)).into_response()
    }
}
