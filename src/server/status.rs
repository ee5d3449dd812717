//! Client-observable authentication status.

use std::time::Duration;

use axum::http::header::COOKIE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cookies::CookieJar;
use crate::identity::{FakeIdentityProvider, Identity, Session};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub is_authenticated: bool,
    pub user: Option<Identity>,
}

impl AuthStatus {
    pub fn unauthenticated() -> Self { Self::default() }

    pub fn authenticated(identity: Identity) -> Self {
        Self { is_authenticated: true, user: Some(identity) }
    }

    /// Decode a status body received over the network. Anything short of a
    /// well-formed authenticated answer with a user reads as unauthenticated.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<AuthStatus>(body) {
            Ok(AuthStatus { is_authenticated: true, user: Some(user) }) => Self::authenticated(user),
            Ok(_) => Self::unauthenticated(),
            Err(e) => {
                debug!(target: "sessiongate::status", "unreadable status body ({} bytes): {}", body.len(), e);
                Self::unauthenticated()
            }
        }
    }
}

pub struct AuthStatusService;

impl AuthStatusService {
    /// Fake mode first, then whatever identity the gate attached, else nobody.
    pub fn get_status(fake: &FakeIdentityProvider, jar: &CookieJar, session: &Session) -> AuthStatus {
        if fake.is_active(jar) {
            return AuthStatus::authenticated(fake.identity().clone());
        }
        match &session.identity {
            Some(identity) if !session.is_fake_session => AuthStatus::authenticated(identity.clone()),
            _ => AuthStatus::unauthenticated(),
        }
    }
}

/// Reads `/api/auth/status` of a running gateway on behalf of a browser-less
/// client. Never fails: transport errors and odd bodies mean unauthenticated.
pub struct StatusClient {
    http: reqwest::Client,
    status_url: String,
}

impl StatusClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, status_url: format!("{}/api/auth/status", base_url.trim_end_matches('/')) })
    }

    pub async fn fetch(&self, cookie_header: Option<&str>) -> AuthStatus {
        let mut req = self.http.get(&self.status_url);
        if let Some(c) = cookie_header { req = req.header(COOKIE, c); }
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(target: "sessiongate::status", "status request failed: {}", e);
                return AuthStatus::unauthenticated();
            }
        };
        if !resp.status().is_success() { return AuthStatus::unauthenticated(); }
        match resp.bytes().await {
            Ok(body) => AuthStatus::from_body(&body),
            Err(_) => AuthStatus::unauthenticated(),
        }
    }
}
