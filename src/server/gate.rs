//! Session gate: runs in front of every route and decides, per request, who
//! the caller is and whether the request may proceed.
//!
//! Evaluation order, first match wins:
//! 1. fake mode enabled and flagged in the cookie: fake identity, no checks.
//! 2. API path with an access_token cookie: validate against userinfo; on a
//!    provider rejection or outage drop the cookie and continue anonymously.
//! 3. page path that is not public or auth-flow, without an access_token:
//!    302 to the login page.
//! 4. everything else passes through.
//!
//! Page routes never validate the token; only its presence is checked there.

use axum::extract::{Request, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info_span, warn, Instrument};

use crate::config::RoutePolicy;
use crate::cookies::{CookieJar, ACCESS_TOKEN_COOKIE};
use crate::identity::{new_request_id, Session};

use super::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind { Api, AuthFlow, Public, Protected }

pub fn classify(policy: &RoutePolicy, path: &str) -> RouteKind {
    if path.starts_with(&policy.api_prefix) {
        RouteKind::Api
    } else if path.starts_with(&policy.auth_prefix) {
        RouteKind::AuthFlow
    } else if policy.public_paths.iter().any(|p| p == path) {
        RouteKind::Public
    } else {
        RouteKind::Protected
    }
}

/// Which branch of the gate resolved the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState { FakeActive, ApiWithToken, ProtectedRedirect, PassThrough }

#[derive(Debug, Clone)]
pub enum GateVerdict {
    Proceed { state: GateState, session: Session },
    Redirect { location: String },
}

/// Decide the fate of one request. Cookie evictions are queued on `jar`.
pub async fn evaluate(state: &AppState, path: &str, jar: &mut CookieJar) -> GateVerdict {
    if state.fake.is_enabled() && state.fake.is_active(jar) {
        debug!(target: "sessiongate::gate", "path={} state=fake_active", path);
        return GateVerdict::Proceed { state: GateState::FakeActive, session: Session::fake(state.fake.identity().clone()) };
    }

    let kind = classify(&state.config.routes, path);
    let access_token = jar.get(ACCESS_TOKEN_COOKIE).map(|s| s.to_string());
    debug!(target: "sessiongate::gate", "path={} kind={:?} has_token={}", path, kind, access_token.is_some());

    if kind == RouteKind::Api {
        if let Some(token) = access_token {
            let session = match state.oauth.fetch_user_info(&token).await {
                Ok(identity) => {
                    debug!(target: "sessiongate::gate", "path={} token valid for user={}", path, identity.id);
                    Session::authenticated(identity, token)
                }
                Err(e) => {
                    warn!(target: "sessiongate::gate", "path={} token validation failed: {}", path, e);
                    if e.evicts_token() { jar.delete(ACCESS_TOKEN_COOKIE, "/"); }
                    Session::anonymous()
                }
            };
            return GateVerdict::Proceed { state: GateState::ApiWithToken, session };
        }
    }

    if kind == RouteKind::Protected && access_token.is_none() {
        debug!(target: "sessiongate::gate", "path={} redirecting to {}", path, state.config.routes.login_path);
        return GateVerdict::Redirect { location: state.config.routes.login_path.clone() };
    }

    GateVerdict::Proceed { state: GateState::PassThrough, session: Session::anonymous() }
}

/// Response header echoing the id the gate assigned to the request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// axum middleware wrapper around [`evaluate`]. Runs the request inside a
/// `request` span keyed by a fresh request id, attaches the `Session` and the
/// gate's view of the cookies to the request extensions, and appends any
/// evictions to the response.
pub async fn session_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let request_id = new_request_id();
    let span = info_span!(target: "sessiongate::gate", "request", request_id = %request_id, path = %req.uri().path());
    let mut resp = gate_request(state, req, next, &request_id).instrument(span).await;
    match HeaderValue::from_str(&request_id) {
        Ok(v) => { resp.headers_mut().insert(REQUEST_ID_HEADER, v); }
        Err(e) => warn!(target: "sessiongate::gate", "unencodable request id: {}", e),
    }
    resp
}

async fn gate_request(state: AppState, mut req: Request, next: Next, request_id: &str) -> Response {
    let path = req.uri().path().to_string();
    let mut jar = CookieJar::from_headers(req.headers());
    let verdict = evaluate(&state, &path, &mut jar).await;
    let evictions = jar.take_pending();

    let mut resp = match verdict {
        GateVerdict::Redirect { location } => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        GateVerdict::Proceed { mut session, .. } => {
            session.request_id = request_id.to_string();
            req.extensions_mut().insert(session);
            req.extensions_mut().insert(jar);
            next.run(req).await
        }
    };
    CookieJar::write_set_cookies(&evictions, resp.headers_mut());
    resp
}
