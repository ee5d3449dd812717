use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cookies::{CookieJar, CookiePolicy, ACCESS_TOKEN_COOKIE, DEFAULT_MAX_AGE_SECS};
use crate::error::{AppError, AppResult, AuthError};
use crate::identity::{
    build_authorization_url, ensure_profile, ensure_profiles, Identity, Profile, ProfileSelector, Session,
};

use super::status::AuthStatusService;
use super::AppState;

fn require_identity(session: &Session) -> AppResult<&Identity> {
    session.identity.as_ref().ok_or_else(|| AuthError::Unauthenticated.into())
}

fn found(jar: CookieJar, location: &str) -> Response {
    (StatusCode::FOUND, jar, [(LOCATION, location.to_string())]).into_response()
}

pub async fn root() -> &'static str { "sessiongate ok" }

pub async fn not_found() -> AppError {
    AppError::not_found("not_found", "No such route")
}

/// `GET /auth/login`: send the browser to the provider's consent page.
pub async fn login_redirect(State(state): State<AppState>) -> Response {
    let client = &state.config.client;
    let url = build_authorization_url(&state.config.oauth, &client.client_id, &client.redirect_uri);
    found(CookieJar::new(), &url)
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
}

/// `GET /auth/callback?code=`
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    mut jar: CookieJar,
) -> AppResult<Response> {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Err(AppError::user("missing_code", "Missing code"));
    };
    let grant = state.oauth.exchange_code(&code, &state.config.client).await.map_err(|e| {
        warn!(target: "sessiongate::http", "authorization code exchange failed: {}", e);
        AppError::from(e)
    })?;
    let policy = CookiePolicy::access_token(state.config.production, grant.max_age_secs(DEFAULT_MAX_AGE_SECS));
    jar.set(ACCESS_TOKEN_COOKIE, &grant.access_token, &policy);
    info!(target: "sessiongate::http", "access token issued, max_age={}s", policy.max_age_secs.unwrap_or_default());
    Ok(found(jar, "/"))
}

/// `POST /api/auth/fake-signin`
pub async fn fake_signin(State(state): State<AppState>, mut jar: CookieJar) -> AppResult<(CookieJar, Json<Value>)> {
    if !state.fake.is_enabled() {
        return Err(AppError::forbidden("fake_auth_disabled", "Fake authentication is not enabled"));
    }
    state.fake.activate(&mut jar);
    let identity = state.fake.identity();
    if let Err(e) = ensure_profiles(state.profiles.as_ref(), identity).await {
        warn!(target: "sessiongate::profiles", "profile initialization for fake user failed: {}", e);
    }
    ProfileSelector::resolve_selected_id(&mut jar, identity);
    info!(target: "sessiongate::http", "fake authentication activated");
    Ok((jar, Json(json!({"success": true, "message": "Fake authentication activated", "user": identity}))))
}

/// `POST /api/auth/fake-logout`
pub async fn fake_logout(State(state): State<AppState>, mut jar: CookieJar) -> (CookieJar, Json<Value>) {
    state.fake.deactivate(&mut jar);
    ProfileSelector::clear_selected(&mut jar);
    info!(target: "sessiongate::http", "fake authentication and profile selection cleared");
    (jar, Json(json!({"success": true, "message": "Fake authentication cleared"})))
}

/// `POST /api/auth/logout`
pub async fn logout(mut jar: CookieJar) -> (CookieJar, Json<Value>) {
    jar.delete(ACCESS_TOKEN_COOKIE, "/");
    ProfileSelector::clear_selected(&mut jar);
    (jar, Json(json!({"success": true})))
}

/// `GET /api/auth/status`
pub async fn status(State(state): State<AppState>, Extension(session): Extension<Session>, jar: CookieJar) -> impl IntoResponse {
    Json(AuthStatusService::get_status(&state.fake, &jar, &session))
}

#[derive(Debug, Deserialize)]
pub struct SwitchProfilePayload {
    #[serde(rename = "profileId", default)]
    profile_id: Option<i64>,
}

/// `POST /api/auth/switch-profile {profileId}`
pub async fn switch_profile(
    Extension(session): Extension<Session>,
    mut jar: CookieJar,
    payload: Result<Json<SwitchProfilePayload>, JsonRejection>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let profile_id = payload
        .ok()
        .and_then(|Json(p)| p.profile_id)
        .ok_or_else(|| AppError::user("profile_id_required", "Profile ID is required"))?;
    let identity = require_identity(&session)?;
    ProfileSelector::set_selected(&mut jar, identity, profile_id)?;
    info!(target: "sessiongate::http", "user {} switched profile to {} (fake={})", identity.id, profile_id, session.is_fake_session);
    Ok((jar, Json(json!({"success": true, "message": "Profile switched successfully", "profileId": profile_id}))))
}

/// `GET /api/user`: the identity the gate attached.
pub async fn current_user(Extension(session): Extension<Session>) -> AppResult<Json<Identity>> {
    Ok(Json(require_identity(&session)?.clone()))
}

/// `GET /api/auth/test`: diagnostic snapshot of the auth state.
pub async fn auth_debug(State(state): State<AppState>, Extension(session): Extension<Session>, jar: CookieJar) -> Json<Value> {
    let status = AuthStatusService::get_status(&state.fake, &jar, &session);
    let selected_profile_id = ProfileSelector::get_selected(&jar);
    let selected_profile = match (&status.user, selected_profile_id) {
        (Some(user), Some(id)) => user.character(id).cloned(),
        _ => None,
    };
    let environment = if state.config.production { "production" } else { "development" };
    Json(json!({
        "requestId": session.request_id,
        "hasToken": jar.contains(ACCESS_TOKEN_COOKIE),
        "hasUser": session.identity.is_some(),
        "user": status.user,
        "isAuthenticated": status.is_authenticated,
        "isFakeAuth": state.fake.is_enabled(),
        "isFakeActive": state.fake.is_active(&jar),
        "selectedProfileId": selected_profile_id,
        "selectedProfile": selected_profile,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": environment,
    }))
}

/// `GET /api/auth/profile`: active profile, creating its row on first use.
pub async fn active_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    mut jar: CookieJar,
) -> AppResult<(CookieJar, Json<Value>)> {
    let identity = require_identity(&session)?;
    let store = state.profiles.as_ref();
    let Some(id) = ProfileSelector::resolve_selected_id(&mut jar, identity) else {
        return Ok((jar, Json(json!({"profileId": null, "profile": null}))));
    };
    let profile = match ProfileSelector::resolve_profile(&mut jar, identity, store).await? {
        Some(p) => p,
        None => ensure_profile(store, identity, id).await?,
    };
    Ok((jar, Json(json!({"profileId": id, "profile": profile}))))
}

#[derive(Debug, Deserialize)]
pub struct ProfilesQuery {
    #[serde(rename = "characterIds", default)]
    character_ids: Option<String>,
}

fn parse_character_ids(raw: Option<&str>) -> AppResult<Vec<i64>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| AppError::user("character_ids_required", "Character IDs are required"))?;
    raw.split(',')
        .map(|s| s.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| AppError::user("character_ids_invalid", "Character IDs must be integers"))
}

fn require_owned(identity: &Identity, id: i64) -> AppResult<()> {
    if identity.owns_character(id) { return Ok(()); }
    Err(AppError::forbidden("profile_not_owned".to_string(), format!("Profile {} does not belong to the current user", id)))
}

/// `GET /api/profiles?characterIds=1,2`
pub async fn list_profiles(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ProfilesQuery>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session)?;
    let ids = parse_character_ids(query.character_ids.as_deref())?;
    for id in &ids { require_owned(identity, *id)?; }
    let profiles = state.profiles.get_profiles(&ids).await?;
    Ok(Json(json!({"profiles": profiles})))
}

fn profile_body(payload: Result<Json<Profile>, JsonRejection>) -> AppResult<Profile> {
    payload.map(|Json(p)| p).map_err(|e| AppError::user("invalid_profile_body".to_string(), e.body_text()))
}

/// `POST /api/profiles`
pub async fn create_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<Profile>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session)?;
    let profile = profile_body(payload)?;
    require_owned(identity, profile.id)?;
    state.profiles.create_profile(&profile).await?;
    Ok(Json(json!({"success": true})))
}

/// `PUT /api/profiles`
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<Profile>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session)?;
    let profile = profile_body(payload)?;
    require_owned(identity, profile.id)?;
    state.profiles.update_profile(&profile).await?;
    Ok(Json(json!({"success": true})))
}
