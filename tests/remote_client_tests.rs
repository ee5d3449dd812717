//! reqwest-backed clients against in-process axum servers bound to
//! ephemeral localhost ports: the OAuth provider client, the PostgREST
//! profile store, and the status client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Query;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use sessiongate::config::{ClientCredentials, GateConfig, OAuthEndpoints, ProfileStoreConfig};
use sessiongate::error::AuthError;
use sessiongate::identity::{InMemoryProfileStore, OAuthClient, OAuthProvider, Profile, ProfileStore, RestProfileStore, StoreError};
use sessiongate::server::status::StatusClient;
use sessiongate::server::{router, AppState};

const TIMEOUT: Duration = Duration::from_secs(5);

// Serve `app` on 127.0.0.1:0. Caller aborts the handle when done.
async fn serve(app: Router) -> (JoinHandle<()>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock server error: {e:?}");
        }
    });
    (handle, format!("http://{}", addr))
}

// Address nobody listens on.
async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn mock_token(Query(q): Query<HashMap<String, String>>, body: String) -> Response {
    let expected = [
        ("grant_type", "authorization_code"),
        ("client_id", "cid"),
        ("client_secret", "secret"),
        ("redirect_uri", "http://localhost/auth/callback"),
    ];
    if !body.is_empty() || expected.iter().any(|(k, v)| q.get(*k).map(|s| s.as_str()) != Some(*v)) {
        return (StatusCode::BAD_REQUEST, "bad client").into_response();
    }
    match q.get("code").map(|s| s.as_str()) {
        Some("abc123") => Json(json!({"access_token": "tok", "token_type": "Bearer", "expires_in": 3600})).into_response(),
        Some("noexp") => Json(json!({"access_token": "tok2"})).into_response(),
        Some("garbled") => "<html>oops</html>".into_response(),
        _ => (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response(),
    }
}

async fn mock_user(headers: HeaderMap) -> Response {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("");
    match auth {
        "Bearer good" => Json(json!({
            "id": 17, "username": "someone", "confirmed": 1,
            "character": [{"id": 5, "memberid": 17, "firstname": "Ada", "lastname": "Stone"}]
        }))
        .into_response(),
        "Bearer revoked" => StatusCode::UNAUTHORIZED.into_response(),
        "Bearer banned" => StatusCode::FORBIDDEN.into_response(),
        "Bearer garbled" => "not json".into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn endpoints(base: &str) -> OAuthEndpoints {
    OAuthEndpoints {
        authorize_url: format!("{}/oauth/authorize", base),
        token_url: format!("{}/oauth/token", base),
        user_info_url: format!("{}/api/user", base),
        scope: String::new(),
    }
}

fn credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        redirect_uri: "http://localhost/auth/callback".into(),
    }
}

async fn provider() -> (JoinHandle<()>, OAuthClient) {
    let app = Router::new().route("/oauth/token", post(mock_token)).route("/api/user", get(mock_user));
    let (handle, base) = serve(app).await;
    (handle, OAuthClient::new(endpoints(&base), TIMEOUT).unwrap())
}

#[tokio::test]
async fn exchange_code_sends_query_parameters() {
    let (handle, client) = provider().await;
    let grant = client.exchange_code("abc123", &credentials()).await.unwrap();
    assert_eq!(grant.access_token, "tok");
    assert_eq!(grant.expires_in, Some(3600));

    let grant = client.exchange_code("noexp", &credentials()).await.unwrap();
    assert_eq!(grant.max_age_secs(86400), 86400);
    handle.abort();
}

#[tokio::test]
async fn exchange_code_failures() {
    let (handle, client) = provider().await;
    for code in ["expired", "garbled"] {
        let err = client.exchange_code(code, &credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed(_)), "{}: {:?}", code, err);
    }
    let mut wrong = credentials();
    wrong.client_secret = "nope".into();
    assert!(matches!(client.exchange_code("abc123", &wrong).await, Err(AuthError::TokenExchangeFailed(_))));
    handle.abort();
}

#[tokio::test]
async fn user_info_outcomes() {
    let (handle, client) = provider().await;
    let identity = client.fetch_user_info("good").await.unwrap();
    assert_eq!(identity.id, 17);
    assert!(identity.confirmed);
    assert_eq!(identity.characters[0].display_name(), "Ada Stone");

    assert_eq!(client.fetch_user_info("revoked").await, Err(AuthError::TokenInvalid));
    assert_eq!(client.fetch_user_info("banned").await, Err(AuthError::TokenInvalid));
    assert!(matches!(client.fetch_user_info("boom").await, Err(AuthError::UserInfoUnavailable(_))));
    assert!(matches!(client.fetch_user_info("garbled").await, Err(AuthError::UserInfoUnavailable(_))));
    handle.abort();
}

#[tokio::test]
async fn unreachable_provider() {
    let client = OAuthClient::new(endpoints(&dead_url().await), TIMEOUT).unwrap();
    assert!(matches!(client.fetch_user_info("good").await, Err(AuthError::UserInfoUnavailable(_))));
    assert!(matches!(client.exchange_code("abc123", &credentials()).await, Err(AuthError::TokenExchangeFailed(_))));
}

#[tokio::test]
async fn transport_errors_do_not_carry_the_client_secret() {
    let client = OAuthClient::new(endpoints(&dead_url().await), TIMEOUT).unwrap();
    let mut creds = credentials();
    creds.client_secret = "TOPSECRET42".into();
    let AuthError::TokenExchangeFailed(detail) = client.exchange_code("abc", &creds).await.unwrap_err() else {
        panic!("expected a token exchange failure");
    };
    assert!(!detail.contains("TOPSECRET42"), "{}", detail);
    assert!(!detail.contains("code=abc"), "{}", detail);
}

#[tokio::test]
async fn failed_callback_keeps_the_client_secret_private() {
    let mut cfg = GateConfig::default();
    cfg.oauth = endpoints(&dead_url().await);
    cfg.client.client_secret = "TOPSECRET42".into();
    let oauth = OAuthClient::new(cfg.oauth.clone(), TIMEOUT).unwrap();
    let app = router(AppState::new(cfg, Arc::new(oauth), Arc::new(InMemoryProfileStore::new())));

    let req = Request::builder().uri("/auth/callback?code=abc").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8_lossy(&bytes);
    assert!(!body.contains("TOPSECRET42"), "{}", body);
    assert!(!body.contains("/oauth/token"), "{}", body);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["code"], "token_exchange_failed");
    assert_eq!(v["error"], "Token exchange failed");
}

#[tokio::test]
async fn unreachable_store_error_is_generic() {
    let store = RestProfileStore::new(&ProfileStoreConfig { base_url: dead_url().await, api_key: "anon".into() }, TIMEOUT).unwrap();
    let err = store.get_profiles(&[5442345]).await.unwrap_err();
    assert!(!err.to_string().contains("5442345"), "{}", err);
    let app_err = sessiongate::error::AppError::from(err);
    assert_eq!(app_err.http_status(), 503);
    assert_eq!(app_err.message(), "Profile store unavailable");
}

// PostgREST stand-in holding rows as JSON.
type Rows = Arc<parking_lot::Mutex<Vec<Value>>>;

fn keyed(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some("anon")
        && headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer anon")
}

fn row_id(row: &Value) -> i64 { row["id"].as_i64().unwrap_or_default() }

async fn postgrest(rows: Rows) -> (JoinHandle<()>, String) {
    let list = {
        let rows = rows.clone();
        move |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
            if !keyed(&headers) { return StatusCode::UNAUTHORIZED.into_response(); }
            let filter = q.get("id").cloned().unwrap_or_default();
            let ids: Vec<i64> = filter
                .trim_start_matches("in.(")
                .trim_end_matches(')')
                .split(',')
                .filter_map(|s| s.parse().ok())
                .collect();
            // Ids come back as text, as some deployments do.
            let out: Vec<Value> = rows
                .lock()
                .iter()
                .filter(|r| ids.contains(&row_id(r)))
                .map(|r| {
                    let mut r = r.clone();
                    r["id"] = json!(row_id(&r).to_string());
                    r
                })
                .collect();
            Json(out).into_response()
        }
    };
    let insert = {
        let rows = rows.clone();
        move |headers: HeaderMap, Json(row): Json<Value>| async move {
            if !keyed(&headers) { return StatusCode::UNAUTHORIZED; }
            let mut rows = rows.lock();
            if rows.iter().any(|r| row_id(r) == row_id(&row)) { return StatusCode::CONFLICT; }
            rows.push(row);
            StatusCode::CREATED
        }
    };
    let update = {
        let rows = rows.clone();
        move |Query(q): Query<HashMap<String, String>>, Json(row): Json<Value>| async move {
            let id: i64 = q.get("id").and_then(|s| s.trim_start_matches("eq.").parse().ok()).unwrap_or_default();
            let mut rows = rows.lock();
            let updated: Vec<Value> = rows
                .iter_mut()
                .filter(|r| row_id(r) == id)
                .map(|r| { *r = row.clone(); r.clone() })
                .collect();
            Json(updated)
        }
    };
    serve(Router::new().route("/rest/v1/profiles", get(list).post(insert).patch(update))).await
}

#[tokio::test]
async fn rest_store_round_trip() {
    let rows: Rows = Arc::default();
    let (handle, base) = postgrest(rows.clone()).await;
    let store = RestProfileStore::new(&ProfileStoreConfig { base_url: format!("{}/", base), api_key: "anon".into() }, TIMEOUT).unwrap();

    let angela = Profile { id: 9355356, display_name: "Angela Rosetti".into(), ..Default::default() };
    store.create_profile(&angela).await.unwrap();
    assert_eq!(rows.lock()[0]["discord"], "");
    assert_eq!(store.create_profile(&angela).await, Err(StoreError::Duplicate(9355356)));

    let got = store.get_profiles(&[9355356, 1]).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, 9355356);
    assert_eq!(got[0].display_name, "Angela Rosetti");
    assert!(store.get_profiles(&[]).await.unwrap().is_empty());

    let mut edited = angela.clone();
    edited.phone_number = Some("555-0100".into());
    store.update_profile(&edited).await.unwrap();
    assert_eq!(rows.lock()[0]["phone_number"], "555-0100");

    let ghost = Profile { id: 1, display_name: "Nobody".into(), ..Default::default() };
    assert_eq!(store.update_profile(&ghost).await, Err(StoreError::NotFound(1)));
    handle.abort();
}

#[tokio::test]
async fn rest_store_backend_failures() {
    let unreachable = RestProfileStore::new(&ProfileStoreConfig { base_url: dead_url().await, api_key: "anon".into() }, TIMEOUT).unwrap();
    assert!(matches!(unreachable.get_profiles(&[1]).await, Err(StoreError::Backend(_))));

    let rows: Rows = Arc::default();
    let (handle, base) = postgrest(rows).await;
    let wrong = RestProfileStore::new(&ProfileStoreConfig { base_url: base, api_key: "other".into() }, TIMEOUT).unwrap();
    assert!(matches!(wrong.get_profiles(&[1]).await, Err(StoreError::Backend(_))));
    let p = Profile { id: 2, display_name: "X".into(), ..Default::default() };
    assert!(matches!(wrong.create_profile(&p).await, Err(StoreError::Backend(_))));
    handle.abort();
}

#[tokio::test]
async fn status_client_against_running_gateway() {
    let mut cfg = GateConfig::default();
    cfg.fake_auth.enabled = true;
    let (provider_handle, oauth) = provider().await;
    let state = AppState::new(cfg, Arc::new(oauth), Arc::new(InMemoryProfileStore::new()));
    let (handle, base) = serve(router(state)).await;

    let client = StatusClient::new(&base, TIMEOUT).unwrap();
    let anon = client.fetch(None).await;
    assert!(!anon.is_authenticated);

    let fake = client.fetch(Some("fake_auth_active=true")).await;
    assert!(fake.is_authenticated);
    assert_eq!(fake.user.unwrap().username, "TestUser");

    let real = client.fetch(Some("access_token=good")).await;
    assert_eq!(real.user.map(|u| u.id), Some(17));

    let revoked = client.fetch(Some("access_token=revoked")).await;
    assert!(!revoked.is_authenticated);
    handle.abort();
    provider_handle.abort();
}

#[tokio::test]
async fn status_client_never_fails() {
    let client = StatusClient::new(&dead_url().await, TIMEOUT).unwrap();
    assert!(!client.fetch(Some("fake_auth_active=true")).await.is_authenticated);

    let (handle, base) = serve(Router::new().route("/api/auth/status", get(|| async { "<html>502</html>" }))).await;
    let client = StatusClient::new(&base, TIMEOUT).unwrap();
    assert!(!client.fetch(None).await.is_authenticated);
    handle.abort();
}
