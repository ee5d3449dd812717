//!
//! sessiongate HTTP server
//! -----------------------
//! Axum router for the OAuth session gateway.
//!
//! Responsibilities:
//! - Session gate in front of every route (see `gate`).
//! - OAuth login redirect and authorization-code callback.
//! - Fake-identity sign-in/out for test deployments.
//! - Logout, auth status, and active-profile switching.
//! - Pass-through CRUD for character profiles.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tracing::info;

use crate::config::GateConfig;
use crate::identity::{FakeIdentityProvider, InMemoryProfileStore, OAuthClient, OAuthProvider, ProfileStore, RestProfileStore};

pub mod gate;
pub mod handlers;
pub mod status;

/// Shared server state injected into all handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub fake: FakeIdentityProvider,
}

impl AppState {
    pub fn new(config: GateConfig, oauth: Arc<dyn OAuthProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        let fake = FakeIdentityProvider::new(&config.fake_auth);
        Self { config: Arc::new(config), oauth, profiles, fake }
    }

    /// Wire the real provider client and whichever profile store the config names.
    pub fn from_config(config: GateConfig) -> anyhow::Result<Self> {
        let oauth = OAuthClient::new(config.oauth.clone(), config.oauth_timeout)
            .context("While building the OAuth provider client")?;
        let profiles: Arc<dyn ProfileStore> = match &config.profile_store {
            Some(store_cfg) => Arc::new(
                RestProfileStore::new(store_cfg, config.oauth_timeout).context("While building the profile store client")?,
            ),
            None => Arc::new(InMemoryProfileStore::new()),
        };
        Ok(Self::new(config, Arc::new(oauth), profiles))
    }
}

/// All routes, wrapped by the session gate. The fallback is added before the
/// layer so unmatched paths are gated too.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/auth/login", get(handlers::login_redirect))
        .route("/auth/callback", get(handlers::auth_callback))
        .route("/api/auth/fake-signin", post(handlers::fake_signin))
        .route("/api/auth/fake-logout", post(handlers::fake_logout))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/status", get(handlers::status))
        .route("/api/auth/switch-profile", post(handlers::switch_profile))
        .route("/api/auth/test", get(handlers::auth_debug))
        .route("/api/auth/profile", get(handlers::active_profile))
        .route("/api/user", get(handlers::current_user))
        .route(
            "/api/profiles",
            get(handlers::list_profiles).post(handlers::create_profile).put(handlers::update_profile),
        )
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), gate::session_gate))
        .with_state(state)
}

fn log_startup(cfg: &GateConfig) {
    let store = if cfg.profile_store.is_some() { "postgrest" } else { "in-memory" };
    info!(
        target: "startup",
        "sessiongate starting: http_port={}, production={}, fake_auth={}, profile_store={}, authorize_url={}",
        cfg.http_port, cfg.production, cfg.fake_auth.enabled, store, cfg.oauth.authorize_url
    );
    if cfg.client.client_id.is_empty() {
        tracing::warn!(target: "startup", "OAUTH_CLIENT_ID is empty; real sign-in will fail at the provider");
    }
}

pub async fn run_with_config(config: GateConfig) -> anyhow::Result<()> {
    log_startup(&config);
    let port = config.http_port;
    let state = AppState::from_config(config)?;
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point reading the configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(GateConfig::from_env()?).await
}
