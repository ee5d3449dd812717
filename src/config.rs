//! Process configuration. Built once at startup and shared read-only; nothing
//! here can be changed by a request.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::identity::{Character, Identity};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://ucp.gta.world/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://ucp.gta.world/oauth/token";
pub const DEFAULT_USER_INFO_URL: &str = "https://ucp.gta.world/api/user";

/// Remote provider endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub user_info_url: String,
    /// May be empty.
    pub scope: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            user_info_url: DEFAULT_USER_INFO_URL.into(),
            scope: String::new(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self { client_id: String::new(), client_secret: String::new(), redirect_uri: "http://localhost:7878/auth/callback".into() }
    }
}

/// Fake-identity mode. `enabled` is the system-wide switch; the per-browser
/// flag lives in a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeAuthConfig {
    pub enabled: bool,
    pub identity: Identity,
}

impl Default for FakeAuthConfig {
    fn default() -> Self { Self { enabled: false, identity: reference_fake_identity() } }
}

/// The deterministic identity of the reference deployment.
pub fn reference_fake_identity() -> Identity {
    Identity {
        id: 1,
        username: "TestUser".into(),
        confirmed: true,
        characters: vec![
            Character::new(5442345, 1, "Johnny", "Parker"),
            Character::new(24523534, 2, "Lester", "Dawson"),
            Character::new(9355356, 3, "Angela", "Rosetti"),
            Character::new(64364344, 4, "Justin", "Sanderson"),
            Character::new(5436635, 5, "Spencer", "Simon"),
            Character::new(1235162, 6, "Richard", "Watts"),
        ],
    }
}

/// Which paths the gate treats as API, auth-flow, or public.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub api_prefix: String,
    pub auth_prefix: String,
    pub public_paths: Vec<String>,
    pub login_path: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".into(),
            auth_prefix: "/auth/".into(),
            public_paths: vec!["/".into(), "/login".into(), "/signup".into()],
            login_path: "/login".into(),
        }
    }
}

/// PostgREST (Supabase) profile table. Absent means the in-memory store.
#[derive(Clone, PartialEq, Eq)]
pub struct ProfileStoreConfig {
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for ProfileStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStoreConfig").field("base_url", &self.base_url).field("api_key", &"***").finish()
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub http_port: u16,
    /// Adds `Secure` to the access_token cookie.
    pub production: bool,
    pub oauth: OAuthEndpoints,
    pub client: ClientCredentials,
    pub oauth_timeout: Duration,
    pub fake_auth: FakeAuthConfig,
    pub routes: RoutePolicy,
    pub profile_store: Option<ProfileStoreConfig>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            http_port: 7878,
            production: false,
            oauth: OAuthEndpoints::default(),
            client: ClientCredentials::default(),
            oauth_timeout: Duration::from_secs(10),
            fake_auth: FakeAuthConfig::default(),
            routes: RoutePolicy::default(),
            profile_store: None,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl GateConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = GateConfig::default();
        if let Some(port) = env_string("GATE_HTTP_PORT") {
            cfg.http_port = port.parse().with_context(|| format!("GATE_HTTP_PORT is not a port number: {}", port))?;
        }
        cfg.production = env_string("GATE_PRODUCTION").map(|v| parse_flag(&v)).unwrap_or(false);
        cfg.fake_auth.enabled = env_string("GATE_FAKE_AUTH").map(|v| parse_flag(&v)).unwrap_or(false);

        if let Some(v) = env_string("OAUTH_AUTHORIZE_URL") { cfg.oauth.authorize_url = v; }
        if let Some(v) = env_string("OAUTH_TOKEN_URL") { cfg.oauth.token_url = v; }
        if let Some(v) = env_string("OAUTH_USER_INFO_URL") { cfg.oauth.user_info_url = v; }
        if let Some(v) = env_string("OAUTH_SCOPE") { cfg.oauth.scope = v; }
        if let Some(v) = env_string("OAUTH_CLIENT_ID") { cfg.client.client_id = v; }
        if let Some(v) = env_string("OAUTH_CLIENT_SECRET") { cfg.client.client_secret = v; }
        if let Some(v) = env_string("OAUTH_REDIRECT_URI") { cfg.client.redirect_uri = v; }
        if let Some(secs) = env_string("OAUTH_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().with_context(|| format!("OAUTH_TIMEOUT_SECS is not a number: {}", secs))?;
            cfg.oauth_timeout = Duration::from_secs(secs);
        }

        cfg.profile_store = match (env_string("SUPABASE_URL"), env_string("SUPABASE_ANON_KEY")) {
            (Some(base_url), Some(api_key)) => Some(ProfileStoreConfig { base_url, api_key }),
            _ => None,
        };
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_identity_has_six_characters() {
        let id = reference_fake_identity();
        assert_eq!(id.username, "TestUser");
        assert_eq!(id.characters.len(), 6);
        assert_eq!(id.characters[0].id, 5442345);
        assert!(id.owns_character(1235162));
    }

    #[test]
    fn flags() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn defaults_are_safe() {
        let cfg = GateConfig::default();
        assert!(!cfg.fake_auth.enabled);
        assert!(!cfg.production);
        assert_eq!(cfg.routes.login_path, "/login");
        assert!(cfg.oauth.scope.is_empty());
        assert!(!format!("{:?}", ClientCredentials { client_secret: "s3cr3t".into(), ..Default::default() }).contains("s3cr3t"));
    }
}
