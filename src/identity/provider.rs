use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::config::{ClientCredentials, OAuthEndpoints};
use crate::error::AuthError;

use super::principal::Identity;

pub const RESPONSE_TYPE: &str = "code";

/// Result of a successful authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    /// Cookie lifetime: provider-given `expires_in`, or `fallback` when it is missing or zero.
    pub fn max_age_secs(&self, fallback: u64) -> u64 {
        self.expires_in.filter(|s| *s > 0).unwrap_or(fallback)
    }
}

/// `GET {authorize_url}?client_id&redirect_uri&response_type=code&scope`.
pub fn build_authorization_url(endpoints: &OAuthEndpoints, client_id: &str, redirect_uri: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type={}&scope={}",
        endpoints.authorize_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        RESPONSE_TYPE,
        urlencoding::encode(&endpoints.scope),
    )
}

/// Remote identity provider as seen by the gate and the callback handler.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Trade a single-use authorization code for an access token. Never retried.
    async fn exchange_code(&self, code: &str, client: &ClientCredentials) -> Result<TokenGrant, AuthError>;

    /// `TokenInvalid` on 401/403, `UserInfoUnavailable` on anything else that is not a usable identity.
    async fn fetch_user_info(&self, access_token: &str) -> Result<Identity, AuthError>;
}

/// reqwest-backed client for the configured provider.
pub struct OAuthClient {
    http: reqwest::Client,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn new(endpoints: OAuthEndpoints, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoints })
    }
}

#[async_trait]
impl OAuthProvider for OAuthClient {
    async fn exchange_code(&self, code: &str, client: &ClientCredentials) -> Result<TokenGrant, AuthError> {
        // Parameters go on the query string of an empty POST, so reqwest errors
        // carry the client secret in their URL and must be stripped with `without_url`.
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("code", code),
        ];
        let resp = self.http.post(&self.endpoints.token_url).query(&params).send().await.map_err(|e| {
            let e = e.without_url();
            warn!(target: "sessiongate::oauth", "token endpoint unreachable: {}", e);
            AuthError::TokenExchangeFailed(e.to_string())
        })?;
        let status = resp.status();
        if !status.is_success() {
            warn!(target: "sessiongate::oauth", "token endpoint returned {}", status);
            return Err(AuthError::TokenExchangeFailed(format!("status {}", status)));
        }
        resp.json::<TokenGrant>().await.map_err(|e| {
            let e = e.without_url();
            warn!(target: "sessiongate::oauth", "token response undecodable: {}", e);
            AuthError::TokenExchangeFailed(e.to_string())
        })
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<Identity, AuthError> {
        let resp = self.http.get(&self.endpoints.user_info_url).bearer_auth(access_token).send().await.map_err(|e| {
            let e = e.without_url();
            warn!(target: "sessiongate::oauth", "userinfo endpoint unreachable: {}", e);
            AuthError::UserInfoUnavailable(e.to_string())
        })?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::TokenInvalid),
            s if s.is_success() => resp.json::<Identity>().await.map_err(|e| {
                let e = e.without_url();
                warn!(target: "sessiongate::oauth", "userinfo body undecodable: {}", e);
                AuthError::UserInfoUnavailable(e.to_string())
            }),
            s => {
                warn!(target: "sessiongate::oauth", "userinfo endpoint returned {}", s);
                Err(AuthError::UserInfoUnavailable(format!("status {}", s)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_has_all_params() {
        let endpoints = OAuthEndpoints { authorize_url: "https://idp.test/oauth/authorize".into(), ..Default::default() };
        let url = build_authorization_url(&endpoints, "client 1", "https://app.test/auth/callback");
        assert_eq!(
            url,
            "https://idp.test/oauth/authorize?client_id=client%201&redirect_uri=https%3A%2F%2Fapp.test%2Fauth%2Fcallback&response_type=code&scope="
        );
    }

    #[test]
    fn authorization_url_encodes_scope() {
        let endpoints = OAuthEndpoints { scope: "read write".into(), ..Default::default() };
        assert!(build_authorization_url(&endpoints, "c", "r").ends_with("&scope=read%20write"));
    }

    #[test]
    fn grant_max_age_falls_back() {
        let g = |e| TokenGrant { access_token: "t".into(), expires_in: e };
        assert_eq!(g(Some(3600)).max_age_secs(86400), 3600);
        assert_eq!(g(Some(0)).max_age_secs(86400), 86400);
        assert_eq!(g(None).max_age_secs(86400), 86400);
    }
}
