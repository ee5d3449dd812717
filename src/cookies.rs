//! Small string-valued session cookies.
//!
//! `CookieJar` is built from the request's `Cookie` header, answers reads, and
//! queues `Set-Cookie` lines for writes and deletions. It is both an extractor
//! and a response part, so a handler can take it as an argument and hand it
//! back in its response tuple.
//!
//! Deleting a cookie only works when the deletion carries the same `Path` the
//! cookie was set with; browsers keep the stale cookie otherwise. The jar does
//! not track set-time paths for you.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use tracing::warn;

use crate::tprintln;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const FAKE_AUTH_COOKIE: &str = "fake_auth_active";
pub const SELECTED_PROFILE_COOKIE: &str = "selected_profile_id";

/// Max-age of every session cookie unless the provider says otherwise.
pub const DEFAULT_MAX_AGE_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite { Strict, Lax, None }

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub http_only: bool,
    pub secure: bool,
    pub path: String,
    pub same_site: SameSite,
    pub max_age_secs: Option<u64>,
}

impl CookiePolicy {
    /// Policy of the real session token: HTTP-only, lax, `Secure` only in production.
    pub fn access_token(secure: bool, max_age_secs: u64) -> Self {
        Self { http_only: true, secure, path: "/".into(), same_site: SameSite::Lax, max_age_secs: Some(max_age_secs) }
    }

    /// Policy of the fake-auth flag and the selected profile id. Readable by
    /// page scripts and valid over plain HTTP.
    pub fn client_readable() -> Self {
        Self { http_only: false, secure: false, path: "/".into(), same_site: SameSite::Lax, max_age_secs: Some(DEFAULT_MAX_AGE_SECS) }
    }
}

fn render_set(name: &str, value: &str, policy: &CookiePolicy) -> String {
    let mut out = format!("{}={}; Path={}", name, value, policy.path);
    if let Some(max_age) = policy.max_age_secs { out.push_str(&format!("; Max-Age={}", max_age)); }
    if policy.http_only { out.push_str("; HttpOnly"); }
    if policy.secure { out.push_str("; Secure"); }
    out.push_str(&format!("; SameSite={}", policy.same_site.as_str()));
    out
}

fn render_delete(name: &str, path: &str) -> String {
    format!("{}=deleted; Path={}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT", name, path)
}

#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    values: HashMap<String, String>,
    pending: Vec<String>,
}

impl CookieJar {
    pub fn new() -> Self { Self::default() }

    /// Parse every `Cookie` header. The first occurrence of a name wins, as browsers send the most specific path first.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut values = HashMap::new();
        for header in headers.get_all(COOKIE) {
            let Ok(s) = header.to_str() else { continue; };
            for part in s.split(';') {
                let p = part.trim();
                if let Some(eq) = p.find('=') {
                    let (k, v) = p.split_at(eq);
                    values.entry(k.trim().to_string()).or_insert_with(|| v[1..].trim().to_string());
                }
            }
        }
        Self { values, pending: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool { self.values.contains_key(name) }

    /// Value content is not validated.
    pub fn set(&mut self, name: &str, value: &str, policy: &CookiePolicy) {
        tprintln!("cookie.set name={} path={} max_age={:?}", name, policy.path, policy.max_age_secs);
        self.values.insert(name.to_string(), value.to_string());
        self.pending.push(render_set(name, value, policy));
    }

    /// Expire `name`. `path` must equal the path used at set-time.
    pub fn delete(&mut self, name: &str, path: &str) {
        tprintln!("cookie.delete name={} path={}", name, path);
        self.values.remove(name);
        self.pending.push(render_delete(name, path));
    }

    /// Queued `Set-Cookie` lines, in write order.
    pub fn pending(&self) -> &[String] { &self.pending }

    /// Remove and return the queued lines, leaving the read view untouched.
    pub fn take_pending(&mut self) -> Vec<String> { std::mem::take(&mut self.pending) }

    /// Append `Set-Cookie` headers for `lines` to `headers`.
    pub fn write_set_cookies(lines: &[String], headers: &mut HeaderMap) {
        for line in lines {
            match HeaderValue::from_str(line) {
                Ok(v) => { headers.append(SET_COOKIE, v); }
                Err(e) => warn!(target: "sessiongate::http", "dropping unencodable Set-Cookie header: {}", e),
            }
        }
    }
}

impl<S> FromRequestParts<S> for CookieJar
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    /// The session gate leaves its own jar (with evictions already applied) in
    /// the request extensions; fall back to the raw headers otherwise.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(jar) = parts.extensions.get::<CookieJar>() {
            return Ok(CookieJar { values: jar.values.clone(), pending: Vec::new() });
        }
        Ok(CookieJar::from_headers(&parts.headers))
    }
}

impl IntoResponseParts for CookieJar {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        CookieJar::write_set_cookies(&self.pending, res.headers_mut());
        Ok(res)
    }
}
