use std::sync::Arc;

use tracing::debug;

use crate::config::FakeAuthConfig;
use crate::cookies::{CookieJar, CookiePolicy, FAKE_AUTH_COOKIE};

use super::principal::Identity;

/// Deterministic stand-in identity for test deployments.
///
/// `enabled` is fixed at construction. Whether a given browser is in fake mode
/// is carried by the `fake_auth_active` cookie.
#[derive(Debug, Clone)]
pub struct FakeIdentityProvider {
    enabled: bool,
    identity: Arc<Identity>,
}

impl FakeIdentityProvider {
    pub fn new(cfg: &FakeAuthConfig) -> Self {
        Self { enabled: cfg.enabled, identity: Arc::new(cfg.identity.clone()) }
    }

    pub fn is_enabled(&self) -> bool { self.enabled }

    pub fn is_active(&self, jar: &CookieJar) -> bool {
        self.enabled && jar.get(FAKE_AUTH_COOKIE) == Some("true")
    }

    /// Sets the flag cookie. Silently does nothing when the feature is
    /// disabled; check `is_enabled` first to report an error.
    pub fn activate(&self, jar: &mut CookieJar) {
        if !self.enabled {
            debug!(target: "sessiongate::fake", "fake auth disabled; activate ignored");
            return;
        }
        jar.set(FAKE_AUTH_COOKIE, "true", &CookiePolicy::client_readable());
    }

    /// Clears the flag only. The selected profile survives a mode switch.
    pub fn deactivate(&self, jar: &mut CookieJar) {
        jar.delete(FAKE_AUTH_COOKIE, "/");
    }

    pub fn identity(&self) -> &Identity { &self.identity }
}
