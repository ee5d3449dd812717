use super::principal::Identity;

/// Token value attached to fake sessions in place of a provider token.
pub const FAKE_ACCESS_TOKEN: &str = "fake_token_for_testing";

/// Ambient state of a single request. Built by the session gate at request
/// entry, read by handlers through the request extensions, dropped at exit.
/// Nothing here outlives the request except what the cookies carry.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub request_id: String,
    pub access_token: Option<String>,
    pub identity: Option<Identity>,
    pub is_fake_session: bool,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { request_id: new_request_id(), ..Default::default() }
    }

    pub fn authenticated(identity: Identity, access_token: String) -> Self {
        Self { request_id: new_request_id(), access_token: Some(access_token), identity: Some(identity), is_fake_session: false }
    }

    pub fn fake(identity: Identity) -> Self {
        Self {
            request_id: new_request_id(),
            access_token: Some(FAKE_ACCESS_TOKEN.to_string()),
            identity: Some(identity),
            is_fake_session: true,
        }
    }

    pub fn is_authenticated(&self) -> bool { self.identity.is_some() }
}

/// Fresh v4 id correlating the gate and handler log lines of one request.
pub fn new_request_id() -> String { uuid::Uuid::new_v4().to_string() }
