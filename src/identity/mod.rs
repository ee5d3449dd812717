//! Identity, per-request session, and the providers that produce them.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod fake;
mod profiles;
mod store;

pub use principal::{Character, Identity, Profile};
pub use session::{new_request_id, Session, FAKE_ACCESS_TOKEN};
pub use provider::{build_authorization_url, OAuthClient, OAuthProvider, TokenGrant};
pub use fake::FakeIdentityProvider;
pub use profiles::{ensure_profile, ensure_profiles, ProfileSelector};
pub use store::{InMemoryProfileStore, ProfileStore, RestProfileStore, StoreError};
