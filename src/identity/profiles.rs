//! Active-profile selection.
//!
//! The selected character id lives in its own cookie and does not care which
//! provider authenticated the caller, so it survives toggling fake mode.

use tracing::{debug, warn};

use crate::cookies::{CookieJar, CookiePolicy, SELECTED_PROFILE_COOKIE};
use crate::error::AuthError;

use super::principal::{Identity, Profile};
use super::store::{ProfileStore, StoreError};

pub struct ProfileSelector;

impl ProfileSelector {
    /// Selected id, or `None` when the cookie is missing or not an integer.
    pub fn get_selected(jar: &CookieJar) -> Option<i64> {
        jar.get(SELECTED_PROFILE_COOKIE).and_then(|v| v.trim().parse::<i64>().ok())
    }

    /// Persist `id` as the active profile. Rejects ids that are not one of the
    /// identity's characters and leaves the cookie untouched in that case.
    pub fn set_selected(jar: &mut CookieJar, identity: &Identity, id: i64) -> Result<(), AuthError> {
        if !identity.owns_character(id) {
            return Err(AuthError::InvalidProfile(id));
        }
        jar.set(SELECTED_PROFILE_COOKIE, &id.to_string(), &CookiePolicy::client_readable());
        Ok(())
    }

    pub fn clear_selected(jar: &mut CookieJar) {
        jar.delete(SELECTED_PROFILE_COOKIE, "/");
    }

    /// Selected id for `identity`, applying the default policy: with no usable
    /// selection, the first character becomes active and is written back so
    /// later requests read it instead of re-deriving it. A stored id that the
    /// identity does not own counts as no selection.
    pub fn resolve_selected_id(jar: &mut CookieJar, identity: &Identity) -> Option<i64> {
        if let Some(id) = Self::get_selected(jar) {
            if identity.owns_character(id) { return Some(id); }
            debug!(target: "sessiongate::profiles", "selected profile {} not owned by user {}; resetting", id, identity.id);
        }
        let first = identity.characters.first()?.id;
        jar.set(SELECTED_PROFILE_COOKIE, &first.to_string(), &CookiePolicy::client_readable());
        Some(first)
    }

    /// Stored profile of the active character. `Ok(None)` means the character
    /// has no row yet; creating it is the caller's job (see `ensure_profile`).
    pub async fn resolve_profile(
        jar: &mut CookieJar,
        identity: &Identity,
        store: &dyn ProfileStore,
    ) -> Result<Option<Profile>, StoreError> {
        let Some(id) = Self::resolve_selected_id(jar, identity) else { return Ok(None); };
        let found = store.get_profiles(&[id]).await?;
        Ok(found.into_iter().find(|p| p.id == id))
    }
}

/// Create the default profile for `character_id` if the store has none.
///
/// Not at-most-once: two concurrent first sign-ins can both try the insert.
/// The loser's duplicate-key error is logged and the default is returned.
pub async fn ensure_profile(store: &dyn ProfileStore, identity: &Identity, character_id: i64) -> Result<Profile, StoreError> {
    let Some(character) = identity.character(character_id) else { return Err(StoreError::NotFound(character_id)); };
    if let Some(existing) = store.get_profiles(&[character_id]).await?.into_iter().find(|p| p.id == character_id) {
        return Ok(existing);
    }
    let profile = Profile::default_for(character);
    match store.create_profile(&profile).await {
        Ok(()) => {
            debug!(target: "sessiongate::profiles", "created default profile {} ({})", profile.id, profile.display_name);
            Ok(profile)
        }
        Err(StoreError::Duplicate(id)) => {
            warn!(target: "sessiongate::profiles", "profile {} created concurrently; keeping existing row", id);
            Ok(profile)
        }
        Err(e) => Err(e),
    }
}

/// Make sure every character of `identity` has a profile. Returns profiles in
/// character order.
pub async fn ensure_profiles(store: &dyn ProfileStore, identity: &Identity) -> Result<Vec<Profile>, StoreError> {
    let mut existing = store.get_profiles(&identity.character_ids()).await?;
    let mut out = Vec::with_capacity(identity.characters.len());
    for character in &identity.characters {
        if let Some(pos) = existing.iter().position(|p| p.id == character.id) {
            out.push(existing.swap_remove(pos));
            continue;
        }
        let profile = Profile::default_for(character);
        match store.create_profile(&profile).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(id)) => {
                warn!(target: "sessiongate::profiles", "profile {} created concurrently; keeping existing row", id);
            }
            Err(e) => return Err(e),
        }
        out.push(profile);
    }
    Ok(out)
}
