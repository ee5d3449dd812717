//! Profile-storage collaborator.
//!
//! The store's uniqueness on `id` is the only guard against two concurrent
//! first sign-ins creating the same profile; callers treat
//! `StoreError::Duplicate` on create as "someone else got there first".

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::config::ProfileStoreConfig;

use super::principal::Profile;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("profile {0} already exists")]
    Duplicate(i64),
    #[error("profile {0} not found")]
    NotFound(i64),
    #[error("profile store failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profiles for whichever of `ids` exist. Order is unspecified.
    async fn get_profiles(&self, ids: &[i64]) -> Result<Vec<Profile>, StoreError>;
    async fn create_profile(&self, profile: &Profile) -> Result<(), StoreError>;
    async fn update_profile(&self, profile: &Profile) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    rows: RwLock<BTreeMap<i64, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.rows.read().len() }

    pub fn is_empty(&self) -> bool { self.rows.read().is_empty() }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profiles(&self, ids: &[i64]) -> Result<Vec<Profile>, StoreError> {
        let rows = self.rows.read();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn create_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&profile.id) { return Err(StoreError::Duplicate(profile.id)); }
        rows.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        match rows.get_mut(&profile.id) {
            Some(row) => { *row = profile.clone(); Ok(()) }
            None => Err(StoreError::NotFound(profile.id)),
        }
    }
}

/// `profiles` table behind PostgREST (Supabase's REST layer).
pub struct RestProfileStore {
    http: reqwest::Client,
    table_url: String,
    api_key: String,
}

// Row as written: absent contact fields become empty strings.
#[derive(Serialize)]
struct ProfileRow<'a> {
    id: i64,
    username: &'a str,
    phone_number: &'a str,
    routing_number: &'a str,
    address: &'a str,
    discord: &'a str,
}

impl<'a> From<&'a Profile> for ProfileRow<'a> {
    fn from(p: &'a Profile) -> Self {
        Self {
            id: p.id,
            username: &p.display_name,
            phone_number: p.phone_number.as_deref().unwrap_or(""),
            routing_number: p.routing_number.as_deref().unwrap_or(""),
            address: p.address.as_deref().unwrap_or(""),
            discord: p.discord.as_deref().unwrap_or(""),
        }
    }
}

impl RestProfileStore {
    pub fn new(cfg: &ProfileStoreConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let table_url = format!("{}/rest/v1/profiles", cfg.base_url.trim_end_matches('/'));
        Ok(Self { http, table_url, api_key: cfg.api_key.clone() })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

fn backend(e: reqwest::Error) -> StoreError {
    let e = e.without_url();
    warn!(target: "sessiongate::profiles", "profile store request failed: {}", e);
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get_profiles(&self, ids: &[i64]) -> Result<Vec<Profile>, StoreError> {
        if ids.is_empty() { return Ok(Vec::new()); }
        let list = ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",");
        let resp = self
            .request(reqwest::Method::GET, &self.table_url)
            .query(&[("select", "*".to_string()), ("id", format!("in.({})", list))])
            .send()
            .await
            .map_err(backend)?;
        if !resp.status().is_success() {
            warn!(target: "sessiongate::profiles", "profile fetch returned {}", resp.status());
            return Err(StoreError::Backend(format!("status {}", resp.status())));
        }
        resp.json::<Vec<Profile>>().await.map_err(backend)
    }

    async fn create_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::POST, &self.table_url)
            .header("Prefer", "return=minimal")
            .json(&ProfileRow::from(profile))
            .send()
            .await
            .map_err(backend)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::Duplicate(profile.id)),
            s => Err(StoreError::Backend(format!("status {}", s))),
        }
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::PATCH, &self.table_url)
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{}", profile.id))])
            .json(&ProfileRow::from(profile))
            .send()
            .await
            .map_err(backend)?;
        if !resp.status().is_success() {
            return Err(StoreError::Backend(format!("status {}", resp.status())));
        }
        // PostgREST answers an update of zero rows with an empty array.
        let rows: Vec<serde_json::Value> = resp.json().await.map_err(backend)?;
        if rows.is_empty() { return Err(StoreError::NotFound(profile.id)); }
        Ok(())
    }
}
