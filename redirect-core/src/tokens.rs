//! Token store and domain registry
//!
//! Captured credential headers live under their domain's key; the list of
//! domains with at least one redirect lives under `allDomines`.

use crate::error::RedirectError;
use crate::state::{ON_OFF_KEY, REDIRECTS_KEY};
use crate::store::KeyValueStore;
use crate::Result;
use redirect_common::TokenSet;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const DOMAINS_KEY: &str = "allDomines";

/// Whether `domain` names one of the fixed keys sharing the token key space
pub fn is_reserved_key(domain: &str) -> bool {
    [REDIRECTS_KEY, ON_OFF_KEY, DOMAINS_KEY]
        .iter()
        .any(|key| key.eq_ignore_ascii_case(domain))
}

/// Per-domain credential headers
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Last capture for `domain`, if any
    pub async fn get(&self, domain: &str) -> Result<Option<TokenSet>> {
        let key = domain.to_lowercase();
        if is_reserved_key(&key) {
            debug!("No tokens kept under storage key {}", key);
            return Ok(None);
        }
        let mut values = self.store.get(&[key.as_str()]).await?;
        match values.remove(&key) {
            Some(Value::Null) | None => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
        }
    }

    /// Tokens to inject for `domain`; the placeholder set when nothing was captured
    pub async fn tokens_for(&self, domain: &str) -> Result<TokenSet> {
        Ok(self.get(domain).await?.unwrap_or_else(TokenSet::placeholder))
    }

    /// Replace the capture for `domain`
    pub async fn put(&self, domain: &str, tokens: &TokenSet) -> Result<()> {
        if is_reserved_key(domain) {
            return Err(RedirectError::validation(
                "domain",
                format!("{} is a storage key", domain),
            ));
        }
        let entries = HashMap::from([(domain.to_lowercase(), serde_json::to_value(tokens)?)]);
        self.store.set(entries).await
    }
}

/// Hostnames that have at least one redirect
#[derive(Clone)]
pub struct DomainRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl DomainRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let mut values = self.store.get(&[DOMAINS_KEY]).await?;
        match values.remove(DOMAINS_KEY) {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(v) => Ok(serde_json::from_value(v)?),
        }
    }

    async fn save(&self, domains: &[String]) -> Result<()> {
        let entries = HashMap::from([(DOMAINS_KEY.to_string(), serde_json::to_value(domains)?)]);
        self.store.set(entries).await
    }

    /// Append `domain` unless already present. Returns true when added.
    pub async fn register(&self, domain: &str) -> Result<bool> {
        let domain = domain.to_lowercase();
        if domain.is_empty() {
            return Ok(false);
        }
        let mut domains = self.list().await?;
        if domains.contains(&domain) {
            return Ok(false);
        }
        domains.push(domain.clone());
        self.save(&domains).await?;
        debug!("Registered domain {}", domain);
        Ok(true)
    }

    /// Keep only domains for which `keep` is true. Returns the kept list,
    /// writing it back only when something was dropped.
    pub async fn retain<F>(&self, keep: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let domains = self.list().await?;
        let kept: Vec<String> = domains.iter().filter(|d| keep(d)).cloned().collect();
        if kept.len() != domains.len() {
            self.save(&kept).await?;
            debug!("Pruned domains, {} left", kept.len());
        }
        Ok(kept)
    }
}
