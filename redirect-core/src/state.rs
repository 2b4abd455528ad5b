//! Typed access to the persisted layout
//!
//! | key          | value                          |
//! |--------------|--------------------------------|
//! | `redirects`  | `RedirectRecord[]`, newest first |
//! | `onOff`      | `["ON"]` or `["OFF"]`          |

use crate::compiler;
use crate::store::KeyValueStore;
use crate::Result;
use redirect_common::{GlobalSwitch, RedirectRecord, RuleId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

pub const REDIRECTS_KEY: &str = "redirects";
pub const ON_OFF_KEY: &str = "onOff";

#[derive(Clone)]
pub struct StateRepository {
    store: Arc<dyn KeyValueStore>,
}

impl StateRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Redirect list and switch state in one read
    pub async fn load(&self) -> Result<(Vec<RedirectRecord>, GlobalSwitch)> {
        let mut values = self.store.get(&[REDIRECTS_KEY, ON_OFF_KEY]).await?;
        let redirects = parse_redirects(values.remove(REDIRECTS_KEY))?;
        let switch = parse_switch(values.remove(ON_OFF_KEY))?;
        Ok((redirects, switch))
    }

    pub async fn redirects(&self) -> Result<Vec<RedirectRecord>> {
        let mut values = self.store.get(&[REDIRECTS_KEY]).await?;
        parse_redirects(values.remove(REDIRECTS_KEY))
    }

    /// Whether a redirect list has ever been written
    pub async fn has_redirects(&self) -> Result<bool> {
        let values = self.store.get(&[REDIRECTS_KEY]).await?;
        Ok(values.contains_key(REDIRECTS_KEY))
    }

    pub async fn switch(&self) -> Result<GlobalSwitch> {
        let mut values = self.store.get(&[ON_OFF_KEY]).await?;
        parse_switch(values.remove(ON_OFF_KEY))
    }

    pub async fn save_redirects(&self, redirects: &[RedirectRecord]) -> Result<()> {
        let entries = HashMap::from([(REDIRECTS_KEY.to_string(), serde_json::to_value(redirects)?)]);
        self.store.set(entries).await
    }

    pub async fn save_switch(&self, switch: GlobalSwitch) -> Result<()> {
        let entries = HashMap::from([(ON_OFF_KEY.to_string(), switch_value(switch))]);
        self.store.set(entries).await
    }

    /// Write list and switch together
    pub async fn save(&self, redirects: &[RedirectRecord], switch: GlobalSwitch) -> Result<()> {
        let entries = HashMap::from([
            (REDIRECTS_KEY.to_string(), serde_json::to_value(redirects)?),
            (ON_OFF_KEY.to_string(), switch_value(switch)),
        ]);
        self.store.set(entries).await
    }
}

fn switch_value(switch: GlobalSwitch) -> Value {
    Value::Array(vec![Value::String(switch.as_str().to_string())])
}

fn parse_redirects(value: Option<Value>) -> Result<Vec<RedirectRecord>> {
    let mut redirects: Vec<RedirectRecord> = match value {
        Some(Value::Null) | None => Vec::new(),
        Some(v) => serde_json::from_value(v)?,
    };
    // Records saved before the domain was stored on them
    for record in redirects.iter_mut().filter(|r| r.domain.is_empty()) {
        record.domain = compiler::hostname_of(&record.from).unwrap_or_default();
    }
    let clashing = companion_collisions(&redirects);
    if !clashing.is_empty() {
        warn!(
            "Header rules of redirects {:?} share an id with another redirect",
            clashing
        );
    }
    Ok(redirects)
}

/// Ids whose header rule (`id + 1`) is also the id of another redirect.
/// Only lists written with consecutive ids can produce these.
pub fn companion_collisions(redirects: &[RedirectRecord]) -> Vec<RuleId> {
    let ids: HashSet<RuleId> = redirects.iter().map(|r| r.id).collect();
    redirects
        .iter()
        .filter(|r| ids.contains(&r.header_rule_id()))
        .map(|r| r.id)
        .collect()
}

fn parse_switch(value: Option<Value>) -> Result<GlobalSwitch> {
    match value {
        Some(Value::Null) | None => Ok(GlobalSwitch::Off),
        Some(v) => {
            let states: Vec<GlobalSwitch> = serde_json::from_value(v)?;
            Ok(states.into_iter().next().unwrap_or_default())
        }
    }
}
