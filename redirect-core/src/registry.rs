//! Redirect registry
//!
//! CRUD over the persisted redirect list and the global switch. Every
//! mutation that changes live behaviour goes through the synchronizer.
//! The list is kept newest first.

use crate::compiler;
use crate::error::RedirectError;
use crate::state::StateRepository;
use crate::synchronizer::RuleSynchronizer;
use crate::tokens::{self, DomainRegistry, TokenStore};
use crate::Result;
use redirect_common::{
    GlobalSwitch, HttpMethod, RedirectRecord, RedirectsSnapshot, RuleId, SyncReport, TokenSet,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct RedirectRegistry {
    state: StateRepository,
    tokens: TokenStore,
    domains: DomainRegistry,
    synchronizer: RuleSynchronizer,
    seed_examples: bool,
}

impl RedirectRegistry {
    pub fn new(
        state: StateRepository,
        tokens: TokenStore,
        domains: DomainRegistry,
        synchronizer: RuleSynchronizer,
    ) -> Self {
        Self {
            state,
            tokens,
            domains,
            synchronizer,
            seed_examples: true,
        }
    }

    pub fn with_seed_examples(mut self, seed: bool) -> Self {
        self.seed_examples = seed;
        self
    }

    /// Create a redirect, enabled, at the front of the list
    pub async fn add(&self, from: &str, to: &str, method: HttpMethod) -> Result<RedirectRecord> {
        let (from, to) = (from.trim(), to.trim());
        let domain = validate(from, to)?;
        let (mut redirects, switch) = self.state.load().await?;

        let record = RedirectRecord::new(next_id(&redirects), from, to, method, domain);
        redirects.insert(0, record.clone());
        self.state.save_redirects(&redirects).await?;
        self.register_domain(&record.domain).await;
        info!("Added redirect {} {} -> {}", record.id, record.from, record.to);

        if switch.is_on() {
            self.sync_one(&record, switch).await?;
        }
        Ok(record)
    }

    /// Replace redirect `id` and move it to the front. Edited redirects are
    /// enabled.
    pub async fn edit(
        &self,
        id: RuleId,
        from: &str,
        to: &str,
        method: HttpMethod,
    ) -> Result<RedirectRecord> {
        let (from, to) = (from.trim(), to.trim());
        let domain = validate(from, to)?;
        let (mut redirects, switch) = self.state.load().await?;

        let position = redirects
            .iter()
            .position(|r| r.id == id)
            .ok_or(RedirectError::NotFound { id })?;
        let previous = redirects.remove(position);

        let record = RedirectRecord::new(id, from, to, method, domain);
        redirects.insert(0, record.clone());
        self.state.save_redirects(&redirects).await?;
        self.register_domain(&record.domain).await;
        if previous.domain != record.domain {
            self.prune_domain(&previous.domain, &redirects).await;
        }
        info!("Edited redirect {} {} -> {}", id, record.from, record.to);

        self.sync_one(&record, switch).await?;
        Ok(record)
    }

    /// Delete redirect `id`. Its rule pair is removed whatever the switch
    /// state, so no orphan survives a later ON transition.
    pub async fn delete(&self, id: RuleId) -> Result<()> {
        let mut redirects = self.state.redirects().await?;
        let position = redirects
            .iter()
            .position(|r| r.id == id)
            .ok_or(RedirectError::NotFound { id })?;
        let removed = redirects.remove(position);
        self.state.save_redirects(&redirects).await?;

        self.synchronizer.remove_pair(id).await?;
        self.prune_domain(&removed.domain, &redirects).await;
        info!("Deleted redirect {}", id);
        Ok(())
    }

    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<RedirectRecord> {
        let (mut redirects, switch) = self.state.load().await?;
        let record = redirects
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RedirectError::NotFound { id })?;
        record.enabled = enabled;
        let record = record.clone();
        self.state.save_redirects(&redirects).await?;
        info!("Redirect {} {}", id, if enabled { "enabled" } else { "disabled" });

        self.sync_one(&record, switch).await?;
        Ok(record)
    }

    /// Persist the switch. OFF removes every rule, ON reinstalls the enabled
    /// redirects.
    pub async fn set_global_switch(&self, switch: GlobalSwitch) -> Result<SyncReport> {
        self.state.save_switch(switch).await?;
        info!("Global switch set to {}", switch);

        match switch {
            GlobalSwitch::Off => Ok(SyncReport {
                removed: self.synchronizer.remove_all().await?,
                ..SyncReport::default()
            }),
            GlobalSwitch::On => {
                let redirects = self.state.redirects().await?;
                Ok(self
                    .synchronizer
                    .resync_all(&redirects, switch, &self.tokens)
                    .await)
            }
        }
    }

    /// Rebuild the engine's rules from the persisted list
    pub async fn resync(&self) -> Result<SyncReport> {
        let (redirects, switch) = self.state.load().await?;
        Ok(self
            .synchronizer
            .resync_all(&redirects, switch, &self.tokens)
            .await)
    }

    /// Full list, optionally filtered by a case-insensitive search on
    /// `from`/`to`
    pub async fn query(&self, search: Option<&str>) -> Result<RedirectsSnapshot> {
        let (mut redirects, on_off) = self.state.load().await?;
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            redirects.retain(|r| r.matches_search(term));
        }
        Ok(RedirectsSnapshot { redirects, on_off })
    }

    /// First-run setup.
    ///
    /// On a fresh install with no saved list, example redirects are written
    /// (disabled, switch OFF). Installed rules are always cleared so nothing
    /// stale survives an upgrade or reinstall.
    pub async fn bootstrap(&self, first_install: bool) -> Result<()> {
        if first_install && self.seed_examples && !self.state.has_redirects().await? {
            let examples = example_redirects();
            self.state.save(&examples, GlobalSwitch::Off).await?;
            for record in &examples {
                self.register_domain(&record.domain).await;
            }
            info!("Seeded {} example redirects", examples.len());
        }
        let removed = self.synchronizer.remove_all().await?;
        if !removed.is_empty() {
            info!("Cleared {} dynamic rules left from a previous run", removed.len());
        }
        Ok(())
    }

    async fn sync_one(&self, record: &RedirectRecord, switch: GlobalSwitch) -> Result<()> {
        let tokens = match self.tokens.tokens_for(&record.domain).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Token lookup for {} failed, using placeholder: {}", record.domain, e);
                TokenSet::placeholder()
            }
        };
        self.synchronizer
            .install_or_replace(record, &tokens, switch)
            .await
    }

    async fn register_domain(&self, domain: &str) {
        if let Err(e) = self.domains.register(domain).await {
            warn!("Domain {} not registered: {}", domain, e);
        }
    }

    async fn prune_domain(&self, domain: &str, remaining: &[RedirectRecord]) {
        if domain.is_empty() || remaining.iter().any(|r| r.domain == domain) {
            return;
        }
        if let Err(e) = self.domains.retain(|d| d != domain).await {
            warn!("Domain {} not pruned: {}", domain, e);
        }
    }
}

/// Check a `from`/`to` pair and return the domain of `from`
pub fn validate(from: &str, to: &str) -> Result<String> {
    let (from, to) = (from.trim(), to.trim());
    let domain = compiler::hostname_of(from)
        .ok_or_else(|| RedirectError::validation("from", "must be an absolute URL with a host"))?;
    if tokens::is_reserved_key(&domain) {
        return Err(RedirectError::validation(
            "from",
            format!("host {} clashes with a storage key", domain),
        ));
    }
    if !compiler::parses_as_url(to) {
        return Err(RedirectError::validation("to", "must be an absolute URL"));
    }

    let groups = compiler::placeholder_count(from);
    let references = compiler::placeholder_count(to);
    if references > compiler::MAX_REFERENCES {
        return Err(RedirectError::validation(
            "to",
            format!(
                "uses {} placeholders, at most {} are supported",
                references,
                compiler::MAX_REFERENCES
            ),
        ));
    }
    if references > groups {
        return Err(RedirectError::validation(
            "to",
            format!(
                "uses {} placeholder(s) but from only provides {}",
                references, groups
            ),
        ));
    }
    Ok(domain)
}

/// Next free odd id: two past the highest id in use
pub fn next_id(redirects: &[RedirectRecord]) -> RuleId {
    match redirects.iter().map(|r| r.id).max() {
        None => 1,
        Some(max) => {
            let next = max + 2;
            if next % 2 == 0 {
                next + 1
            } else {
                next
            }
        }
    }
}

/// Redirects written on first install
pub fn example_redirects() -> Vec<RedirectRecord> {
    let examples = [
        (
            1,
            "https://redirect-example.com/something",
            "https://desired-url.com/something/more",
            HttpMethod::Get,
        ),
        (
            3,
            "https://redirect-to-local-server-example.com/something",
            "https://localhost:3000/something",
            HttpMethod::Post,
        ),
        (
            5,
            "https://redirect-multiple-apis-example.com/#",
            "http://localhost:3000/#",
            HttpMethod::Get,
        ),
        (
            7,
            "https://placeholder-params-example.com/project/#/tasks?Name=#&number=#",
            "https://localhost:3000/project/#/tasks?Name=#&number=#",
            HttpMethod::Delete,
        ),
        (
            9,
            "https://placeholder-as-regex-example.com/#something/task",
            "http://localhost:3000/#something/task",
            HttpMethod::Get,
        ),
    ];

    examples
        .into_iter()
        .map(|(id, from, to, method)| RedirectRecord {
            id,
            from: from.to_string(),
            to: to.to_string(),
            method,
            enabled: false,
            timestamp: None,
            domain: compiler::hostname_of(from).unwrap_or_default(),
        })
        .collect()
}
