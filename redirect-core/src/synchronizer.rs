//! Rule synchronizer
//!
//! Compiles redirect records into rule pairs and keeps the engine's rule
//! table in line with the persisted list. Every install is a single engine
//! call that adds both rules and removes any previous version of the same
//! two ids, so there is no window with stale or duplicate rules.

use crate::admin::Metrics;
use crate::engine::RuleEngine;
use crate::rules::CompiledRulePair;
use crate::tokens::TokenStore;
use crate::Result;
use redirect_common::{GlobalSwitch, RedirectRecord, RuleId, SyncFailure, SyncReport, TokenSet};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RuleSynchronizer {
    engine: Arc<dyn RuleEngine>,
    metrics: Arc<Metrics>,
}

impl RuleSynchronizer {
    pub fn new(engine: Arc<dyn RuleEngine>, metrics: Arc<Metrics>) -> Self {
        Self { engine, metrics }
    }

    pub fn engine(&self) -> &Arc<dyn RuleEngine> {
        &self.engine
    }

    /// Install (or replace) the rule pair of `record`.
    ///
    /// Disabled records, or any record while the switch is OFF, only get
    /// their pair removed.
    pub async fn install_or_replace(
        &self,
        record: &RedirectRecord,
        tokens: &TokenSet,
        switch: GlobalSwitch,
    ) -> Result<()> {
        if !record.enabled || !switch.is_on() {
            return self.remove_pair(record.id).await;
        }

        let pair = CompiledRulePair::compile(record, tokens);
        let ids = pair.ids().to_vec();
        let result = self.engine.update_rules(pair.into_rules(), ids).await;
        self.track("install", record.id, result)?;
        info!("Installed rules {} and {} for {}", record.id, record.header_rule_id(), record.from);
        Ok(())
    }

    /// Remove the pair `{id, id + 1}`
    pub async fn remove_pair(&self, id: RuleId) -> Result<()> {
        let result = self.engine.update_rules(Vec::new(), vec![id, id + 1]).await;
        self.track("remove", id, result)?;
        debug!("Removed rules {} and {}", id, id + 1);
        Ok(())
    }

    /// Remove every installed rule. Returns the removed ids.
    pub async fn remove_all(&self) -> Result<Vec<RuleId>> {
        let ids = self.engine.rule_ids().await?;
        if ids.is_empty() {
            return Ok(ids);
        }
        let result = self.engine.update_rules(Vec::new(), ids.clone()).await;
        self.track("remove-all", 0, result)?;
        info!("Removed all {} dynamic rules", ids.len());
        Ok(ids)
    }

    /// Converge the engine with `records`.
    ///
    /// Rules that do not belong to an enabled record (all rules when the
    /// switch is OFF) are removed, then every enabled record is installed.
    /// A rejected pair is reported and skipped; the others still proceed.
    pub async fn resync_all(
        &self,
        records: &[RedirectRecord],
        switch: GlobalSwitch,
        tokens: &TokenStore,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let wanted: Vec<&RedirectRecord> = if switch.is_on() {
            records.iter().filter(|r| r.enabled).collect()
        } else {
            Vec::new()
        };
        let wanted_ids: HashSet<RuleId> = wanted.iter().flat_map(|r| r.rule_ids()).collect();

        match self.engine.rule_ids().await {
            Ok(installed) => {
                let stale: Vec<RuleId> = installed
                    .into_iter()
                    .filter(|id| !wanted_ids.contains(id))
                    .collect();
                if !stale.is_empty() {
                    let result = self.engine.update_rules(Vec::new(), stale.clone()).await;
                    match self.track("remove-stale", 0, result) {
                        Ok(()) => report.removed = stale,
                        Err(e) => report.failed.push(SyncFailure {
                            id: 0,
                            reason: e.to_string(),
                        }),
                    }
                }
            }
            Err(e) => warn!("Could not list installed rules before resync: {}", e),
        }

        for record in wanted {
            let record_tokens = match tokens.tokens_for(&record.domain).await {
                Ok(t) => t,
                Err(e) => {
                    self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Token lookup for {} failed, using placeholder: {}", record.domain, e);
                    TokenSet::placeholder()
                }
            };
            match self.install_or_replace(record, &record_tokens, switch).await {
                Ok(()) => report.installed.push(record.id),
                Err(e) => report.failed.push(SyncFailure {
                    id: record.id,
                    reason: e.to_string(),
                }),
            }
        }

        info!(
            "Resync finished: {} installed, {} removed, {} failed",
            report.installed.len(),
            report.removed.len(),
            report.failed.len()
        );
        report
    }

    /// Replace the header rule of every installed pair belonging to
    /// `domain` with one carrying `tokens`. Returns the refreshed rule ids.
    pub async fn refresh_headers(
        &self,
        domain: &str,
        tokens: &TokenSet,
        records: &[RedirectRecord],
    ) -> Result<Vec<RuleId>> {
        let installed: HashSet<RuleId> = self.engine.rule_ids().await?.into_iter().collect();
        let mut refreshed = Vec::new();

        for record in records
            .iter()
            .filter(|r| r.domain.eq_ignore_ascii_case(domain))
            .filter(|r| installed.contains(&r.header_rule_id()))
        {
            let header_rule = CompiledRulePair::compile(record, tokens).header_rule;
            let id = header_rule.id;
            let result = self.engine.update_rules(vec![header_rule], vec![id]).await;
            match self.track("refresh-headers", id, result) {
                Ok(()) => refreshed.push(id),
                Err(e) => warn!("Header rule {} not refreshed: {}", id, e),
            }
        }

        if !refreshed.is_empty() {
            info!("Refreshed header rules {:?} for {}", refreshed, domain);
        }
        Ok(refreshed)
    }

    fn track(&self, operation: &str, id: RuleId, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.metrics.rule_updates.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.metrics.engine_rejections.fetch_add(1, Ordering::Relaxed);
                warn!(operation, rule_id = id, "Rule engine update failed: {}", e);
                Err(e)
            }
        }
    }
}
