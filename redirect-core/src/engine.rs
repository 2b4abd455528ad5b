//! Rule engine seam
//!
//! [`RuleEngine`] is the interface of the host's declarative rule table.
//! [`MemoryRuleEngine`] is an in-process table with the same contract:
//! updates are validated as a whole and applied atomically, and it can
//! evaluate a request against the installed rules.

use crate::error::RedirectError;
use crate::rules::{Rule, RuleAction};
use crate::Result;
use async_trait::async_trait;
use redirect_common::{Header, ObservedRequest, RuleId};
use regex::{Captures, Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Compiled regex size cap, comparable to what browser engines accept
const REGEX_SIZE_LIMIT: usize = 2 * 1024 * 1024;

/// Host-provided declarative rule table
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Add `add` and remove `remove_ids` in one step. A rejection leaves the
    /// table unchanged.
    async fn update_rules(&self, add: Vec<Rule>, remove_ids: Vec<RuleId>) -> Result<()>;

    /// Currently installed rules
    async fn rules(&self) -> Result<Vec<Rule>>;

    async fn rule_ids(&self) -> Result<Vec<RuleId>> {
        Ok(self.rules().await?.into_iter().map(|r| r.id).collect())
    }
}

#[derive(Debug)]
struct InstalledRule {
    rule: Rule,
    regex: Regex,
}

/// Outcome of running a request through the installed rules
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// URL after redirect rules (unchanged when none matched)
    pub url: String,
    pub redirected_by: Option<RuleId>,
    /// Headers set on the outgoing request
    pub headers: Vec<Header>,
    pub header_rules: Vec<RuleId>,
}

impl Evaluation {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// In-process rule table
#[derive(Debug, Default)]
pub struct MemoryRuleEngine {
    rules: RwLock<BTreeMap<RuleId, InstalledRule>>,
    rule_limit: Option<usize>,
    updates: AtomicU64,
}

impl MemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject updates that would leave more than `limit` rules installed
    pub fn with_rule_limit(mut self, limit: usize) -> Self {
        self.rule_limit = Some(limit);
        self
    }

    /// Number of accepted `update_rules` calls
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }

    pub async fn get(&self, id: RuleId) -> Option<Rule> {
        self.rules.read().await.get(&id).map(|r| r.rule.clone())
    }

    /// Apply installed rules to a request.
    ///
    /// The highest-priority matching redirect rule rewrites the URL. Header
    /// rules are then matched against the resulting URL; for a header set by
    /// several rules the highest priority wins.
    pub async fn evaluate(&self, request: &ObservedRequest) -> Evaluation {
        let rules = self.rules.read().await;

        let mut by_priority: Vec<&InstalledRule> = rules.values().collect();
        by_priority.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then(b.rule.id.cmp(&a.rule.id))
        });

        let applies = |installed: &InstalledRule, url: &str| {
            installed.rule.condition.accepts_method(&request.method)
                && installed.rule.condition.accepts_resource(request.resource_type)
                && installed.regex.is_match(url)
        };

        let mut url = request.url.clone();
        let mut redirected_by = None;
        for installed in by_priority.iter().filter(|r| r.rule.is_redirect()) {
            if !applies(*installed, &url) {
                continue;
            }
            if let RuleAction::Redirect { redirect } = &installed.rule.action {
                if let Some(caps) = installed.regex.captures(&url) {
                    url = expand_substitution(&redirect.regex_substitution, &caps);
                    redirected_by = Some(installed.rule.id);
                    break;
                }
            }
        }

        let mut headers: Vec<Header> = Vec::new();
        let mut header_rules = Vec::new();
        for installed in by_priority.iter().filter(|r| r.rule.is_modify_headers()) {
            if !applies(*installed, &url) {
                continue;
            }
            if let RuleAction::ModifyHeaders { request_headers } = &installed.rule.action {
                header_rules.push(installed.rule.id);
                for modification in request_headers {
                    let taken = headers
                        .iter()
                        .any(|h| h.name.eq_ignore_ascii_case(&modification.header));
                    if !taken {
                        headers.push(Header::new(&modification.header, &modification.value));
                    }
                }
            }
        }

        Evaluation {
            url,
            redirected_by,
            headers,
            header_rules,
        }
    }

    fn compile(rule: &Rule) -> std::result::Result<Regex, String> {
        let regex = RegexBuilder::new(&rule.condition.regex_filter)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| format!("rule {} has an invalid regexFilter: {}", rule.id, e))?;

        if let RuleAction::Redirect { redirect } = &rule.action {
            let groups = regex.captures_len() - 1;
            if let Some(n) = max_reference(&redirect.regex_substitution) {
                if n > groups {
                    return Err(format!(
                        "rule {} substitution refers to group \\{} but the filter has {} group(s)",
                        rule.id, n, groups
                    ));
                }
            }
        }
        Ok(regex)
    }
}

#[async_trait]
impl RuleEngine for MemoryRuleEngine {
    async fn update_rules(&self, add: Vec<Rule>, remove_ids: Vec<RuleId>) -> Result<()> {
        let mut rules = self.rules.write().await;
        let add_ids: Vec<RuleId> = add.iter().map(|r| r.id).collect();
        let removing: HashSet<RuleId> = remove_ids.iter().copied().collect();

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(add.len());
        for rule in add {
            if rule.id == 0 {
                return Err(RedirectError::rejection(add_ids, "rule id must be positive"));
            }
            if !seen.insert(rule.id) {
                return Err(RedirectError::rejection(
                    add_ids.clone(),
                    format!("duplicate rule id {}", rule.id),
                ));
            }
            if rules.contains_key(&rule.id) && !removing.contains(&rule.id) {
                return Err(RedirectError::rejection(
                    add_ids.clone(),
                    format!("rule id {} is already installed", rule.id),
                ));
            }
            let regex = Self::compile(&rule).map_err(|e| RedirectError::rejection(add_ids.clone(), e))?;
            compiled.push(InstalledRule { rule, regex });
        }

        if let Some(limit) = self.rule_limit {
            let remaining = rules.keys().filter(|id| !removing.contains(id)).count();
            if remaining + compiled.len() > limit {
                return Err(RedirectError::rejection(
                    add_ids,
                    format!("rule limit of {} exceeded", limit),
                ));
            }
        }

        for id in &remove_ids {
            rules.remove(id);
        }
        for installed in compiled {
            rules.insert(installed.rule.id, installed);
        }
        self.updates.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Rule table updated: +{:?} -{:?} ({} installed)",
            add_ids,
            remove_ids,
            rules.len()
        );
        Ok(())
    }

    async fn rules(&self) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .read()
            .await
            .values()
            .map(|r| r.rule.clone())
            .collect())
    }
}

/// Highest `\N` back-reference in a substitution
fn max_reference(substitution: &str) -> Option<usize> {
    let mut max = None;
    let mut chars = substitution.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            continue;
        }
        match chars.next() {
            Some(d) if d.is_ascii_digit() => {
                let n = d.to_digit(10).unwrap_or(0) as usize;
                max = Some(max.map_or(n, |m: usize| m.max(n)));
            }
            _ => {}
        }
    }
    max
}

/// Expand `\0`..`\9` with capture groups; `\\` is a literal backslash
pub fn expand_substitution(substitution: &str, caps: &Captures<'_>) -> String {
    let mut out = String::with_capacity(substitution.len());
    let mut chars = substitution.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let n = d.to_digit(10).unwrap_or(0) as usize;
                if let Some(m) = caps.get(n) {
                    out.push_str(m.as_str());
                }
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            _ => out.push('\\'),
        }
    }
    out
}
