//! Header capture service
//!
//! Watches outbound GET traffic. When a request goes to a domain that has a
//! redirect, its credential headers are stored as that domain's token set and
//! the installed header rules for the domain are refreshed, so redirected
//! requests carry the same credentials as the real site.

use crate::admin::Metrics;
use crate::config::CaptureConfig;
use crate::filter::{matching_domains, CredentialFilter};
use crate::notifier::CaptureNotifier;
use crate::state::StateRepository;
use crate::synchronizer::RuleSynchronizer;
use crate::tokens::{DomainRegistry, TokenStore};
use redirect_common::{CaptureOutcome, ObservedRequest, ResourceType};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct HeaderCaptureService {
    state: StateRepository,
    tokens: TokenStore,
    domains: DomainRegistry,
    synchronizer: RuleSynchronizer,
    notifier: Arc<dyn CaptureNotifier>,
    filter: CredentialFilter,
    config: CaptureConfig,
    metrics: Arc<Metrics>,
}

impl HeaderCaptureService {
    pub fn new(
        state: StateRepository,
        tokens: TokenStore,
        domains: DomainRegistry,
        synchronizer: RuleSynchronizer,
        notifier: Arc<dyn CaptureNotifier>,
        config: CaptureConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            tokens,
            domains,
            synchronizer,
            notifier,
            filter: CredentialFilter::new(&config.keywords),
            config,
            metrics,
        }
    }

    fn ignored(reason: &str) -> CaptureOutcome {
        CaptureOutcome::Ignored {
            reason: reason.to_string(),
        }
    }

    /// Inspect one outbound request
    pub async fn observe(&self, request: &ObservedRequest) -> CaptureOutcome {
        self.metrics.observations_total.fetch_add(1, Ordering::Relaxed);

        // Capture is scoped to the read path
        if !request.method.trim().eq_ignore_ascii_case("get") {
            return Self::ignored("only GET requests are captured");
        }
        if self.config.xhr_only && request.resource_type != ResourceType::Xmlhttprequest {
            return Self::ignored("only XHR requests are captured");
        }
        let host = match url::Url::parse(&request.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
        {
            Some(host) => host,
            None => return Self::ignored("request URL has no host"),
        };

        let (records, switch) = match self.state.load().await {
            Ok(state) => state,
            Err(e) => {
                self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping capture for {}, state unavailable: {}", host, e);
                return Self::ignored("state unavailable");
            }
        };

        // Drop registry entries whose redirects are gone
        let live: HashSet<String> = records.iter().map(|r| r.domain.to_lowercase()).collect();
        let domains = match self.domains.retain(|d| live.contains(d)).await {
            Ok(domains) => domains,
            Err(e) => {
                self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Domain registry unavailable: {}", e);
                Vec::new()
            }
        };

        let matched = matching_domains(&host, &domains);
        if matched.is_empty() {
            return CaptureOutcome::NoMatch;
        }
        debug!("Request to {} matches {:?}", host, matched);

        if switch.is_on() && request.has_tab() {
            if let Err(e) = self.notifier.notify_capture(request.tab_id, matched[0]).await {
                debug!("Capture banner not shown: {}", e);
            }
        }

        let tokens = self.filter.extract(&request.request_headers);
        if tokens.is_empty() {
            return CaptureOutcome::NoCredentials {
                domains: matched.iter().map(|d| d.to_string()).collect(),
            };
        }

        let mut captured = Vec::new();
        let mut refreshed_rules = Vec::new();
        for domain in matched {
            if let Err(e) = self.tokens.put(domain, &tokens).await {
                if e.is_external() {
                    self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                }
                warn!("Tokens for {} not stored: {}", domain, e);
                continue;
            }
            captured.push(domain.to_string());

            match self.synchronizer.refresh_headers(domain, &tokens, &records).await {
                Ok(ids) => refreshed_rules.extend(ids),
                Err(e) => warn!("Header rules for {} not refreshed: {}", domain, e),
            }
        }

        if captured.is_empty() {
            return Self::ignored("token store unavailable");
        }
        self.metrics.captures_total.fetch_add(1, Ordering::Relaxed);
        info!(
            "Captured {} credential header(s) for {:?}",
            tokens.len(),
            captured
        );
        CaptureOutcome::Captured {
            domains: captured,
            refreshed_rules,
        }
    }
}
