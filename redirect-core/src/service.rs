//! Redirect service
//!
//! One task owns the registry and the capture service. Commands and traffic
//! observations reach it over a channel and are handled one at a time, so
//! every read-modify-write of persisted state is serialized.

use crate::admin::Metrics;
use crate::capture::HeaderCaptureService;
use crate::config::ServiceConfig;
use crate::engine::RuleEngine;
use crate::error::RedirectError;
use crate::notifier::CaptureNotifier;
use crate::registry::RedirectRegistry;
use crate::state::StateRepository;
use crate::store::KeyValueStore;
use crate::synchronizer::RuleSynchronizer;
use crate::tokens::{DomainRegistry, TokenStore};
use crate::Result;
use redirect_common::{CaptureOutcome, Command, CommandResponse, ObservedRequest};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

enum ServiceRequest {
    Command {
        command: Command,
        reply: oneshot::Sender<CommandResponse>,
    },
    Observe {
        request: ObservedRequest,
        reply: oneshot::Sender<CaptureOutcome>,
    },
    Bootstrap {
        first_install: bool,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable sender side of the service task
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<ServiceRequest>,
}

impl ServiceHandle {
    /// Run one command and wait for its response
    pub async fn execute(&self, command: Command) -> Result<CommandResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(ServiceRequest::Command { command, reply }).await?;
        rx.await.map_err(|_| dropped())
    }

    /// Hand an outbound request to the header capture service
    pub async fn observe(&self, request: ObservedRequest) -> Result<CaptureOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(ServiceRequest::Observe { request, reply }).await?;
        rx.await.map_err(|_| dropped())
    }

    /// Run first-start setup
    pub async fn bootstrap(&self, first_install: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ServiceRequest::Bootstrap {
            first_install,
            reply,
        })
        .await?;
        rx.await.map_err(|_| dropped())?
    }

    async fn send(&self, request: ServiceRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| RedirectError::ServiceUnavailable("service task has stopped".into()))
    }
}

fn dropped() -> RedirectError {
    RedirectError::ServiceUnavailable("reply dropped".into())
}

pub struct RedirectService {
    registry: RedirectRegistry,
    capture: HeaderCaptureService,
    metrics: Arc<Metrics>,
}

impl RedirectService {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn KeyValueStore>,
        engine: Arc<dyn RuleEngine>,
        notifier: Arc<dyn CaptureNotifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let state = StateRepository::new(store.clone());
        let tokens = TokenStore::new(store.clone());
        let domains = DomainRegistry::new(store);
        let synchronizer = RuleSynchronizer::new(engine, metrics.clone());

        let registry = RedirectRegistry::new(
            state.clone(),
            tokens.clone(),
            domains.clone(),
            synchronizer.clone(),
        )
        .with_seed_examples(config.seed_examples);
        let capture = HeaderCaptureService::new(
            state,
            tokens,
            domains,
            synchronizer,
            notifier,
            config.capture.clone(),
            metrics.clone(),
        );

        Self {
            registry,
            capture,
            metrics,
        }
    }

    /// Start the service task and return its handle. The task stops once
    /// every handle is dropped.
    pub fn spawn(
        config: &ServiceConfig,
        store: Arc<dyn KeyValueStore>,
        engine: Arc<dyn RuleEngine>,
        notifier: Arc<dyn CaptureNotifier>,
        metrics: Arc<Metrics>,
    ) -> ServiceHandle {
        let service = Self::new(config, store, engine, notifier, metrics);
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        tokio::spawn(service.run(rx));
        ServiceHandle { tx }
    }

    pub fn registry(&self) -> &RedirectRegistry {
        &self.registry
    }

    pub fn capture(&self) -> &HeaderCaptureService {
        &self.capture
    }

    async fn run(self, mut rx: mpsc::Receiver<ServiceRequest>) {
        info!("Redirect service started");
        while let Some(request) = rx.recv().await {
            match request {
                ServiceRequest::Command { command, reply } => {
                    let response = self.handle(command).await;
                    let _ = reply.send(response);
                }
                ServiceRequest::Observe { request, reply } => {
                    let outcome = self.capture.observe(&request).await;
                    let _ = reply.send(outcome);
                }
                ServiceRequest::Bootstrap {
                    first_install,
                    reply,
                } => {
                    let _ = reply.send(self.registry.bootstrap(first_install).await);
                }
            }
        }
        info!("Redirect service stopped");
    }

    /// Run one command. Failures come back as [`CommandResponse::Error`].
    pub async fn handle(&self, command: Command) -> CommandResponse {
        self.metrics.commands_total.fetch_add(1, Ordering::Relaxed);
        let action = command.action();
        debug!("Handling {}", action);

        match self.dispatch(command).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.command_errors.fetch_add(1, Ordering::Relaxed);
                if matches!(e, RedirectError::Store(_)) {
                    self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                }
                warn!("{} failed: {}", action, e);
                CommandResponse::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn dispatch(&self, command: Command) -> Result<CommandResponse> {
        let registry = &self.registry;
        let response = match command {
            Command::GetAllData { search } => {
                CommandResponse::Data(registry.query(search.as_deref()).await?)
            }
            Command::AddRedirect {
                from_url,
                to_url,
                method,
                rule_id: None,
            } => CommandResponse::Saved {
                redirect: registry.add(&from_url, &to_url, method).await?,
            },
            Command::AddRedirect {
                from_url,
                to_url,
                method,
                rule_id: Some(rule_id),
            }
            | Command::EditRedirect {
                from_url,
                to_url,
                method,
                rule_id,
            } => CommandResponse::Saved {
                redirect: registry.edit(rule_id, &from_url, &to_url, method).await?,
            },
            Command::DeleteRedirect { rule_id } => {
                registry.delete(rule_id).await?;
                CommandResponse::Done
            }
            Command::EnableDisableRedirect { rule_id, status } => CommandResponse::Saved {
                redirect: registry.set_enabled(rule_id, status).await?,
            },
            Command::EnableDisableExtension { status } => CommandResponse::Synced {
                report: registry.set_global_switch(status).await?,
            },
            Command::ReSyncRedirects => CommandResponse::Synced {
                report: registry.resync().await?,
            },
        };
        Ok(response)
    }
}
