//! Redirect Core Library
//!
//! This library compiles user-defined URL redirects into declarative
//! network rules and keeps an engine's rule table in step with the persisted
//! redirect list, the global switch, and headers captured from live traffic.

pub mod admin;
pub mod capture;
pub mod filter;
pub mod notifier;
pub mod registry;
pub mod service;
pub mod synchronizer;

/// Placeholder URL compiler
pub mod compiler;

/// Configuration types and utilities
pub mod config;

/// Declarative rule model and the rule engine seam
pub mod engine;
pub mod rules;

/// Error types for redirect operations
pub mod error;

/// Key-value persistence
pub mod state;
pub mod store;
pub mod tokens;

pub use admin::{ApiState, Metrics};
pub use capture::HeaderCaptureService;
pub use compiler::{compile, CompiledUrls, MatchPattern, SubstitutionTemplate};
pub use config::{CaptureConfig, ServiceConfig};
pub use engine::{Evaluation, MemoryRuleEngine, RuleEngine};
pub use error::RedirectError;
pub use filter::CredentialFilter;
pub use notifier::{CaptureNotifier, LogNotifier, NoopNotifier};
pub use registry::RedirectRegistry;
pub use rules::{CompiledRulePair, Rule, RuleAction, RuleCondition};
pub use service::{RedirectService, ServiceHandle};
pub use state::StateRepository;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use synchronizer::RuleSynchronizer;
pub use tokens::{DomainRegistry, TokenStore};

/// Result type for redirect operations
pub type Result<T> = std::result::Result<T, RedirectError>;
