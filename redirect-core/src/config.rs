//! Configuration types and utilities

use serde::{Deserialize, Serialize};

/// Header name fragments treated as credentials
pub const DEFAULT_CREDENTIAL_KEYWORDS: [&str; 7] = [
    "authorization",
    "token",
    "jwt",
    "cookie",
    "auth_token",
    "session_id",
    "set-cookie",
];

/// Redirect service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Header capture settings
    pub capture: CaptureConfig,
    /// Seed example redirects on first install
    pub seed_examples: bool,
    /// Capacity of the command channel feeding the service task
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            seed_examples: true,
            channel_capacity: 100,
        }
    }
}

/// Header capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// A header is captured when its lower-case name contains one of these
    pub keywords: Vec<String>,
    /// Only observe XHR traffic
    pub xhr_only: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_CREDENTIAL_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            xhr_only: true,
        }
    }
}
