//! Inbound command surface and outbound traffic observations
//!
//! The JSON shapes follow the messages exchanged with the companion web
//! page: commands are tagged by `action` and use camelCase field names
//! (`fromUrl`, `toUrl`, `ruleId`).

use crate::record::{switch_list, GlobalSwitch, HttpMethod, RedirectRecord, RuleId};
use crate::token::Header;
use serde::{Deserialize, Serialize};

/// Commands accepted from a trusted caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Command {
    /// List redirects, optionally filtered by a search term
    GetAllData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
    },

    /// Create a redirect. When `ruleId` is present the call edits that redirect.
    #[serde(rename_all = "camelCase")]
    AddRedirect {
        from_url: String,
        to_url: String,
        method: HttpMethod,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule_id: Option<RuleId>,
    },

    #[serde(rename_all = "camelCase")]
    EditRedirect {
        from_url: String,
        to_url: String,
        method: HttpMethod,
        rule_id: RuleId,
    },

    #[serde(rename_all = "camelCase")]
    DeleteRedirect { rule_id: RuleId },

    #[serde(rename_all = "camelCase")]
    EnableDisableRedirect { rule_id: RuleId, status: bool },

    EnableDisableExtension { status: GlobalSwitch },

    ReSyncRedirects,
}

impl Command {
    /// Action name as it appears on the wire
    pub fn action(&self) -> &'static str {
        match self {
            Command::GetAllData { .. } => "GetAllData",
            Command::AddRedirect { .. } => "AddRedirect",
            Command::EditRedirect { .. } => "EditRedirect",
            Command::DeleteRedirect { .. } => "DeleteRedirect",
            Command::EnableDisableRedirect { .. } => "EnableDisableRedirect",
            Command::EnableDisableExtension { .. } => "EnableDisableExtension",
            Command::ReSyncRedirects => "ReSyncRedirects",
        }
    }
}

/// Redirect list plus switch state, as returned by `GetAllData`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RedirectsSnapshot {
    pub redirects: Vec<RedirectRecord>,
    #[serde(rename = "onOff", with = "switch_list", default)]
    pub on_off: GlobalSwitch,
}

/// A rule pair the engine refused during a bulk synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub id: RuleId,
    pub reason: String,
}

/// Result of converging the engine with the persisted redirect list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Redirect ids whose rule pair is now installed
    pub installed: Vec<RuleId>,
    /// Rule ids removed from the engine
    pub removed: Vec<RuleId>,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reply to a [`Command`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResponse {
    Data(RedirectsSnapshot),
    Saved { redirect: RedirectRecord },
    Done,
    Synced { report: SyncReport },
    Error { message: String },
}

impl CommandResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandResponse::Error { .. })
    }
}

/// Request resource classes, named as the browser reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    Media,
    Websocket,
    #[default]
    Other,
}

fn no_tab() -> i64 {
    -1
}

/// An outbound request seen by the traffic observer, before it is sent.
/// Observers only read it; headers are injected through rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRequest {
    pub method: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub resource_type: ResourceType,
    /// Originating tab, negative when the request has no tab
    #[serde(default = "no_tab")]
    pub tab_id: i64,
    #[serde(default)]
    pub request_headers: Vec<Header>,
}

impl ObservedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            resource_type: ResourceType::Xmlhttprequest,
            tab_id: no_tab(),
            request_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push(Header::new(name, value));
        self
    }

    pub fn with_tab(mut self, tab_id: i64) -> Self {
        self.tab_id = tab_id;
        self
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn has_tab(&self) -> bool {
        self.tab_id >= 0
    }
}

/// What the header capture service did with an observed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Filtered out before any lookup (wrong method or resource type)
    Ignored { reason: String },
    /// The host does not belong to any registered domain
    NoMatch,
    /// Registered domain, but no credential headers present
    NoCredentials { domains: Vec<String> },
    Captured {
        domains: Vec<String>,
        refreshed_rules: Vec<RuleId>,
    },
}
