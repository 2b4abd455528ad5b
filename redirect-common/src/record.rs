//! Redirect records and the global switch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a compiled rule. Redirect rules own odd ids, their header
/// rule companion is always `id + 1`.
pub type RuleId = u32;

/// HTTP methods a redirect can be scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
        HttpMethod::Options,
        HttpMethod::Connect,
    ];

    /// Upper-case name as entered by users ("GET")
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
        }
    }

    /// Lower-case name used inside rule conditions ("get")
    pub fn as_rule_str(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Case-insensitive comparison against a raw method string
    pub fn matches(&self, raw: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(raw.trim())
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .iter()
            .copied()
            .find(|m| m.matches(s))
            .ok_or_else(|| format!("unsupported HTTP method '{}'", s))
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

/// Process-wide extension switch. When OFF no redirect rule may be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GlobalSwitch {
    #[serde(rename = "ON")]
    On,
    #[default]
    #[serde(rename = "OFF")]
    Off,
}

impl GlobalSwitch {
    pub fn is_on(&self) -> bool {
        matches!(self, GlobalSwitch::On)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalSwitch::On => "ON",
            GlobalSwitch::Off => "OFF",
        }
    }
}

impl fmt::Display for GlobalSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for GlobalSwitch {
    fn from(on: bool) -> Self {
        if on {
            GlobalSwitch::On
        } else {
            GlobalSwitch::Off
        }
    }
}

/// Serde adapter for the persisted `onOff` layout, a single-element list
/// such as `["ON"]`. An empty or missing list reads as OFF.
pub mod switch_list {
    use super::GlobalSwitch;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(state: &GlobalSwitch, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [state].serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<GlobalSwitch, D::Error>
    where
        D: Deserializer<'de>,
    {
        let states = Option::<Vec<GlobalSwitch>>::deserialize(deserializer)?;
        Ok(states
            .and_then(|s| s.into_iter().next())
            .unwrap_or_default())
    }
}

/// A user-defined redirect (persisted under the `redirects` key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectRecord {
    /// Stable odd identifier; the header rule uses `id + 1`
    #[serde(rename = "redirectRuleId")]
    pub id: RuleId,

    /// URL pattern, `#` marks a placeholder
    pub from: String,

    /// URL template, the Nth `#` receives the Nth placeholder of `from`
    pub to: String,

    pub method: HttpMethod,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Lower-case hostname of `from`, recorded when the redirect is saved.
    /// Empty for data written before the field existed.
    #[serde(default)]
    pub domain: String,
}

impl RedirectRecord {
    pub fn new(
        id: RuleId,
        from: impl Into<String>,
        to: impl Into<String>,
        method: HttpMethod,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id,
            from: from.into(),
            to: to.into(),
            method,
            enabled: true,
            timestamp: Some(Utc::now()),
            domain: domain.into(),
        }
    }

    /// Id of the companion modify-headers rule
    pub fn header_rule_id(&self) -> RuleId {
        self.id + 1
    }

    /// Both ids of the compiled rule pair
    pub fn rule_ids(&self) -> [RuleId; 2] {
        [self.id, self.header_rule_id()]
    }

    /// Case-insensitive substring search over `from` and `to`
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.from.to_lowercase().contains(&term) || self.to.to_lowercase().contains(&term)
    }
}
