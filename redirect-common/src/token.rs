//! Captured credential headers

use serde::{Deserialize, Serialize};

/// A single `name: value` header pair as seen on outbound traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Most recent credential headers captured for one domain.
///
/// Persisted under the domain's lower-case hostname and replaced wholesale
/// on every capture.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(Vec<Header>);

impl TokenSet {
    pub fn new(headers: Vec<Header>) -> Self {
        Self(headers)
    }

    /// Header set used before anything was captured for a domain: an empty
    /// `Authorization` header, so the header rule always has an action.
    pub fn placeholder() -> Self {
        Self(vec![Header::new("Authorization", "")])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    /// Value of the first header with this name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn into_inner(self) -> Vec<Header> {
        self.0
    }
}

impl From<Vec<Header>> for TokenSet {
    fn from(headers: Vec<Header>) -> Self {
        Self(headers)
    }
}
