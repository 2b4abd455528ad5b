//! Declarative network rules
//!
//! These are the rule objects handed to the rule engine. Field names follow
//! the engine's JSON (`regexFilter`, `requestMethods`, `modifyHeaders`) so a
//! rule can be passed through unchanged.

use crate::compiler;
use redirect_common::{RedirectRecord, ResourceType, RuleId, TokenSet};
use serde::{Deserialize, Serialize};

/// A single declarative rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub priority: u32,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

impl Rule {
    pub fn is_redirect(&self) -> bool {
        matches!(self.action, RuleAction::Redirect { .. })
    }

    pub fn is_modify_headers(&self) -> bool {
        matches!(self.action, RuleAction::ModifyHeaders { .. })
    }
}

/// When a rule applies (all fields must match)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub regex_filter: String,
    /// Lower-case method names
    pub request_methods: Vec<String>,
    pub resource_types: Vec<ResourceType>,
}

impl RuleCondition {
    pub fn accepts_method(&self, method: &str) -> bool {
        self.request_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn accepts_resource(&self, resource_type: ResourceType) -> bool {
        self.resource_types.contains(&resource_type)
    }
}

/// What the engine does with a matching request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    /// Rewrite the URL with the filter's capture groups
    Redirect { redirect: RedirectTarget },

    /// Set request headers
    #[serde(rename_all = "camelCase")]
    ModifyHeaders {
        request_headers: Vec<HeaderModification>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectTarget {
    /// Output URL; `\1`..`\9` refer to groups of the regex filter
    pub regex_substitution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderModification {
    pub header: String,
    pub operation: HeaderOperation,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderOperation {
    Set,
    Append,
    Remove,
}

/// The two rules generated for one redirect record
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRulePair {
    pub redirect_rule: Rule,
    pub header_rule: Rule,
}

impl CompiledRulePair {
    /// Compile a record and the tokens captured for its domain.
    ///
    /// Redirect rule: id/priority = record id, matches `from`, rewrites to `to`.
    /// Header rule: id/priority = record id + 1, matches the rewritten URL,
    /// sets every token header verbatim.
    pub fn compile(record: &RedirectRecord, tokens: &TokenSet) -> Self {
        let urls = compiler::compile(&record.from, &record.to);

        let redirect_rule = Rule {
            id: record.id,
            priority: record.id,
            condition: condition_for(urls.pattern.into_string(), record),
            action: RuleAction::Redirect {
                redirect: RedirectTarget {
                    regex_substitution: urls.template.substitution(),
                },
            },
        };

        let header_rule = Rule {
            id: record.header_rule_id(),
            priority: record.header_rule_id(),
            condition: condition_for(urls.destination.into_string(), record),
            action: header_action(tokens),
        };

        Self {
            redirect_rule,
            header_rule,
        }
    }

    pub fn ids(&self) -> [RuleId; 2] {
        [self.redirect_rule.id, self.header_rule.id]
    }

    pub fn into_rules(self) -> Vec<Rule> {
        vec![self.redirect_rule, self.header_rule]
    }
}

fn condition_for(regex_filter: String, record: &RedirectRecord) -> RuleCondition {
    RuleCondition {
        regex_filter,
        request_methods: vec![record.method.as_rule_str()],
        resource_types: vec![ResourceType::Xmlhttprequest],
    }
}

/// Header rule action overwriting each captured header
pub fn header_action(tokens: &TokenSet) -> RuleAction {
    RuleAction::ModifyHeaders {
        request_headers: tokens
            .iter()
            .map(|h| HeaderModification {
                header: h.name.clone(),
                operation: HeaderOperation::Set,
                value: h.value.clone(),
            })
            .collect(),
    }
}
