//! Placeholder URL compiler
//!
//! Users write URL patterns where `#` stands for "anything". A run of
//! consecutive `#` counts as one placeholder. The compiler turns
//!
//! - a `from` pattern into an anchored match pattern (`(.*)` per placeholder),
//! - a `to` template into an anchored substitution template (`\N` per
//!   placeholder, numbered left to right from 1),
//! - the same `to` template into a destination match pattern, used to
//!   recognise traffic that has already been redirected.
//!
//! The Nth placeholder of `from` feeds the Nth placeholder of `to`. The
//! compiler does not check that the counts agree; see
//! [`CompiledUrls::placeholders_agree`].

use regex::Regex;
use std::fmt;

/// Placeholder marker in user patterns
pub const PLACEHOLDER: char = '#';

/// Characters escaped in literal segments
const REGEX_METACHARACTERS: &[char] = &[
    '.', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\',
];

/// Stand-in for placeholders when a pattern has to be parsed as a URL
const HOST_PLACEHOLDER_MARKER: &str = "x-placeholder-x";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder,
}

/// Split a pattern on runs of `#`
fn segments(input: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut literal = String::new();
    let mut in_run = false;

    for c in input.chars() {
        if c == PLACEHOLDER {
            if !in_run {
                if !literal.is_empty() {
                    out.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                out.push(Segment::Placeholder);
                in_run = true;
            }
        } else {
            in_run = false;
            literal.push(c);
        }
    }
    if !literal.is_empty() {
        out.push(Segment::Literal(literal));
    }
    out
}

fn escape_literal(literal: &str, out: &mut String) {
    for c in literal.chars() {
        if REGEX_METACHARACTERS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Highest back-reference a substitution can name (`\1` to `\9`)
pub const MAX_REFERENCES: usize = 9;

/// Number of placeholders (runs of `#`) in a user pattern
pub fn placeholder_count(input: &str) -> usize {
    segments(input)
        .iter()
        .filter(|s| matches!(s, Segment::Placeholder))
        .count()
}

/// An anchored, escaped regular expression source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern {
    source: String,
    groups: usize,
}

impl MatchPattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of capturing groups
    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn to_regex(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.source)
    }

    pub fn into_string(self) -> String {
        self.source
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Group(usize),
}

/// Substitution template for the output URL.
///
/// Its canonical form (`as_str`) is anchored and escaped like a match
/// pattern, with back-references in place of groups:
/// `^https://b\.com/\1/y\?id=\2$`. The rule engine consumes the rendered
/// [`substitution`](Self::substitution) instead: `https://b.com/\1/y?id=\2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTemplate {
    source: String,
    parts: Vec<TemplatePart>,
}

impl SubstitutionTemplate {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of back-references
    pub fn references(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, TemplatePart::Group(_)))
            .count()
    }

    /// Engine-facing substitution: literals verbatim (backslashes doubled),
    /// groups as `\N`
    pub fn substitution(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(&text.replace('\\', "\\\\")),
                TemplatePart::Group(n) => {
                    out.push('\\');
                    out.push_str(&n.to_string());
                }
            }
        }
        out
    }
}

impl fmt::Display for SubstitutionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile a `from` pattern (or a destination) into an anchored match pattern
pub fn compile_pattern(input: &str) -> MatchPattern {
    let mut source = String::from("^");
    let mut groups = 0;
    for segment in segments(input) {
        match segment {
            Segment::Literal(text) => escape_literal(&text, &mut source),
            Segment::Placeholder => {
                groups += 1;
                source.push_str("(.*)");
            }
        }
    }
    source.push('$');
    MatchPattern { source, groups }
}

/// Compile a `to` template into a substitution template
pub fn compile_template(input: &str) -> SubstitutionTemplate {
    let mut source = String::from("^");
    let mut parts = Vec::new();
    let mut next_group = 1;
    for segment in segments(input) {
        match segment {
            Segment::Literal(text) => {
                escape_literal(&text, &mut source);
                parts.push(TemplatePart::Literal(text));
            }
            Segment::Placeholder => {
                source.push('\\');
                source.push_str(&next_group.to_string());
                parts.push(TemplatePart::Group(next_group));
                next_group += 1;
            }
        }
    }
    source.push('$');
    SubstitutionTemplate { source, parts }
}

/// Pattern that recognises requests already rewritten to `to`
pub fn compile_destination(to: &str) -> MatchPattern {
    compile_pattern(to)
}

/// Everything compiled from one `from`/`to` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUrls {
    pub pattern: MatchPattern,
    pub template: SubstitutionTemplate,
    pub destination: MatchPattern,
}

impl CompiledUrls {
    /// True when every back-reference in the template has a group to read
    /// from and no group goes unused
    pub fn placeholders_agree(&self) -> bool {
        self.pattern.groups() == self.template.references()
    }
}

pub fn compile(from: &str, to: &str) -> CompiledUrls {
    CompiledUrls {
        pattern: compile_pattern(from),
        template: compile_template(to),
        destination: compile_destination(to),
    }
}

/// Replace placeholders with a neutral marker so the pattern parses as a URL
fn with_marker(pattern: &str) -> String {
    segments(pattern)
        .into_iter()
        .map(|s| match s {
            Segment::Literal(text) => text,
            Segment::Placeholder => HOST_PLACEHOLDER_MARKER.to_string(),
        })
        .collect()
}

/// Whether a user pattern is an absolute URL once placeholders are filled in
pub fn parses_as_url(pattern: &str) -> bool {
    url::Url::parse(&with_marker(pattern)).is_ok()
}

/// Lower-case hostname of a user pattern.
///
/// Host labels at or before the last label containing a placeholder are
/// dropped, so `https://#.example.com/api` yields `example.com`. Returns
/// `None` when the pattern has no usable host.
pub fn hostname_of(pattern: &str) -> Option<String> {
    let parsed = url::Url::parse(&with_marker(pattern)).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    let labels: Vec<&str> = host.split('.').collect();
    let start = labels
        .iter()
        .rposition(|label| label.contains(HOST_PLACEHOLDER_MARKER))
        .map(|i| i + 1)
        .unwrap_or(0);

    let domain = labels[start..].join(".");
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}
