use crate::config::DEFAULT_CREDENTIAL_KEYWORDS;
use redirect_common::{Header, TokenSet};
use wildmatch::WildMatch;

/// Selects credential-bearing headers from observed traffic
#[derive(Debug, Clone)]
pub struct CredentialFilter {
    patterns: Vec<WildMatch>,
}

impl CredentialFilter {
    /// Create a filter from header name keywords.
    ///
    /// A header matches when its lower-case name contains a keyword. Keywords
    /// may use `*` and `?` wildcards.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            patterns: keywords
                .iter()
                .map(|k| WildMatch::new(&format!("*{}*", k.as_ref().to_lowercase())))
                .collect(),
        }
    }

    pub fn is_credential(&self, header_name: &str) -> bool {
        let name = header_name.to_lowercase();
        self.patterns.iter().any(|p| p.matches(&name))
    }

    /// Credential headers in request order, names and values verbatim
    pub fn extract(&self, headers: &[Header]) -> TokenSet {
        headers
            .iter()
            .filter(|h| self.is_credential(&h.name))
            .cloned()
            .collect::<Vec<_>>()
            .into()
    }
}

impl Default for CredentialFilter {
    fn default() -> Self {
        Self::new(&DEFAULT_CREDENTIAL_KEYWORDS)
    }
}

/// Registered domains that a request host belongs to.
///
/// Matching is by substring, so `api.ex.com` and `ex.com.cdn.net` both
/// belong to `ex.com`.
pub fn matching_domains<'a>(host: &str, domains: &'a [String]) -> Vec<&'a str> {
    let host = host.to_lowercase();
    domains
        .iter()
        .map(String::as_str)
        .filter(|d| !d.is_empty() && host.contains(&d.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_keywords() {
        let filter = CredentialFilter::default();
        assert!(filter.is_credential("Authorization"));
        assert!(filter.is_credential("X-Auth-Token"));
        assert!(filter.is_credential("x-jwt-assertion"));
        assert!(filter.is_credential("Cookie"));
        assert!(filter.is_credential("Set-Cookie"));
        assert!(filter.is_credential("SESSION_ID"));
        assert!(!filter.is_credential("Accept"));
        assert!(!filter.is_credential("User-Agent"));
    }

    #[test]
    fn test_extract_keeps_order_and_values() {
        let filter = CredentialFilter::default();
        let headers = vec![
            Header::new("Accept", "application/json"),
            Header::new("Cookie", "sid=abc"),
            Header::new("Authorization", "Bearer XyZ"),
        ];
        let tokens = filter.extract(&headers);
        let names: Vec<&str> = tokens.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Cookie", "Authorization"]);
        assert_eq!(tokens.get("authorization"), Some("Bearer XyZ"));
    }

    #[test]
    fn test_custom_keywords() {
        let filter = CredentialFilter::new(&["x-api-key"]);
        assert!(filter.is_credential("X-API-Key"));
        assert!(!filter.is_credential("Authorization"));
    }

    #[test]
    fn test_matching_domains_is_substring() {
        let domains = vec!["ex.com".to_string(), "other.org".to_string(), String::new()];
        assert_eq!(matching_domains("API.ex.com", &domains), vec!["ex.com"]);
        assert_eq!(matching_domains("ex.com", &domains), vec!["ex.com"]);
        assert!(matching_domains("example.net", &domains).is_empty());
    }
}
