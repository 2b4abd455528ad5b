use proptest::prelude::*;
use redirect_core::compiler::{compile, compile_pattern, placeholder_count};
use redirect_core::engine::expand_substitution;

/// Literal text rich in regex metacharacters, without placeholders, slashes
/// or digits
fn literal() -> impl Strategy<Value = String> {
    proptest::string::string_regex(r"[a-z.*+?^${}()|\[\]\\-]{0,6}").unwrap()
}

fn value() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z]{0,8}").unwrap()
}

/// `base/0lit/#/1lit/#...`; the digit after each slash is unique, so a
/// filled-in URL has exactly one way to split into groups.
fn with_placeholders(base: &str, literals: &[String]) -> String {
    let mut url = base.to_string();
    for (i, lit) in literals.iter().enumerate() {
        url.push_str(&format!("/{}{}/#", i, lit));
    }
    url
}

fn filled(template: &str, values: &[String]) -> String {
    let mut out = String::new();
    let mut values = values.iter();
    let mut in_run = false;
    for c in template.chars() {
        if c == '#' {
            if !in_run {
                if let Some(v) = values.next() {
                    out.push_str(v);
                }
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

proptest! {
    #[test]
    fn prop_literal_urls_match_only_themselves(lit in literal(), tail in literal()) {
        let url = format!("https://ex.com/{}{}", lit, tail);
        let pattern = compile_pattern(&url);
        prop_assert_eq!(pattern.groups(), 0);

        let regex = pattern.to_regex().unwrap();
        prop_assert!(regex.is_match(&url));
        let longer = format!("{}x", url);
        prop_assert!(!regex.is_match(&longer));
        let prefixed = format!("x{}", url);
        prop_assert!(!regex.is_match(&prefixed));
    }

    #[test]
    fn prop_placeholders_capture_and_substitute_in_order(
        pairs in proptest::collection::vec((literal(), value()), 1..5)
    ) {
        let (literals, values): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        let from = with_placeholders("https://api.ex.com", &literals);
        let to = with_placeholders("http://localhost:3000", &literals);
        prop_assert_eq!(placeholder_count(&from), literals.len());

        let compiled = compile(&from, &to);
        prop_assert!(compiled.placeholders_agree());

        let regex = compiled.pattern.to_regex().unwrap();
        let request = filled(&from, &values);
        let caps = regex.captures(&request).unwrap();
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(&caps[i + 1], v.as_str());
        }

        let rewritten = expand_substitution(&compiled.template.substitution(), &caps);
        prop_assert_eq!(&rewritten, &filled(&to, &values));

        // The header rule recognises the rewritten URL
        let destination = compiled.destination.to_regex().unwrap();
        prop_assert!(destination.is_match(&rewritten));
    }
}

#[test]
fn test_documented_example() {
    let compiled = compile("https://a.com/#/x?id=#", "https://b.com/#/y?id=#");
    assert_eq!(compiled.pattern.to_string(), r"^https://a\.com/(.*)/x\?id=(.*)$");
    assert_eq!(compiled.template.to_string(), r"^https://b\.com/\1/y\?id=\2$");

    let regex = compiled.pattern.to_regex().unwrap();
    let caps = regex.captures("https://a.com/proj/x?id=42").unwrap();
    assert_eq!(
        expand_substitution(&compiled.template.substitution(), &caps),
        "https://b.com/proj/y?id=42"
    );
}
