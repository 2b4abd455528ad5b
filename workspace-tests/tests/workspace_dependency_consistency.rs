use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;

/// Property test for workspace dependency consistency
///
/// For any crate in the workspace that uses a shared dependency, the
/// dependency should be declared with `workspace = true` to inherit the
/// version from the root workspace configuration.
#[cfg(test)]
mod workspace_dependency_tests {
    use super::*;

    const MEMBERS: [&str; 4] = [
        "redirect-common",
        "redirect-core",
        "redirect-agent",
        "workspace-tests",
    ];

    fn read_toml(path: &str) -> toml::Table {
        let content = fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e));
        content
            .parse::<toml::Table>()
            .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path, e))
    }

    /// Names declared under `[workspace.dependencies]` in the root manifest
    fn workspace_dependencies() -> Vec<String> {
        let root = read_toml("../Cargo.toml");
        root.get("workspace")
            .and_then(|w| w.get("dependencies"))
            .and_then(|d| d.as_table())
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Dependency name -> whether it inherits from the workspace, across
    /// all dependency sections of a manifest
    fn crate_dependencies(manifest: &toml::Table) -> HashMap<String, bool> {
        let mut deps = HashMap::new();
        for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
            if let Some(table) = manifest.get(section).and_then(|s| s.as_table()) {
                for (name, spec) in table {
                    let inherits = spec
                        .get("workspace")
                        .and_then(|w| w.as_bool())
                        .unwrap_or(false);
                    deps.insert(name.clone(), inherits);
                }
            }
        }
        deps
    }

    proptest! {
        #[test]
        fn test_workspace_dependency_consistency(
            crate_name in prop::sample::select(MEMBERS.to_vec())
        ) {
            let manifest = read_toml(&format!("../{}/Cargo.toml", crate_name));
            let crate_deps = crate_dependencies(&manifest);

            for dep_name in workspace_dependencies() {
                if let Some(&inherits) = crate_deps.get(&dep_name) {
                    prop_assert!(
                        inherits,
                        "Crate '{}' uses dependency '{}' but does not inherit from workspace (missing 'workspace = true')",
                        crate_name,
                        dep_name
                    );
                }
            }
        }
    }

    #[test]
    fn test_workspace_dependency_consistency_unit() {
        let good: toml::Table = r#"
[package]
name = "test-crate"

[dependencies]
tokio = { workspace = true }
serde = { workspace = true, features = ["derive"] }
"#
        .parse()
        .unwrap();
        let parsed = crate_dependencies(&good);
        assert_eq!(parsed.get("tokio"), Some(&true));
        assert_eq!(parsed.get("serde"), Some(&true));

        let bad: toml::Table = r#"
[package]
name = "test-crate"

[dependencies]
tokio = "1.0"

[dev-dependencies]
serde = { workspace = true }
"#
        .parse()
        .unwrap();
        let parsed = crate_dependencies(&bad);
        assert_eq!(parsed.get("tokio"), Some(&false));
        assert_eq!(parsed.get("serde"), Some(&true));
    }

    #[test]
    fn test_root_declares_shared_stack() {
        let deps = workspace_dependencies();
        for expected in ["tokio", "axum", "serde", "thiserror", "tracing", "regex", "proptest"] {
            assert!(
                deps.iter().any(|d| d == expected),
                "workspace.dependencies should declare {}",
                expected
            );
        }
    }
}
