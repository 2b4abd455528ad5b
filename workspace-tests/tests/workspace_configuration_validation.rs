use std::fs;
use std::path::Path;

/// Workspace structure and crate configuration checks
#[cfg(test)]
mod workspace_configuration_tests {
    use super::*;

    fn read_toml(path: &str) -> toml::Table {
        fs::read_to_string(path)
            .expect("Should be able to read manifest")
            .parse()
            .expect("Manifest should be valid TOML")
    }

    fn dependency_names(manifest: &toml::Table, section: &str) -> Vec<String> {
        manifest
            .get(section)
            .and_then(|s| s.as_table())
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_root_cargo_toml_contains_expected_members() {
        assert!(Path::new("../Cargo.toml").exists(), "Root Cargo.toml should exist");
        let root = read_toml("../Cargo.toml");
        let workspace = root.get("workspace").expect("[workspace] section");

        let members: Vec<&str> = workspace["members"]
            .as_array()
            .expect("members array")
            .iter()
            .filter_map(|m| m.as_str())
            .collect();
        for expected in [
            "redirect-common",
            "redirect-core",
            "redirect-agent",
            "workspace-tests",
        ] {
            assert!(members.contains(&expected), "missing member {}", expected);
            assert!(
                Path::new(&format!("../{}/Cargo.toml", expected)).exists(),
                "member {} has no manifest",
                expected
            );
        }

        assert_eq!(workspace["resolver"].as_str(), Some("2"));
    }

    #[test]
    fn test_workspace_package_configuration() {
        let root = read_toml("../Cargo.toml");
        let package = &root["workspace"]["package"];
        assert!(package.get("version").is_some());
        assert_eq!(package["edition"].as_str(), Some("2021"));
        assert!(package.get("license").is_some());
    }

    #[test]
    fn test_redirect_core_dependencies() {
        let manifest = read_toml("../redirect-core/Cargo.toml");
        let deps = dependency_names(&manifest, "dependencies");
        for required in [
            "redirect-common",
            "tokio",
            "async-trait",
            "axum",
            "regex",
            "url",
            "thiserror",
            "tracing",
        ] {
            assert!(deps.iter().any(|d| d == required), "redirect-core needs {}", required);
        }

        let dev = dependency_names(&manifest, "dev-dependencies");
        assert!(dev.iter().any(|d| d == "proptest"));
        assert!(dev.iter().any(|d| d == "tempfile"));
    }

    #[test]
    fn test_redirect_agent_dependencies() {
        let manifest = read_toml("../redirect-agent/Cargo.toml");
        let deps = dependency_names(&manifest, "dependencies");
        for required in [
            "redirect-core",
            "clap",
            "anyhow",
            "toml",
            "tracing-subscriber",
            "tracing-appender",
        ] {
            assert!(deps.iter().any(|d| d == required), "redirect-agent needs {}", required);
        }
    }

    #[test]
    fn test_common_crate_stays_lightweight() {
        let manifest = read_toml("../redirect-common/Cargo.toml");
        let deps = dependency_names(&manifest, "dependencies");
        for heavy in ["tokio", "axum", "regex"] {
            assert!(
                !deps.iter().any(|d| d == heavy),
                "redirect-common should not depend on {}",
                heavy
            );
        }
    }

    #[test]
    fn test_crate_workspace_inheritance() {
        for member in ["redirect-common", "workspace-tests"] {
            let manifest = read_toml(&format!("../{}/Cargo.toml", member));
            let package = &manifest["package"];
            assert_eq!(
                package["version"].get("workspace").and_then(|w| w.as_bool()),
                Some(true),
                "{} should inherit its version",
                member
            );
        }
    }

    #[test]
    fn test_test_only_crates_stay_in_dev_dependencies() {
        let common = read_toml("../redirect-common/Cargo.toml");
        assert!(!dependency_names(&common, "dependencies").contains(&"serde_json".to_string()));
        assert!(dependency_names(&common, "dev-dependencies").contains(&"serde_json".to_string()));

        let tests = read_toml("../workspace-tests/Cargo.toml");
        let deps = dependency_names(&tests, "dependencies");
        let dev = dependency_names(&tests, "dev-dependencies");
        for name in &deps {
            assert!(!dev.contains(name), "{} declared twice", name);
        }
        for unused in ["redirect-common", "redirect-core"] {
            assert!(!deps.iter().any(|d| d == unused), "workspace-tests does not use {}", unused);
        }
    }
}
