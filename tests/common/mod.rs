//! Common testing utilities for secenv integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo_bin_cmd;
use assert_cmd::Command;
use tempfile::TempDir;

/// Test context that manages a scratch directory holding a configuration
/// file and the file stores it points to.
pub struct TestContext {
    /// Path to temporary directory
    pub temp_path: PathBuf,
    /// The temporary directory (kept to prevent early deletion)
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a temporary directory.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let temp_path = temp_dir.path().to_path_buf();

        Ok(Self {
            temp_path,
            _temp_dir: temp_dir,
        })
    }

    /// Get the path to a file in the temp directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_path.join(name)
    }

    /// Create a test file with content.
    pub fn create_file(&self, name: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let file_path = self.path(name);
        fs::write(&file_path, content)?;
        Ok(file_path)
    }

    /// Path of the file backing the file store `store`.
    pub fn store_path(&self, store: &str) -> PathBuf {
        self.path(&format!("{}.store", store))
    }

    /// Write the file store `store` with `secrets`, in the on-disk layout.
    pub fn write_store(&self, store: &str, secrets: &[(&str, &str)]) -> anyhow::Result<PathBuf> {
        let map: BTreeMap<Vec<u8>, Vec<u8>> = secrets
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        let bytes = secenv::codec::encode_to_vec(&map)?;
        let path = self.store_path(store);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Configuration declaring one file store per name in `stores`, the first
    /// being the default, followed by the `profiles` tables verbatim.
    ///
    /// Top-level keys are all written before the first table.
    pub fn config_text(
        &self,
        stores: &[&str],
        default_profile: Option<&str>,
        profiles: &str,
    ) -> String {
        let mut text = String::new();
        if let Some(first) = stores.first() {
            text.push_str(&format!("default_store = \"{}\"\n", first));
        }
        if let Some(profile) = default_profile {
            text.push_str(&format!("default_profile = \"{}\"\n", profile));
        }
        for store in stores {
            text.push_str(&format!(
                "\n[stores.{name}]\ntype = \"filestore\"\n[stores.{name}.config]\npath = '{path}'\n",
                name = store,
                path = self.store_path(store).display(),
            ));
        }
        text.push('\n');
        text.push_str(profiles);
        text
    }

    /// Write the configuration file and return its path.
    pub fn write_config(
        &self,
        stores: &[&str],
        default_profile: Option<&str>,
        profiles: &str,
    ) -> anyhow::Result<PathBuf> {
        let path = self.path("config.toml");
        fs::write(&path, self.config_text(stores, default_profile, profiles))?;
        Ok(path)
    }

    /// The secenv binary, pointed at this context's configuration.
    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("secenv");
        cmd.env("SECENV_CONFIG", self.path("config.toml"))
            .env_remove("RUST_LOG");
        cmd
    }
}

/// Profile used by the end-to-end scenario: `db_pass` from the `vault` store
/// and `api_key` from the default store, exposed as `API_KEY`.
pub const SCENARIO_PROFILES: &str = r#"
[profiles.default]
secrets = [
  { key = "db_pass", store = "vault" },
  { key = "api_key", target = "API_KEY" },
]
"#;

/// Set up the end-to-end scenario stores and configuration.
pub fn scenario() -> anyhow::Result<TestContext> {
    let ctx = TestContext::new()?;
    ctx.write_store("default", &[("api_key", "abc123")])?;
    ctx.write_store("vault", &[("db_pass", "s3cr3t")])?;
    ctx.write_config(&["default", "vault"], Some("default"), SCENARIO_PROFILES)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secenv::config::Config;
    use secenv::store::Registry;

    #[test]
    fn test_test_context_create_file() {
        let ctx = TestContext::new().unwrap();
        let file_path = ctx.create_file("test.txt", b"Hello, World!").unwrap();

        assert!(file_path.exists());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Hello, World!");
    }

    #[test]
    fn test_config_text_declares_stores() {
        let ctx = TestContext::new().unwrap();
        let text = ctx.config_text(&["default", "vault"], None, "");

        assert!(text.starts_with("default_store = \"default\""));
        assert!(!text.contains("default_profile"));
        assert!(text.contains("[stores.vault]"));
        assert!(text.contains("type = \"filestore\""));
    }

    #[test]
    fn test_scenario_config_has_default_profile() {
        let ctx = scenario().unwrap();
        let config = Config::from_file(ctx.path("config.toml"), &Registry::builtin()).unwrap();

        assert_eq!(config.default_store, "default");
        assert_eq!(config.default_profile, "default");
        assert_eq!(config.profile("").unwrap().secrets.len(), 2);
        assert_eq!(config.stores().count(), 2);
    }
}
