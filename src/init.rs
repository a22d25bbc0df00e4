//! Configuration bootstrap for the `init` command.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::config::DEFAULT_CONFIG;

/// Write the starter configuration to `path`.
///
/// Parent directories are created as needed. An existing file is only
/// replaced when `force` is set.
///
/// # Errors
///
/// Returns an error if the file exists and `force` is false, or if the file
/// cannot be written.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {:?} (use --force to overwrite)",
            path
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write configuration: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_config_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secenv").join("config.toml");

        init_config(&path, false).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "default_store = \"mine\"\n").unwrap();

        let result = init_config(&path, false);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("--force"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "default_store = \"mine\"\n"
        );
    }

    #[test]
    fn test_init_config_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "default_store = \"mine\"\n").unwrap();

        init_config(&path, true).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
