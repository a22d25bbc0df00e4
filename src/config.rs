//! Configuration: named stores and profiles.
//!
//! The configuration is a TOML document, by default at
//! `<config dir>/secenv/config.toml`:
//!
//! ```toml
//! default_store = "file"
//! default_profile = "dev"
//!
//! [stores.file]
//! type = "filestore"
//!
//! [stores.file.config]
//! path = "/tmp/secenv-store"
//!
//! [profiles.dev]
//! shell = "zsh"
//! secrets = [
//!   { key = "db_pass", store = "file", target = "DB_PASSWORD" },
//! ]
//! ```
//!
//! Every store's `config` table is decoded into the builder registered for
//! its `type` while parsing, so a bad store definition fails early even if
//! the store is never used.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::profile::Profile;
use crate::store::{
    Builder, OsStore, Registry, Store, StoreError, StoreLoader, StoreResult, SYSTEM_NAMESPACE,
};

/// Starter configuration written by `secenv init`.
pub const DEFAULT_CONFIG: &str = r#"# secenv configuration
#
# Stores hold secrets; profiles list the secrets to inject together.
# Available store types: filestore, osstore, aws, gcp.

default_store = "default"
default_profile = "default"

[stores.default]
type = "osstore"

# [stores.default.config]
# namespace = "default"

# [stores.prod]
# type = "aws"
#
# [stores.prod.config]
# region = "eu-west-1"
# profile = "prod"

[profiles.default]
# shell = "zsh"
secrets = [
  # { key = "db_pass", store = "default", target = "DB_PASSWORD" },
]
"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine the user configuration directory")]
    NoConfigDir,

    #[error("read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config")]
    Parse(#[source] toml::de::Error),

    #[error("missing type for store {0}")]
    MissingType(String),

    #[error("failed to get builder for store {name}")]
    Builder {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("{0} profile not found in configuration")]
    ProfileNotFound(String),
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    default_store: String,
    #[serde(default)]
    stores: BTreeMap<String, RawStore>,
    #[serde(default)]
    default_profile: String,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    config: Option<toml::Value>,
}

/// A configured store: its type and the builder holding its settings.
pub struct StoreDefinition {
    kind: String,
    builder: Box<dyn Builder>,
}

impl StoreDefinition {
    /// Registered type name, e.g. `filestore`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn builder(&self) -> &dyn Builder {
        self.builder.as_ref()
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Config {
    pub default_store: String,
    pub default_profile: String,
    stores: BTreeMap<String, StoreDefinition>,
    profiles: BTreeMap<String, Profile>,
}

fn is_default(name: &str) -> bool {
    name.is_empty() || name == "default"
}

impl Config {
    /// Parse a configuration document, configuring a builder from `registry`
    /// for each store.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML, a store has no
    /// `type`, its type is not registered, or its `config` table does not
    /// match the builder.
    pub fn parse(text: &str, registry: &Registry) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(ConfigError::Parse)?;

        let mut stores = BTreeMap::new();
        for (name, def) in raw.stores {
            if def.kind.is_empty() {
                return Err(ConfigError::MissingType(name));
            }

            let fragment = def
                .config
                .unwrap_or_else(|| toml::Value::Table(Default::default()));
            let builder = registry
                .resolve(&def.kind)
                .and_then(|mut builder| {
                    builder.configure(fragment)?;
                    Ok(builder)
                })
                .map_err(|source| ConfigError::Builder {
                    name: name.clone(),
                    source,
                })?;

            stores.insert(
                name,
                StoreDefinition {
                    kind: def.kind,
                    builder,
                },
            );
        }

        Ok(Self {
            default_store: raw.default_store,
            default_profile: raw.default_profile,
            stores,
            profiles: raw.profiles,
        })
    }

    /// Read and parse the configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>, registry: &Registry) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded configuration");
        Self::parse(&text, registry)
    }

    /// `<config dir>/secenv/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("secenv").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Look up a profile. An empty name or `default` selects the default
    /// profile.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        let name = if is_default(name) {
            self.default_profile.as_str()
        } else {
            name
        };
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// Configured stores, sorted by name.
    pub fn stores(&self) -> impl Iterator<Item = (&str, &StoreDefinition)> {
        self.stores.iter().map(|(name, def)| (name.as_str(), def))
    }

    /// Configured profile names, sorted.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[async_trait]
impl StoreLoader for Config {
    /// Build the store `name`. An empty name or `default` selects the default
    /// store; `system` always resolves to the system keyring store.
    async fn resolve_store(&self, name: &str) -> StoreResult<Box<dyn Store>> {
        if name == SYSTEM_NAMESPACE {
            return Ok(Box::new(OsStore::system()));
        }

        let name = if is_default(name) {
            self.default_store.as_str()
        } else {
            name
        };
        let def = self
            .stores
            .get(name)
            .ok_or_else(|| StoreError::NotConfigured(name.to_string()))?;

        debug!(store = name, kind = %def.kind, "Building store");
        def.builder.build(name).await
    }
}
