//! Secret references and their injection.
//!
//! A [`Secret`] names one value in one store and the variable it should be
//! exposed as. On the command line it is written `[store.]key[=target]`:
//!
//! | Input              | store   | key   | target   |
//! |--------------------|---------|-------|----------|
//! | `key`              |         | `key` |          |
//! | `key=target`       |         | `key` | `target` |
//! | `store.key`        | `store` | `key` |          |
//! | `store.key=target` | `store` | `key` | `target` |
//!
//! An empty store means the default store; an empty target means the key name.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::injector::Injector;
use crate::store::{BoxError, StoreError, StoreLoader};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("key cannot be empty")]
    EmptyKey,
}

/// Failure of one secret going through the injection pipeline.
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("load store '{store}'")]
    LoadStore {
        store: String,
        #[source]
        source: StoreError,
    },

    #[error("get {key}")]
    Get {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("inject {target}")]
    Inject {
        target: String,
        #[source]
        source: BoxError,
    },
}

impl InjectError {
    /// Whether the secret was missing from its store.
    pub fn key_not_found(&self) -> bool {
        matches!(self, Self::Get { source, .. } if source.is_key_not_found())
    }
}

/// Reference to a secret and the name it is injected under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SecretFields")]
pub struct Secret {
    /// Identifier of the secret in its store.
    pub key: String,
    /// Store holding the secret; empty for the default store.
    pub store: String,
    /// Injected variable name; empty to reuse the key.
    pub target: String,
}

#[derive(Deserialize)]
struct SecretFields {
    key: String,
    #[serde(default)]
    store: String,
    #[serde(default)]
    target: String,
}

impl TryFrom<SecretFields> for Secret {
    type Error = GrammarError;

    fn try_from(fields: SecretFields) -> Result<Self, Self::Error> {
        if fields.key.is_empty() {
            return Err(GrammarError::EmptyKey);
        }
        Ok(Self {
            key: fields.key,
            store: fields.store,
            target: fields.target,
        })
    }
}

impl Secret {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Name the value is injected under.
    pub fn target_name(&self) -> &str {
        if self.target.is_empty() {
            &self.key
        } else {
            &self.target
        }
    }

    /// Fetch the secret from its store and hand it to `injector`.
    ///
    /// # Errors
    ///
    /// Each step wraps its failure: [`InjectError::LoadStore`] when the store
    /// cannot be resolved, [`InjectError::Get`] when the read fails (missing
    /// keys included), [`InjectError::Inject`] when the injector refuses it.
    pub async fn inject(
        &self,
        injector: &mut dyn Injector,
        loader: &dyn StoreLoader,
    ) -> Result<(), InjectError> {
        let store = loader
            .resolve_store(&self.store)
            .await
            .map_err(|source| InjectError::LoadStore {
                store: self.store.clone(),
                source,
            })?;

        let value = store
            .get(&self.key)
            .await
            .map_err(|source| InjectError::Get {
                key: self.key.clone(),
                source,
            })?;

        let target = self.target_name();
        debug!(key = %self.key, store = %self.store, target, "Injecting secret");
        injector
            .inject(target, &value)
            .map_err(|source| InjectError::Inject {
                target: target.to_string(),
                source,
            })
    }
}

impl FromStr for Secret {
    type Err = GrammarError;

    /// Parse `[store.]key[=target]`, scanning from the right.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (rest, target) = match text.rfind('=') {
            Some(i) => (&text[..i], &text[i + 1..]),
            None => (text, ""),
        };
        let (store, key) = match rest.rfind('.') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => ("", rest),
        };

        if key.is_empty() {
            return Err(GrammarError::EmptyKey);
        }

        Ok(Self {
            key: key.to_string(),
            store: store.to_string(),
            target: target.to_string(),
        })
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.store.is_empty() {
            write!(f, "{}.", self.store)?;
        }
        f.write_str(&self.key)?;
        if !self.target.is_empty() {
            write!(f, "={}", self.target)?;
        }
        Ok(())
    }
}
