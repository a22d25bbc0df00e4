//! Store abstraction shared by every secret backend.
//!
//! A [`Store`] exposes three operations over opaque UTF-8 keys and values.
//! Concrete stores are never constructed directly by callers: a [`Builder`]
//! is obtained from the [`Registry`] by type name, populated from a
//! configuration fragment, then asked to [`Builder::build`] the store.
//!
//! # Variants
//!
//! - `filestore` - local binary file, test-only ([`FileStore`])
//! - `osstore` - OS credential vault ([`OsStore`])
//! - `aws` - AWS Secrets Manager (feature `aws`)
//! - `gcp` - GCP Secret Manager (feature `gcp`)

pub mod file;
pub mod os;
pub mod registry;
pub mod timeout;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::codec::CodecError;

pub use file::{FileStore, FileStoreBuilder};
pub use os::{OsStore, OsStoreBuilder, SYSTEM_NAMESPACE};
pub use registry::{BuilderFactory, Registry};
pub use timeout::{TimeoutLoader, TimeoutStore};

/// Boxed error coming from a backend library (SDK, keyring, filesystem).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by stores, builders and store resolution.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No value exists at the requested key.
    #[error("key not found")]
    KeyNotFound,

    #[error("store has unsupported type '{0}'")]
    UnsupportedType(String),

    /// A builder field required to reach the backend is empty.
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("namespace '{0}' is reserved")]
    ReservedNamespace(String),

    #[error("invalid store configuration")]
    InvalidConfig(#[source] toml::de::Error),

    #[error("{0} store not found in configuration")]
    NotConfigured(String),

    /// The backend holds a value with no text representation.
    #[error("secret '{key}' is binary, not text")]
    UnsupportedPayload { key: String },

    #[error("{context}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store file encoding")]
    Codec(#[from] CodecError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Wrap a backend failure with a short prefix naming the operation.
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound)
    }

    /// Whether the failure comes from configuration rather than the backend.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType(_)
                | Self::MissingField(_)
                | Self::ReservedNamespace(_)
                | Self::InvalidConfig(_)
                | Self::NotConfigured(_)
        )
    }
}

/// Capability set every secret backend implements.
#[async_trait]
pub trait Store: Send + Sync {
    /// Return the value stored at `key`, or [`StoreError::KeyNotFound`].
    async fn get(&self, key: &str) -> StoreResult<String>;

    /// Store `value` at `key`, creating or overwriting it.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key` from the store.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Configuration-bound factory producing a concrete [`Store`].
#[async_trait]
pub trait Builder: Send + Sync {
    /// Populate the builder from its raw configuration fragment.
    fn configure(&mut self, fragment: toml::Value) -> StoreResult<()>;

    /// Validate the configuration and open the store named `name`.
    ///
    /// Missing required fields fail before any I/O happens.
    async fn build(&self, name: &str) -> StoreResult<Box<dyn Store>>;
}

/// Resolves a store name into a ready-to-use store.
///
/// An empty name, or `"default"`, designates the configured default store.
#[async_trait]
pub trait StoreLoader: Send + Sync {
    async fn resolve_store(&self, name: &str) -> StoreResult<Box<dyn Store>>;
}

/// Decode a configuration fragment into a builder's field set.
pub fn decode_fragment<T: DeserializeOwned>(fragment: toml::Value) -> StoreResult<T> {
    fragment.try_into().map_err(StoreError::InvalidConfig)
}
