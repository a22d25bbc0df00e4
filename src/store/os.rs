//! OS keyring store
//!
//! Uses the OS credential vault:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//!
//! Secrets are namespaced under the service `secenv:<namespace>`. On Linux the
//! default `login` collection must exist in the keyring; it can be created from
//! a keyring frontend such as Seahorse.

use async_trait::async_trait;
use keyring::Entry;
use serde::Deserialize;
use tracing::debug;

use super::{decode_fragment, Builder, Store, StoreError, StoreResult};

/// Namespace reserved for the system store.
pub const SYSTEM_NAMESPACE: &str = "system";

const SERVICE_PREFIX: &str = "secenv";

/// Builder for [`OsStore`] (`type = "osstore"`).
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsStoreBuilder {
    /// Keyring namespace. Defaults to the store name.
    #[serde(default)]
    pub namespace: String,
}

impl OsStoreBuilder {
    pub const TYPE: &'static str = "osstore";
}

#[async_trait]
impl Builder for OsStoreBuilder {
    fn configure(&mut self, fragment: toml::Value) -> StoreResult<()> {
        *self = decode_fragment(fragment)?;
        Ok(())
    }

    async fn build(&self, name: &str) -> StoreResult<Box<dyn Store>> {
        let namespace = if self.namespace.is_empty() {
            name
        } else {
            self.namespace.as_str()
        };
        Ok(Box::new(OsStore::new(namespace)?))
    }
}

/// Store backed by the OS keyring.
#[derive(Debug, Clone)]
pub struct OsStore {
    service: String,
}

impl OsStore {
    /// Create a store for `namespace`.
    ///
    /// The [`SYSTEM_NAMESPACE`] is rejected; use [`OsStore::system`] instead.
    pub fn new(namespace: &str) -> StoreResult<Self> {
        if namespace == SYSTEM_NAMESPACE {
            return Err(StoreError::ReservedNamespace(namespace.to_string()));
        }
        Ok(Self::namespaced(namespace))
    }

    /// The system store, holding secrets used by secenv itself.
    pub fn system() -> Self {
        Self::namespaced(SYSTEM_NAMESPACE)
    }

    fn namespaced(namespace: &str) -> Self {
        Self {
            service: format!("{}:{}", SERVICE_PREFIX, namespace),
        }
    }

    /// Keyring service identifier, `secenv:<namespace>`.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> StoreResult<Entry> {
        Entry::new(&self.service, key).map_err(|e| StoreError::backend("open keyring entry", e))
    }
}

#[async_trait]
impl Store for OsStore {
    async fn get(&self, key: &str) -> StoreResult<String> {
        debug!(service = %self.service, key, "Reading keyring entry");
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => Err(StoreError::KeyNotFound),
            Err(keyring::Error::BadEncoding(_)) => Err(StoreError::UnsupportedPayload {
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::backend("get keyring secret", e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        debug!(service = %self.service, key, "Writing keyring entry");
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::backend("set keyring secret", e))
    }

    /// Deleting an absent entry succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()> {
        debug!(service = %self.service, key, "Deleting keyring entry");
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::backend("delete keyring secret", e)),
        }
    }
}
