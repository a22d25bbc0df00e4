//! Builder registry mapping store type names to builder factories.

use std::collections::BTreeMap;
use std::fmt;

use super::{Builder, FileStoreBuilder, OsStoreBuilder, StoreError, StoreResult};

/// Zero-argument factory returning a fresh, unconfigured builder.
pub type BuilderFactory = Box<dyn Fn() -> Box<dyn Builder> + Send + Sync>;

/// Write-once-per-name map from store type to builder factory.
///
/// The registry is an explicit value: the binary assembles one with
/// [`Registry::builtin`] at startup and hands it to the configuration loader.
/// Tests create their own with [`Registry::new`].
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, BuilderFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every compiled-in store type.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FileStoreBuilder::TYPE, || Box::new(FileStoreBuilder::default()));
        registry.register(OsStoreBuilder::TYPE, || Box::new(OsStoreBuilder::default()));
        #[cfg(feature = "aws")]
        registry.register(crate::cloud::aws::AwsStoreBuilder::TYPE, || {
            Box::new(crate::cloud::aws::AwsStoreBuilder::default())
        });
        #[cfg(feature = "gcp")]
        registry.register(crate::cloud::gcp::GcpStoreBuilder::TYPE, || {
            Box::new(crate::cloud::gcp::GcpStoreBuilder::default())
        });
        registry
    }

    /// Register a builder factory under `name`.
    ///
    /// # Panics
    ///
    /// Registering the same name twice is a programming error and panics.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Builder> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            panic!("a builder of type {} is already registered", name);
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Return a fresh builder for the store type `name`.
    pub fn resolve(&self, name: &str) -> StoreResult<Box<dyn Builder>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| StoreError::UnsupportedType(name.to_string()))
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_registered() {
        let registry = Registry::builtin();
        assert!(registry.contains("filestore"));
        assert!(registry.contains("osstore"));
        #[cfg(feature = "aws")]
        assert!(registry.contains("aws"));
        #[cfg(feature = "gcp")]
        assert!(registry.contains("gcp"));
    }

    #[test]
    fn test_resolve_returns_fresh_builder() {
        let mut registry = Registry::new();
        registry.register("test_file", || Box::new(FileStoreBuilder::default()));

        assert!(registry.resolve("test_file").is_ok());
        assert!(registry.resolve("test_file").is_ok());
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = Registry::new();
        let err = registry.resolve("vault").err().unwrap();

        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "store has unsupported type 'vault'");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_panics() {
        let mut registry = Registry::new();
        registry.register("dup", || Box::new(FileStoreBuilder::default()));
        registry.register("dup", || Box::new(OsStoreBuilder::default()));
    }

    #[test]
    fn test_types_sorted() {
        let mut registry = Registry::new();
        registry.register("b", || Box::new(FileStoreBuilder::default()));
        registry.register("a", || Box::new(FileStoreBuilder::default()));
        assert_eq!(registry.types(), vec!["a", "b"]);
    }
}
