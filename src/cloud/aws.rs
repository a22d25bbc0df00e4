//! AWS Secrets Manager store.
//!
//! Credentials come from the SDK default chain. An optional `profile` selects
//! a named profile from the shared AWS config, SSO profiles included.
//!
//! ```toml
//! [stores.prod]
//! type = "aws"
//!
//! [stores.prod.config]
//! region = "eu-west-1"
//! profile = "prod"
//! ```

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use serde::Deserialize;
use tracing::debug;

use super::ApiError;
use crate::store::{decode_fragment, Builder, Store, StoreError, StoreResult};

/// Current value of a secret as returned by `GetSecretValue`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretValue {
    /// Text payload, absent for binary secrets.
    pub text: Option<String>,
    pub binary: bool,
}

/// Secrets Manager operations the store relies on.
#[async_trait]
pub trait SecretsManagerApi: Send + Sync {
    async fn get_secret_value(&self, id: &str) -> Result<SecretValue, ApiError>;

    async fn create_secret(&self, name: &str, value: &str) -> Result<(), ApiError>;

    async fn put_secret_value(&self, id: &str, value: &str) -> Result<(), ApiError>;

    /// Delete without a recovery window.
    async fn delete_secret(&self, id: &str) -> Result<(), ApiError>;
}

/// [`SecretsManagerApi`] over the AWS SDK client.
#[derive(Debug, Clone)]
pub struct SdkSecretsManager {
    client: Client,
}

impl SdkSecretsManager {
    /// Load the SDK configuration for `region`, optionally from a named profile.
    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }

        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretsManagerApi for SdkSecretsManager {
    async fn get_secret_value(&self, id: &str) -> Result<SecretValue, ApiError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(id)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_resource_not_found_exception() {
                    ApiError::NotFound
                } else {
                    ApiError::other(e)
                }
            })?;

        Ok(SecretValue {
            text: output.secret_string().map(str::to_string),
            binary: output.secret_binary().is_some(),
        })
    }

    async fn create_secret(&self, name: &str, value: &str) -> Result<(), ApiError> {
        self.client
            .create_secret()
            .name(name)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| ApiError::other(e.into_service_error()))?;
        Ok(())
    }

    async fn put_secret_value(&self, id: &str, value: &str) -> Result<(), ApiError> {
        self.client
            .put_secret_value()
            .secret_id(id)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| ApiError::other(e.into_service_error()))?;
        Ok(())
    }

    async fn delete_secret(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete_secret()
            .secret_id(id)
            .force_delete_without_recovery(true)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_resource_not_found_exception() {
                    ApiError::NotFound
                } else {
                    ApiError::other(e)
                }
            })?;
        Ok(())
    }
}

/// Builder for [`AwsStore`] (`type = "aws"`).
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsStoreBuilder {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub profile: Option<String>,
}

impl AwsStoreBuilder {
    pub const TYPE: &'static str = "aws";
}

#[async_trait]
impl Builder for AwsStoreBuilder {
    fn configure(&mut self, fragment: toml::Value) -> StoreResult<()> {
        *self = decode_fragment(fragment)?;
        Ok(())
    }

    async fn build(&self, name: &str) -> StoreResult<Box<dyn Store>> {
        if self.region.is_empty() {
            return Err(StoreError::MissingField("region"));
        }
        let profile = self.profile.as_deref().filter(|p| !p.is_empty());

        debug!(store = name, region = %self.region, ?profile, "Connecting to AWS Secrets Manager");
        let api = SdkSecretsManager::connect(&self.region, profile).await;
        Ok(Box::new(AwsStore::new(api)))
    }
}

/// Store backed by AWS Secrets Manager. Keys are secret names.
pub struct AwsStore {
    api: Box<dyn SecretsManagerApi>,
}

impl std::fmt::Debug for AwsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsStore").finish_non_exhaustive()
    }
}

impl AwsStore {
    pub fn new(api: impl SecretsManagerApi + 'static) -> Self {
        Self { api: Box::new(api) }
    }
}

#[async_trait]
impl Store for AwsStore {
    async fn get(&self, key: &str) -> StoreResult<String> {
        match self.api.get_secret_value(key).await {
            Ok(SecretValue {
                text: Some(text), ..
            }) => Ok(text),
            Ok(_) => Err(StoreError::UnsupportedPayload {
                key: key.to_string(),
            }),
            Err(ApiError::NotFound) => Err(StoreError::KeyNotFound),
            Err(e) => Err(StoreError::backend("get aws secret", e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        match self.api.get_secret_value(key).await {
            Ok(_) => self
                .api
                .put_secret_value(key, value)
                .await
                .map_err(|e| StoreError::backend("update aws secret", e)),
            Err(ApiError::NotFound) => {
                debug!(key, "Creating AWS secret");
                self.api
                    .create_secret(key, value)
                    .await
                    .map_err(|e| StoreError::backend("create aws secret", e))
            }
            Err(e) => Err(StoreError::backend("check aws secret existence", e)),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match self.api.delete_secret(key).await {
            Ok(()) | Err(ApiError::NotFound) => Ok(()),
            Err(e) => Err(StoreError::backend("delete aws secret", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Get(String),
        Create(String, String),
        Put(String, String),
        Delete(String),
    }

    #[derive(Default, Clone)]
    struct MockSecretsManager {
        secrets: Arc<Mutex<HashMap<String, SecretValue>>>,
        calls: Arc<Mutex<Vec<Call>>>,
        fail: bool,
    }

    impl MockSecretsManager {
        fn with_text(self, key: &str, value: &str) -> Self {
            self.secrets.lock().unwrap().insert(
                key.to_string(),
                SecretValue {
                    text: Some(value.to_string()),
                    binary: false,
                },
            );
            self
        }

        fn with_binary(self, key: &str) -> Self {
            self.secrets.lock().unwrap().insert(
                key.to_string(),
                SecretValue {
                    text: None,
                    binary: true,
                },
            );
            self
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self) -> Result<(), ApiError> {
            if self.fail {
                Err(ApiError::other("access denied"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SecretsManagerApi for MockSecretsManager {
        async fn get_secret_value(&self, id: &str) -> Result<SecretValue, ApiError> {
            self.calls.lock().unwrap().push(Call::Get(id.to_string()));
            self.check()?;
            self.secrets
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(ApiError::NotFound)
        }

        async fn create_secret(&self, name: &str, value: &str) -> Result<(), ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(name.to_string(), value.to_string()));
            self.check()?;
            self.secrets.lock().unwrap().insert(
                name.to_string(),
                SecretValue {
                    text: Some(value.to_string()),
                    binary: false,
                },
            );
            Ok(())
        }

        async fn put_secret_value(&self, id: &str, value: &str) -> Result<(), ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Put(id.to_string(), value.to_string()));
            self.check()?;
            let mut secrets = self.secrets.lock().unwrap();
            let secret = secrets.get_mut(id).ok_or(ApiError::NotFound)?;
            secret.text = Some(value.to_string());
            Ok(())
        }

        async fn delete_secret(&self, id: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(Call::Delete(id.to_string()));
            self.check()?;
            self.secrets
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or(ApiError::NotFound)
        }
    }

    #[tokio::test]
    async fn test_get_text_secret() {
        let store = AwsStore::new(MockSecretsManager::default().with_text("db_pass", "s3cr3t"));
        assert_eq!(store.get("db_pass").await.unwrap(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_get_missing_secret() {
        let store = AwsStore::new(MockSecretsManager::default());
        assert!(store.get("nope").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn test_get_binary_secret() {
        let store = AwsStore::new(MockSecretsManager::default().with_binary("cert"));
        assert!(matches!(
            store.get("cert").await.unwrap_err(),
            StoreError::UnsupportedPayload { .. }
        ));
    }

    #[tokio::test]
    async fn test_get_api_error() {
        let store = AwsStore::new(MockSecretsManager::failing());
        let err = store.get("db_pass").await.unwrap_err();
        assert_eq!(err.to_string(), "get aws secret");
    }

    #[tokio::test]
    async fn test_set_creates_missing_secret() {
        let api = MockSecretsManager::default();
        let store = AwsStore::new(api.clone());

        store.set("db_pass", "s3cr3t").await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::Get("db_pass".into()),
                Call::Create("db_pass".into(), "s3cr3t".into()),
            ]
        );
        assert_eq!(store.get("db_pass").await.unwrap(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_set_updates_existing_secret() {
        let api = MockSecretsManager::default().with_text("db_pass", "old");
        let store = AwsStore::new(api.clone());

        store.set("db_pass", "new").await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::Get("db_pass".into()),
                Call::Put("db_pass".into(), "new".into()),
            ]
        );
        assert_eq!(store.get("db_pass").await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_set_existence_check_fails() {
        let store = AwsStore::new(MockSecretsManager::failing());
        let err = store.set("db_pass", "s3cr3t").await.unwrap_err();
        assert_eq!(err.to_string(), "check aws secret existence");
    }

    #[tokio::test]
    async fn test_delete() {
        let api = MockSecretsManager::default().with_text("db_pass", "s3cr3t");
        let store = AwsStore::new(api.clone());

        store.delete("db_pass").await.unwrap();
        assert!(store.get("db_pass").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_succeeds() {
        let store = AwsStore::new(MockSecretsManager::default());
        store.delete("never_set").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_api_error() {
        let store = AwsStore::new(MockSecretsManager::failing());
        let err = store.delete("db_pass").await.unwrap_err();
        assert_eq!(err.to_string(), "delete aws secret");
    }

    #[tokio::test]
    async fn test_builder_missing_region() {
        let builder = AwsStoreBuilder::default();
        let err = builder.build("prod").await.err().unwrap();
        assert!(matches!(err, StoreError::MissingField("region")));
        assert_eq!(err.to_string(), "missing region");
    }

    #[test]
    fn test_builder_configure() {
        let mut builder = AwsStoreBuilder::default();
        builder
            .configure(
                toml::from_str(
                    r#"
                    region = "eu-west-1"
                    profile = "prod"
                    "#,
                )
                .unwrap(),
            )
            .unwrap();

        assert_eq!(builder.region, "eu-west-1");
        assert_eq!(builder.profile.as_deref(), Some("prod"));
    }

    #[test]
    fn test_builder_rejects_unknown_field() {
        let mut builder = AwsStoreBuilder::default();
        let err = builder
            .configure(toml::from_str(r#"regoin = "eu-west-1""#).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }
}
