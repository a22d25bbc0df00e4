//! GCP Secret Manager store.
//!
//! Keys map to `projects/<project-id>/secrets/<key>` and reads always target
//! the `latest` version. Only the most recent version is kept: after a write,
//! older versions are disabled, and already disabled ones destroyed.
//!
//! ## Configuration
//!
//! ```toml
//! [stores.gcp]
//! type = "gcp"
//!
//! [stores.gcp.config]
//! project-id = "my-project"
//! ```
//!
//! Credentials follow the Application Default Credentials lookup: the service
//! account key file named by `GOOGLE_APPLICATION_CREDENTIALS`, then the user
//! credentials left by `gcloud auth application-default login`, then the
//! metadata server on GCE, Cloud Run and GKE.

use std::ffi::OsStr;
use std::path::PathBuf;

use async_trait::async_trait;
use google_secretmanager1::api::{
    AddSecretVersionRequest, Automatic, DestroySecretVersionRequest, DisableSecretVersionRequest,
    Replication, Secret, SecretPayload,
};
use google_secretmanager1::{hyper_rustls, hyper_util, SecretManager};
use serde::Deserialize;
use tracing::{debug, warn};
use yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes;

use super::ApiError;
use crate::store::{decode_fragment, Builder, Store, StoreError, StoreResult};

/// Lifecycle state of a secret version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    Enabled,
    Disabled,
    Destroyed,
    Unknown,
}

impl VersionState {
    fn parse(state: Option<&str>) -> Self {
        match state {
            Some("ENABLED") => Self::Enabled,
            Some("DISABLED") => Self::Disabled,
            Some("DESTROYED") => Self::Destroyed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Full resource name, `projects/<p>/secrets/<s>/versions/<n>`.
    pub name: String,
    pub state: VersionState,
}

/// Secret Manager operations the store relies on. Names are full resource
/// names.
#[async_trait]
pub trait SecretManagerApi: Send + Sync {
    /// Payload of the version `name`.
    async fn access_version(&self, name: &str) -> Result<Vec<u8>, ApiError>;

    /// Return the resource name of the secret `name` if it exists.
    async fn get_secret(&self, name: &str) -> Result<String, ApiError>;

    /// Create `secret_id` under `parent` with automatic replication.
    async fn create_secret(&self, parent: &str, secret_id: &str) -> Result<String, ApiError>;

    /// Add a version to `secret`, returning the new version name.
    async fn add_version(&self, secret: &str, data: &[u8]) -> Result<String, ApiError>;

    async fn list_versions(&self, secret: &str) -> Result<Vec<VersionInfo>, ApiError>;

    async fn disable_version(&self, name: &str) -> Result<(), ApiError>;

    async fn destroy_version(&self, name: &str) -> Result<(), ApiError>;

    async fn delete_secret(&self, name: &str) -> Result<(), ApiError>;
}

type Connector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

type Hub = SecretManager<Connector>;

type Auth = yup_oauth2::authenticator::Authenticator<Connector>;

/// Where [`HubSecretManager::connect`] takes its credentials from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Key file named by `GOOGLE_APPLICATION_CREDENTIALS`, else the metadata
    /// server of the instance.
    ApplicationDefault,
    /// User credentials written by `gcloud auth application-default login`.
    AuthorizedUser(PathBuf),
}

impl CredentialSource {
    /// `GOOGLE_APPLICATION_CREDENTIALS` wins over the gcloud user file, which
    /// wins over the metadata server.
    pub fn select(env_credentials: Option<&OsStr>, user_file: Option<PathBuf>) -> Self {
        match (env_credentials, user_file) {
            (Some(path), _) if !path.is_empty() => Self::ApplicationDefault,
            (_, Some(path)) => Self::AuthorizedUser(path),
            _ => Self::ApplicationDefault,
        }
    }

    /// Inspect the environment and the gcloud configuration directory.
    pub fn detect() -> Self {
        let env_credentials = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS");
        let user_file = gcloud_credentials_path().filter(|path| path.is_file());
        Self::select(env_credentials.as_deref(), user_file)
    }
}

/// `application_default_credentials.json` in the gcloud configuration
/// directory.
fn gcloud_credentials_path() -> Option<PathBuf> {
    let dir = if cfg!(windows) {
        dirs::config_dir()?.join("gcloud")
    } else {
        dirs::home_dir()?.join(".config").join("gcloud")
    };
    Some(dir.join("application_default_credentials.json"))
}

async fn authenticator(source: &CredentialSource) -> StoreResult<Auth> {
    let auth = match source {
        CredentialSource::AuthorizedUser(path) => {
            let secret = yup_oauth2::read_authorized_user_secret(path)
                .await
                .map_err(|e| StoreError::backend("read gcloud user credentials", e))?;
            yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
                .build()
                .await
        }
        CredentialSource::ApplicationDefault => {
            let opts = yup_oauth2::ApplicationDefaultCredentialsFlowOpts::default();
            match yup_oauth2::ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
                ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => builder.build().await,
                ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => {
                    builder.build().await
                }
            }
        }
    };
    auth.map_err(|e| StoreError::backend("build gcp authenticator", e))
}

/// [`SecretManagerApi`] over the generated Secret Manager hub.
pub struct HubSecretManager {
    hub: Hub,
}

impl std::fmt::Debug for HubSecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSecretManager")
            .field("hub", &"[SecretManager]")
            .finish()
    }
}

impl HubSecretManager {
    /// Build an HTTPS client and authenticate with Application Default
    /// Credentials, or gcloud user credentials when present.
    pub async fn connect() -> StoreResult<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| StoreError::backend("load native TLS roots", e))?
            .https_or_http()
            .enable_http2()
            .build();
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(connector);

        let source = CredentialSource::detect();
        debug!(?source, "Authenticating to GCP");
        let auth = authenticator(&source).await?;

        Ok(Self {
            hub: SecretManager::new(client, auth),
        })
    }
}

/// Whether an error body, `{"error": {...}}` or the bare status object,
/// reports a missing resource.
fn is_not_found_body(body: &serde_json::Value) -> bool {
    let status = body.get("error").unwrap_or(body);
    status["code"].as_u64() == Some(404) || status["status"].as_str() == Some("NOT_FOUND")
}

fn classify(err: google_secretmanager1::Error) -> ApiError {
    let not_found = match &err {
        google_secretmanager1::Error::BadRequest(body) => is_not_found_body(body),
        google_secretmanager1::Error::Failure(response) => response.status().as_u16() == 404,
        _ => false,
    };

    if not_found {
        ApiError::NotFound
    } else {
        ApiError::other(err.to_string())
    }
}

#[async_trait]
impl SecretManagerApi for HubSecretManager {
    async fn access_version(&self, name: &str) -> Result<Vec<u8>, ApiError> {
        let (_, response) = self
            .hub
            .projects()
            .secrets_versions_access(name)
            .doit()
            .await
            .map_err(classify)?;

        Ok(response
            .payload
            .and_then(|payload| payload.data)
            .unwrap_or_default())
    }

    async fn get_secret(&self, name: &str) -> Result<String, ApiError> {
        let (_, secret) = self
            .hub
            .projects()
            .secrets_get(name)
            .doit()
            .await
            .map_err(classify)?;
        Ok(secret.name.unwrap_or_else(|| name.to_string()))
    }

    async fn create_secret(&self, parent: &str, secret_id: &str) -> Result<String, ApiError> {
        let request = Secret {
            replication: Some(Replication {
                automatic: Some(Automatic::default()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (_, secret) = self
            .hub
            .projects()
            .secrets_create(request, parent)
            .secret_id(secret_id)
            .doit()
            .await
            .map_err(classify)?;
        Ok(secret
            .name
            .unwrap_or_else(|| format!("{}/secrets/{}", parent, secret_id)))
    }

    async fn add_version(&self, secret: &str, data: &[u8]) -> Result<String, ApiError> {
        let request = AddSecretVersionRequest {
            payload: Some(SecretPayload {
                data: Some(data.to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (_, version) = self
            .hub
            .projects()
            .secrets_add_version(request, secret)
            .doit()
            .await
            .map_err(classify)?;
        version
            .name
            .ok_or_else(|| ApiError::other("secret version has no name"))
    }

    async fn list_versions(&self, secret: &str) -> Result<Vec<VersionInfo>, ApiError> {
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self.hub.projects().secrets_versions_list(secret);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }
            let (_, page) = call.doit().await.map_err(classify)?;

            versions.extend(page.versions.unwrap_or_default().into_iter().filter_map(|v| {
                let state = VersionState::parse(v.state.as_deref());
                v.name.map(|name| VersionInfo { name, state })
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(versions)
    }

    async fn disable_version(&self, name: &str) -> Result<(), ApiError> {
        self.hub
            .projects()
            .secrets_versions_disable(DisableSecretVersionRequest::default(), name)
            .doit()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn destroy_version(&self, name: &str) -> Result<(), ApiError> {
        self.hub
            .projects()
            .secrets_versions_destroy(DestroySecretVersionRequest::default(), name)
            .doit()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), ApiError> {
        self.hub
            .projects()
            .secrets_delete(name)
            .doit()
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// Builder for [`GcpStore`] (`type = "gcp"`).
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcpStoreBuilder {
    #[serde(default, rename = "project-id")]
    pub project_id: String,
}

impl GcpStoreBuilder {
    pub const TYPE: &'static str = "gcp";
}

#[async_trait]
impl Builder for GcpStoreBuilder {
    fn configure(&mut self, fragment: toml::Value) -> StoreResult<()> {
        *self = decode_fragment(fragment)?;
        Ok(())
    }

    async fn build(&self, name: &str) -> StoreResult<Box<dyn Store>> {
        if self.project_id.is_empty() {
            return Err(StoreError::MissingField("project-id"));
        }

        debug!(store = name, project = %self.project_id, "Connecting to GCP Secret Manager");
        let api = HubSecretManager::connect().await?;
        Ok(Box::new(GcpStore::new(api, &self.project_id)))
    }
}

/// Store backed by GCP Secret Manager.
pub struct GcpStore {
    api: Box<dyn SecretManagerApi>,
    project_id: String,
}

impl std::fmt::Debug for GcpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpStore")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl GcpStore {
    pub fn new(api: impl SecretManagerApi + 'static, project_id: &str) -> Self {
        Self {
            api: Box::new(api),
            project_id: project_id.to_string(),
        }
    }

    fn project(&self) -> String {
        format!("projects/{}", self.project_id)
    }

    fn secret_name(&self, key: &str) -> String {
        format!("projects/{}/secrets/{}", self.project_id, key)
    }

    fn latest_version(&self, key: &str) -> String {
        format!("{}/versions/latest", self.secret_name(key))
    }

    /// Disable or destroy every version of `secret` except `keep`.
    ///
    /// Failures are logged and otherwise ignored.
    async fn prune_versions(&self, secret: &str, keep: &str) {
        let versions = match self.api.list_versions(secret).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!(secret, error = %e, "Failed to list secret versions");
                return;
            }
        };

        for version in versions.iter().filter(|v| v.name != keep) {
            let result = match version.state {
                VersionState::Enabled => self.api.disable_version(&version.name).await,
                VersionState::Disabled => self.api.destroy_version(&version.name).await,
                VersionState::Destroyed | VersionState::Unknown => continue,
            };
            if let Err(e) = result {
                warn!(version = %version.name, error = %e, "Failed to retire secret version");
            }
        }
    }
}

#[async_trait]
impl Store for GcpStore {
    async fn get(&self, key: &str) -> StoreResult<String> {
        let data = match self.api.access_version(&self.latest_version(key)).await {
            Ok(data) => data,
            Err(ApiError::NotFound) => return Err(StoreError::KeyNotFound),
            Err(e) => return Err(StoreError::backend("access gcp secret version", e)),
        };

        String::from_utf8(data).map_err(|_| StoreError::UnsupportedPayload {
            key: key.to_string(),
        })
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let secret = match self.api.get_secret(&self.secret_name(key)).await {
            Ok(secret) => secret,
            Err(ApiError::NotFound) => {
                debug!(key, "Creating GCP secret");
                self.api
                    .create_secret(&self.project(), key)
                    .await
                    .map_err(|e| StoreError::backend("create gcp secret", e))?
            }
            Err(e) => return Err(StoreError::backend("retrieve gcp secret", e)),
        };

        let version = self
            .api
            .add_version(&secret, value.as_bytes())
            .await
            .map_err(|e| StoreError::backend("add gcp secret version", e))?;

        self.prune_versions(&secret, &version).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match self.api.delete_secret(&self.secret_name(key)).await {
            Ok(()) | Err(ApiError::NotFound) => Ok(()),
            Err(e) => Err(StoreError::backend("delete gcp secret", e)),
        }
    }
}
