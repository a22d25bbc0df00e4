//! Profiles: named, ordered sets of secrets loaded together.
//!
//! A profile is consumed in one of two terminal ways:
//!
//! - [`Profile::activate`] replaces the current process with a shell
//! - [`Profile::exec`] runs one command and reports its exit status
//!
//! Both accept extra secrets, injected after the profile's own so they can
//! override a target of the same name.

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitStatus;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::injector::{EnvList, Injector, ProcessEnv};
use crate::process::{self, ProcessError};
use crate::secret::{InjectError, Secret};
use crate::store::StoreLoader;

/// Shell used when neither the caller nor the profile names one.
pub const DEFAULT_SHELL: &str = "sh";

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("lookup shell '{shell}'")]
    ShellLookup {
        shell: String,
        #[source]
        source: which::Error,
    },

    #[error("load {key}")]
    Load {
        key: String,
        #[source]
        source: InjectError,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl ProfileError {
    /// Whether loading failed because a secret was missing from its store.
    pub fn key_not_found(&self) -> bool {
        matches!(self, Self::Load { source, .. } if source.key_not_found())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    /// Preferred shell for [`Profile::activate`].
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

impl Profile {
    /// Inject every secret of the profile, in order, stopping at the first
    /// failure.
    pub async fn load(
        &self,
        injector: &mut dyn Injector,
        loader: &dyn StoreLoader,
    ) -> Result<(), ProfileError> {
        load_all(&self.secrets, injector, loader).await
    }

    /// Resolve the profile secrets, then `extra`, into an environment list.
    pub async fn environment(
        &self,
        loader: &dyn StoreLoader,
        extra: &[Secret],
    ) -> Result<EnvList, ProfileError> {
        let mut env = EnvList::new();
        load_all(self.secrets.iter().chain(extra), &mut env, loader).await?;
        Ok(env)
    }

    /// Shell that [`Profile::activate`] starts: `shell` if given, then the
    /// profile shell, then [`DEFAULT_SHELL`].
    pub fn shell_for<'a>(&'a self, shell: Option<&'a str>) -> &'a str {
        [shell.unwrap_or_default(), self.shell.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SHELL)
    }

    /// Locate the shell [`Profile::activate`] would start.
    pub fn resolve_shell(&self, shell: Option<&str>) -> Result<(String, PathBuf), ProfileError> {
        let shell = self.shell_for(shell).to_string();
        match which::which(&shell) {
            Ok(path) => Ok((shell, path)),
            Err(source) => Err(ProfileError::ShellLookup { shell, source }),
        }
    }

    /// Load the secrets into the current process, then replace it with a shell.
    ///
    /// The shell is located before any secret is loaded. On success this never
    /// returns.
    ///
    /// # Errors
    ///
    /// Fails if the shell cannot be found, a secret cannot be loaded, or the
    /// process image cannot be replaced.
    pub async fn activate(
        &self,
        shell: Option<&str>,
        loader: &dyn StoreLoader,
        extra: &[Secret],
    ) -> Result<Infallible, ProfileError> {
        let (name, path) = self.resolve_shell(shell)?;

        load_all(self.secrets.iter().chain(extra), &mut ProcessEnv, loader).await?;

        debug!(shell = %name, path = %path.display(), "Activating profile");
        Ok(process::replace_with(&path, &name, &EnvList::new())?)
    }

    /// Run `args` as a child process with the secrets in its environment.
    pub async fn exec(
        &self,
        args: &[String],
        loader: &dyn StoreLoader,
        extra: &[Secret],
    ) -> Result<ExitStatus, ProfileError> {
        let env = self.environment(loader, extra).await?;
        Ok(process::run_child(args, &env)?)
    }
}

async fn load_all<'a>(
    secrets: impl IntoIterator<Item = &'a Secret>,
    injector: &mut dyn Injector,
    loader: &dyn StoreLoader,
) -> Result<(), ProfileError> {
    for secret in secrets {
        secret
            .inject(injector, loader)
            .await
            .map_err(|source| ProfileError::Load {
                key: secret.key.clone(),
                source,
            })?;
    }
    Ok(())
}
