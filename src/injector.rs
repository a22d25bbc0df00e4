//! Destinations for resolved secrets.
//!
//! An [`Injector`] receives `(name, value)` pairs and places them somewhere a
//! program can read them:
//!
//! - [`ProcessEnv`]: variables of the current process, inherited by a shell
//!   that replaces it
//! - [`EnvList`]: an ordered list handed to a child process
//!
//! Any `FnMut(&str, &str) -> Result<(), E>` closure is an injector too.
//!
//! # Example
//!
//! ```
//! use secenv::injector::{EnvList, Injector};
//!
//! let mut env = EnvList::new();
//! env.inject("API_KEY", "abc123").unwrap();
//! env.inject("API_KEY", "def456").unwrap();
//!
//! assert_eq!(env.get("API_KEY"), Some("def456"));
//! ```

use thiserror::Error;

use crate::store::BoxError;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("invalid environment variable name '{0}'")]
    InvalidName(String),

    #[error("value of {0} contains a NUL byte")]
    NulValue(String),
}

/// Places a resolved secret under `name`.
pub trait Injector {
    fn inject(&mut self, name: &str, value: &str) -> Result<(), BoxError>;
}

impl<F, E> Injector for F
where
    F: FnMut(&str, &str) -> Result<(), E>,
    E: Into<BoxError>,
{
    fn inject(&mut self, name: &str, value: &str) -> Result<(), BoxError> {
        self(name, value).map_err(Into::into)
    }
}

/// Reject pairs the OS environment cannot hold.
pub fn validate(name: &str, value: &str) -> Result<(), EnvError> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(EnvError::InvalidName(name.to_string()));
    }
    if value.contains('\0') {
        return Err(EnvError::NulValue(name.to_string()));
    }
    Ok(())
}

/// Sets variables in the environment of the current process.
///
/// Only meant to be used right before the process image is replaced.
#[derive(Debug, Default)]
pub struct ProcessEnv;

impl Injector for ProcessEnv {
    fn inject(&mut self, name: &str, value: &str) -> Result<(), BoxError> {
        validate(name, value)?;
        std::env::set_var(name, value);
        Ok(())
    }
}

/// Ordered environment overrides for a child process.
///
/// Entries are kept in injection order; when the list is applied, a later
/// entry wins over an earlier one with the same name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvList {
    vars: Vec<(String, String)>,
}

impl EnvList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Effective value of `name`, the last one injected.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Injector for EnvList {
    fn inject(&mut self, name: &str, value: &str) -> Result<(), BoxError> {
        validate(name, value)?;
        self.vars.push((name.to_string(), value.to_string()));
        Ok(())
    }
}
