//! Cloud secret manager stores.
//!
//! # Supported Platforms
//!
//! - AWS Secrets Manager (feature `aws`)
//! - GCP Secret Manager (feature `gcp`)
//!
//! Each store talks to its provider through a narrow API trait. The real
//! implementation wraps the provider SDK; tests substitute an in-memory mock.

#[cfg(feature = "aws")]
pub mod aws;
#[cfg(feature = "gcp")]
pub mod gcp;

use thiserror::Error;

use crate::store::BoxError;

/// Failure reported by a provider API call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The addressed secret or version does not exist.
    #[error("resource not found")]
    NotFound,

    #[error(transparent)]
    Other(BoxError),
}

impl ApiError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }
}
