//! secenv - personal secret retrieval and environment injection.
//!
//! Secrets live in pluggable stores (a local file, the OS keyring, AWS
//! Secrets Manager, GCP Secret Manager). Profiles name the secrets a program
//! needs; secenv resolves them and hands them over as environment variables,
//! either to an interactive shell or to a single command.
//!
//! # Example
//!
//! ```no_run
//! use secenv::config::Config;
//! use secenv::store::Registry;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_file(Config::default_path()?, &Registry::builtin())?;
//! let profile = config.profile("default")?;
//!
//! let args = vec!["env".to_string()];
//! let status = profile.exec(&args, &config, &[]).await?;
//! std::process::exit(secenv::process::exit_code(status));
//! # }
//! ```

pub mod cloud;
pub mod codec;
pub mod config;
pub mod init;
pub mod injector;
pub mod process;
pub mod profile;
pub mod secret;
pub mod store;
