// secenv - personal secret retrieval and environment injection
//
// This is the main entry point for the application.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secenv::config::Config;
use secenv::profile::Profile;
use secenv::secret::Secret;
use secenv::store::{Registry, StoreLoader, TimeoutLoader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// secenv - personal secret manager
#[derive(Parser, Debug)]
#[command(name = "secenv")]
#[command(version)]
#[command(about = "Fetch secrets from your stores and inject them as environment variables", long_about = None)]
struct Cli {
    /// Path to the configuration file (default: <config dir>/secenv/config.toml)
    #[arg(short, long, global = true, env = "SECENV_CONFIG")]
    config: Option<PathBuf>,

    /// Log store resolution and backend calls to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Abort any single store call that takes longer than this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lookup a key in a store
    #[command(alias = "fetch")]
    Get {
        /// Store to lookup from
        #[arg(short, long, default_value = "default")]
        store: String,

        /// Key to lookup
        key: String,
    },

    /// Store a key value pair
    #[command(aliases = ["put", "store"])]
    Set {
        /// Store to write to
        #[arg(short, long, default_value = "default")]
        store: String,

        /// Key to write
        #[arg(short, long)]
        key: String,

        /// Value to store, joined with spaces (prompted for if omitted)
        value: Vec<String>,
    },

    /// Delete a key from a store
    #[command(alias = "rm")]
    Delete {
        /// Store to delete from
        #[arg(short, long, default_value = "default")]
        store: String,

        /// Key to delete
        key: String,
    },

    /// Replace this process with a shell that has the secrets in its environment
    Shell {
        /// Profile to load
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Shell to start (default: profile shell, then sh)
        #[arg(long, env = "SHELL")]
        shell: Option<String>,

        /// Additional secrets, as [store.]key[=target]
        #[arg(short = 's', long = "secret", value_name = "SECRET")]
        secrets: Vec<Secret>,
    },

    /// Run a command with the secrets in its environment
    Exec {
        /// Profile to load (loaded by default when no --secret is given)
        #[arg(short, long)]
        profile: Option<String>,

        /// Secrets to load, as [store.]key[=target]
        #[arg(short = 's', long = "secret", value_name = "SECRET")]
        secrets: Vec<Secret>,

        /// Command and its arguments; `--` before the command is optional
        #[arg(trailing_var_arg = true, required = true, num_args = 1.., value_name = "COMMAND")]
        args: Vec<String>,
    },

    /// Write a starter configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// List available store types and configured stores
    Stores,

    /// Print version information
    Version {
        /// Only print the version number
        #[arg(long)]
        short: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn config_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    match cli_path {
        Some(path) => Ok(path),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(path: &Path, registry: &Registry) -> Result<Config> {
    Config::from_file(path, registry)
        .with_context(|| format!("Failed to load config from: {:?}", path))
}

/// Loader for store calls, bounded by `--timeout` when given.
fn with_timeout<'a>(
    config: &'a Config,
    timeout: Option<u64>,
    bounded: &'a mut Option<TimeoutLoader<'a>>,
) -> &'a dyn StoreLoader {
    match timeout {
        Some(secs) => bounded.insert(TimeoutLoader::new(config, Duration::from_secs(secs))),
        None => config,
    }
}

fn read_value(key: &str, value: Vec<String>) -> Result<String> {
    if !value.is_empty() {
        return Ok(value.join(" "));
    }

    dialoguer::Password::new()
        .with_prompt(format!("Value for {}", key))
        .allow_empty_password(true)
        .interact()
        .context("Failed to read secret value")
}

fn print_version(short: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if short {
        println!("{}", version);
        return;
    }

    let mut features = Vec::new();
    if cfg!(feature = "aws") {
        features.push("aws");
    }
    if cfg!(feature = "gcp") {
        features.push("gcp");
    }

    println!("Version:   {}", version);
    println!("Commit:    {}", option_env!("SECENV_COMMIT").unwrap_or("unknown"));
    println!(
        "Features:  {}",
        if features.is_empty() {
            "none".to_string()
        } else {
            features.join(", ")
        }
    );
}

fn print_stores(registry: &Registry, config: Option<&Config>) {
    println!("Store types: {}", registry.types().join(", "));

    let Some(config) = config else {
        println!("No configuration found.");
        return;
    };

    println!("\nConfigured stores:");
    for (name, def) in config.stores() {
        let marker = if name == config.default_store { " (default)" } else { "" };
        println!("  {} [{}]{}", name, def.kind(), marker);
    }
    println!("\nProfiles:");
    for name in config.profile_names() {
        let marker = if name == config.default_profile { " (default)" } else { "" };
        println!("  {}{}", name, marker);
    }
}

/// Run the command and return the process exit code.
async fn run(cli: Cli) -> Result<i32> {
    let registry = Registry::builtin();

    match cli.command {
        Commands::Version { short } => {
            print_version(short);
            Ok(0)
        }
        Commands::Init { force } => {
            let path = config_path(cli.config)?;
            secenv::init::init_config(&path, force)?;
            println!("✓ Configuration written to: {:?}", path);
            Ok(0)
        }
        Commands::Stores => {
            let path = config_path(cli.config)?;
            let config = if path.exists() {
                Some(load_config(&path, &registry)?)
            } else {
                None
            };
            print_stores(&registry, config.as_ref());
            Ok(0)
        }
        Commands::Get { store, key } => {
            let config = load_config(&config_path(cli.config)?, &registry)?;
            let mut bounded = None;
            let loader = with_timeout(&config, cli.timeout, &mut bounded);

            let backend = loader
                .resolve_store(&store)
                .await
                .with_context(|| format!("load store '{}'", store))?;
            let value = backend
                .get(&key)
                .await
                .with_context(|| format!("get {} from {} store", key, store))?;

            println!("{}", value);
            Ok(0)
        }
        Commands::Set { store, key, value } => {
            let config = load_config(&config_path(cli.config)?, &registry)?;
            let value = read_value(&key, value)?;
            let mut bounded = None;
            let loader = with_timeout(&config, cli.timeout, &mut bounded);

            let backend = loader
                .resolve_store(&store)
                .await
                .with_context(|| format!("load store '{}'", store))?;
            backend
                .set(&key, &value)
                .await
                .with_context(|| format!("set {} in {} store", key, store))?;

            println!("✓ {} set", key);
            Ok(0)
        }
        Commands::Delete { store, key } => {
            let config = load_config(&config_path(cli.config)?, &registry)?;
            let mut bounded = None;
            let loader = with_timeout(&config, cli.timeout, &mut bounded);

            let backend = loader
                .resolve_store(&store)
                .await
                .with_context(|| format!("load store '{}'", store))?;
            backend
                .delete(&key)
                .await
                .with_context(|| format!("delete {} from {} store", key, store))?;

            println!("✓ {} deleted", key);
            Ok(0)
        }
        Commands::Shell {
            profile,
            shell,
            secrets,
        } => {
            let config = load_config(&config_path(cli.config)?, &registry)?;
            let mut bounded = None;
            let loader = with_timeout(&config, cli.timeout, &mut bounded);

            let profile = config.profile(&profile).context("get profile")?;
            match profile
                .activate(shell.as_deref(), loader, &secrets)
                .await
                .context("activate profile")?
            {}
        }
        Commands::Exec {
            profile,
            secrets,
            args,
        } => {
            let config = load_config(&config_path(cli.config)?, &registry)?;
            let mut bounded = None;
            let loader = with_timeout(&config, cli.timeout, &mut bounded);

            // Load a profile only if explicitly requested, or no secret requested
            let empty = Profile::default();
            let profile = match profile {
                Some(name) => config.profile(&name).context("get profile")?,
                None if secrets.is_empty() => config.profile("").context("get profile")?,
                None => &empty,
            };

            let status = profile
                .exec(&args, loader, &secrets)
                .await
                .with_context(|| format!("exec {}", args.join(" ")))?;
            Ok(secenv::process::exit_code(status))
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("\nError: Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}
