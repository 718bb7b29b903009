//! Command-line arguments.

use crate::config::{ConfigOverrides, DEFAULT_DATABASE};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log verbosity accepted by `--log-level`.
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    /// Directive for `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Registrar: CLO assessment records for community colleges.
#[derive(Debug, Parser)]
#[command(name = "registrar", version, about)]
pub struct Cli {
    /// Log level for registrar and HTTP tracing. `RUST_LOG` wins when set.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a database and its first site admin.
    Init {
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: PathBuf,
        /// Site admin email.
        #[arg(long)]
        admin_email: String,
        #[arg(long, default_value = "Site")]
        first_name: String,
        #[arg(long, default_value = "Admin")]
        last_name: String,
        /// Replace an existing database.
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP server.
    Serve {
        /// Database file (env: REGISTRAR_DATABASE).
        #[arg(short, long)]
        database: Option<PathBuf>,
        /// `redb` or `memory`.
        #[arg(long)]
        backend: Option<String>,
        /// Listen address (env: REGISTRAR_BIND).
        #[arg(short, long)]
        bind: Option<String>,
        /// Requests per second across all clients (env: REGISTRAR_RATE_LIMIT).
        #[arg(long)]
        rate_limit: Option<u32>,
        /// Allowed CORS origin, `*` for any.
        #[arg(long)]
        cors_origin: Option<String>,
    },
    /// Create an institution.
    AddInstitution {
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: PathBuf,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Unique short name (e.g. MCC).
        #[arg(long)]
        short_name: String,
    },
    /// Import a file into an institution.
    Import {
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: PathBuf,
        /// Institution short name.
        #[arg(short, long)]
        institution: String,
        /// File to import.
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Adapter id. Guessed from the file extension when omitted.
        #[arg(short, long)]
        adapter: Option<String>,
        /// use_mine, use_theirs, merge or manual_review.
        #[arg(long, default_value = "merge")]
        strategy: String,
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Export an institution's records.
    Export {
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: PathBuf,
        /// Institution short name.
        #[arg(short, long)]
        institution: String,
        /// Output file. Standard output when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, default_value = "json")]
        adapter: String,
    },
    /// Issue a fresh API token for a user.
    Token {
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: PathBuf,
        /// The user's email.
        #[arg(value_name = "EMAIL")]
        email: String,
    },
    /// Show record counts.
    Status {
        #[arg(short, long, default_value = DEFAULT_DATABASE)]
        database: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List file adapters.
    Adapters {
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// Server overrides carried by `serve`. Other commands have none.
    pub fn server_overrides(&self) -> Result<ConfigOverrides, String> {
        let Self::Serve {
            database,
            backend,
            bind,
            rate_limit,
            cors_origin,
        } = self
        else {
            return Ok(ConfigOverrides::default());
        };
        let backend = backend
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: registrar_core::RegistrarError| e.to_string())?;
        Ok(ConfigOverrides {
            bind: bind.clone(),
            database: database.clone(),
            backend,
            rate_limit_per_second: *rate_limit,
            cors_allow_origin: cors_origin.clone(),
            token_cache_size: None,
        })
    }
}
