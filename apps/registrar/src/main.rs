//! Registrar server and command-line entry point.

use clap::Parser;
use registrar::cli::{self, Cli, Command};
use registrar::config::ServerConfig;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor `--log-level` is given.
const DEFAULT_FILTER: &str = "registrar=info,registrar_core=info,tower_http=info";

fn init_tracing(cli: &Cli) {
    let filter = match cli.log_level {
        Some(level) => {
            let level = level.as_directive();
            EnvFilter::new(format!(
                "registrar={level},registrar_core={level},tower_http={level}"
            ))
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), String> {
    let overrides = cli.command.server_overrides()?;
    match cli.command {
        Command::Init {
            database,
            admin_email,
            first_name,
            last_name,
            force,
        } => cli::cmd_init(&database, &admin_email, &first_name, &last_name, force),
        Command::Serve { .. } => {
            let config = ServerConfig::resolve(overrides)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("cannot start runtime: {e}"))?;
            runtime.block_on(cli::cmd_serve(config))
        }
        Command::AddInstitution {
            database,
            name,
            short_name,
        } => cli::cmd_add_institution(&database, &name, &short_name),
        Command::Import {
            database,
            institution,
            file,
            adapter,
            strategy,
            dry_run,
            json,
        } => cli::cmd_import(
            &database,
            &institution,
            &file,
            adapter.as_deref(),
            &strategy,
            dry_run,
            json,
        ),
        Command::Export {
            database,
            institution,
            output,
            adapter,
        } => cli::cmd_export(&database, &institution, output.as_deref(), &adapter),
        Command::Token { database, email } => cli::cmd_token(&database, &email),
        Command::Status { database, json } => cli::cmd_status(&database, json),
        Command::Adapters { json } => cli::cmd_adapters(json),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
