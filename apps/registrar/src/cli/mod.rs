//! # CLI Commands
//!
//! One function per subcommand. Each returns `Err(String)` with a message
//! ready for the terminal; `main` prints it and exits with status 1.
//!
//! Offline commands (`init`, `add-institution`, `import`, `export`, `token`,
//! `status`) open the redb file directly and act as the site admin.

mod args;

pub use args::{Cli, Command, LogLevelArg};

use crate::api::{AppState, create_router};
use crate::config::ServerConfig;
use registrar_core::registrar::NewInstitution;
use registrar_core::{
    Actor, AdapterRegistry, BackendKind, ConflictStrategy, ImportOptions, Registrar, RecordStore,
    RedbStore, Role, StoreBackend, User, collect_export, export_with, import_file,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Email of the admin created for a fresh in-memory server.
const MEMORY_ADMIN_EMAIL: &str = "admin@localhost";

// =============================================================================
// HELPERS
// =============================================================================

/// Open an existing redb database.
pub fn open_registrar(db_path: &Path) -> Result<Registrar<StoreBackend>, String> {
    let store = RedbStore::open(db_path).map_err(|e| e.to_string())?;
    Ok(Registrar::new(StoreBackend::Redb(store)))
}

/// The active site admin of a database.
pub fn site_admin<S: RecordStore>(registrar: &Registrar<S>) -> Result<Actor, String> {
    registrar
        .store()
        .scan::<User>()
        .map_err(|e| e.to_string())?
        .iter()
        .find(|u| u.role == Role::SiteAdmin && u.active)
        .map(Actor::for_user)
        .ok_or_else(|| "no active site admin. Run `registrar init` first".to_string())
}

fn find_institution_id<S: RecordStore>(
    registrar: &Registrar<S>,
    short_name: &str,
) -> Result<registrar_core::InstitutionId, String> {
    registrar
        .find_institution(short_name)
        .map_err(|e| e.to_string())?
        .map(|i| i.id)
        .ok_or_else(|| format!("institution '{short_name}' not found"))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Create a database with its first site admin and print the admin token.
pub fn cmd_init(
    db_path: &Path,
    admin_email: &str,
    first_name: &str,
    last_name: &str,
    force: bool,
) -> Result<(), String> {
    if db_path.exists() {
        if !force {
            return Err(format!(
                "{} already exists. Use --force to replace it",
                db_path.display()
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| format!("cannot remove {}: {e}", db_path.display()))?;
    }

    let store = RedbStore::create(db_path).map_err(|e| e.to_string())?;
    let mut registrar = Registrar::new(StoreBackend::Redb(store));
    let (admin, token) = registrar
        .bootstrap_site_admin(admin_email, first_name, last_name)
        .map_err(|e| e.to_string())?;

    tracing::info!(path = %db_path.display(), admin = %admin.email, "database initialized");
    println!("Initialized {}", db_path.display());
    println!("Site admin: {}", admin.email);
    println!("API token (shown once): {token}");
    Ok(())
}

/// Run the HTTP server until Ctrl-C.
pub async fn cmd_serve(config: ServerConfig) -> Result<(), String> {
    let addr = config.socket_addr()?;
    let store = StoreBackend::open(config.backend, &config.database).map_err(|e| e.to_string())?;
    let mut registrar = Registrar::new(store);

    if site_admin(&registrar).is_err() {
        match config.backend {
            BackendKind::Memory => {
                let (admin, token) = registrar
                    .bootstrap_site_admin(MEMORY_ADMIN_EMAIL, "Site", "Admin")
                    .map_err(|e| e.to_string())?;
                tracing::warn!(admin = %admin.email, "in-memory store: records are lost on exit");
                eprintln!("Site admin token: {token}");
            }
            BackendKind::Redb => {
                tracing::warn!(
                    path = %config.database.display(),
                    "no site admin in this database. Run `registrar init` to create one"
                );
            }
        }
    }

    let state = Arc::new(AppState::new(registrar, &config));
    let app = create_router(state, &config);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("cannot bind {addr}: {e}"))?;

    tracing::info!(
        %addr,
        backend = %config.backend,
        rate_limit = config.rate_limit_per_second,
        "registrar listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))?;
    tracing::info!("registrar stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Create an institution.
pub fn cmd_add_institution(db_path: &Path, name: &str, short_name: &str) -> Result<(), String> {
    let mut registrar = open_registrar(db_path)?;
    let admin = site_admin(&registrar)?;
    let institution = registrar
        .create_institution(
            &admin,
            NewInstitution {
                name: name.to_string(),
                short_name: short_name.to_string(),
            },
        )
        .map_err(|e| e.to_string())?;
    println!(
        "Created institution {} ({}) with id {}",
        institution.name, institution.short_name, institution.id
    );
    Ok(())
}

/// Import `file` into the institution named `institution`.
pub fn cmd_import(
    db_path: &Path,
    institution: &str,
    file: &Path,
    adapter: Option<&str>,
    strategy: &str,
    dry_run: bool,
    json: bool,
) -> Result<(), String> {
    let strategy: ConflictStrategy = strategy.parse().map_err(|e| format!("{e}"))?;
    let bytes =
        std::fs::read(file).map_err(|e| format!("cannot read {}: {e}", file.display()))?;

    let adapters = AdapterRegistry::with_builtin();
    let file_name = file.file_name().and_then(|n| n.to_str());
    let adapter = adapters
        .resolve(adapter, file_name)
        .map_err(|e| e.to_string())?;

    let mut registrar = open_registrar(db_path)?;
    let admin = site_admin(&registrar)?;
    let institution_id = find_institution_id(&registrar, institution)?;
    let report = import_file(
        &mut registrar,
        &admin,
        institution_id,
        adapter,
        &bytes,
        ImportOptions { strategy, dry_run },
    )
    .map_err(|e| e.to_string())?;

    tracing::info!(
        file = %file.display(),
        adapter = %report.adapter,
        created = report.created,
        updated = report.updated,
        errors = report.errors.len(),
        "import finished"
    );
    if json {
        print_json(&report)
    } else {
        print!("{}", report.to_text());
        if !report.is_clean() {
            println!("Import finished with errors or conflicts needing review.");
        }
        Ok(())
    }
}

/// Export an institution with `adapter`, to `output` or standard output.
pub fn cmd_export(
    db_path: &Path,
    institution: &str,
    output: Option<&Path>,
    adapter: &str,
) -> Result<(), String> {
    let adapters = AdapterRegistry::with_builtin();
    let adapter = adapters.get(adapter).map_err(|e| e.to_string())?;

    let registrar = open_registrar(db_path)?;
    let admin = site_admin(&registrar)?;
    let institution_id = find_institution_id(&registrar, institution)?;
    let batch = collect_export(&registrar, &admin, institution_id).map_err(|e| e.to_string())?;
    let bytes = export_with(adapter, &batch).map_err(|e| e.to_string())?;

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
            eprintln!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|()| stdout.flush())
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Issue a fresh token for the user with `email`, replacing the old one.
pub fn cmd_token(db_path: &Path, email: &str) -> Result<(), String> {
    let mut registrar = open_registrar(db_path)?;
    let admin = site_admin(&registrar)?;
    let user = registrar
        .find_user_by_email(email)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no user with email '{email}'"))?;
    let (user, token) = registrar
        .issue_token(&admin, user.id)
        .map_err(|e| e.to_string())?;
    println!("API token for {} (shown once): {token}", user.email);
    Ok(())
}

/// Print record counts.
pub fn cmd_status(db_path: &Path, json: bool) -> Result<(), String> {
    let registrar = open_registrar(db_path)?;
    let counts = registrar.counts().map_err(|e| e.to_string())?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(kind, n)| (kind.to_string(), serde_json::Value::from(*n)))
            .collect();
        print_json(&serde_json::json!({
            "database": db_path.display().to_string(),
            "records": map,
        }))
    } else {
        println!("Database: {}", db_path.display());
        for (kind, n) in counts {
            println!("  {kind:<12} {n}");
        }
        Ok(())
    }
}

/// List the built-in adapters.
pub fn cmd_adapters(json: bool) -> Result<(), String> {
    let adapters = AdapterRegistry::with_builtin().list();
    if json {
        return print_json(&adapters);
    }
    for info in adapters {
        let mut modes = Vec::new();
        if info.supports_import {
            modes.push("import");
        }
        if info.supports_export {
            modes.push("export");
        }
        println!(
            "{:<12} {:<28} .{:<6} {}",
            info.id,
            info.name,
            info.extensions.join(", ."),
            modes.join("/")
        );
    }
    Ok(())
}
