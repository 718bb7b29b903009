//! Completion summary and file import/export.

use crate::api::{ApiError, ApiJson, ApiQuery, AppState};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use registrar_core::{
    Actor, AdapterInfo, ConflictStrategy, ImportOptions, ImportReport, InstitutionId,
    InstitutionSummary, TermId, collect_export, export_with, import_file,
};
use serde::Deserialize;
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

/// Query of `GET /api/summary`.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    /// Institution to summarize. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Restrict to one term.
    #[serde(default)]
    pub term_id: Option<TermId>,
}

/// Body of `POST /api/import`.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Target institution. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Adapter id. Guessed from `filename` when absent.
    #[serde(default)]
    pub adapter: Option<String>,
    /// Original file name. Its extension picks the adapter.
    #[serde(default)]
    pub filename: Option<String>,
    /// File content, standard base64.
    pub content_base64: String,
    /// How to settle differing fields. `merge` when absent.
    #[serde(default)]
    pub strategy: ConflictStrategy,
    /// Report without writing.
    #[serde(default)]
    pub dry_run: bool,
}

/// Query of `GET /api/export`.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// Institution to export. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Adapter id, `json` when absent.
    #[serde(default)]
    pub adapter: Option<String>,
}

pub async fn summary(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> Result<Json<InstitutionSummary>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.institution_summary(
        &actor,
        query.institution_id,
        query.term_id,
    )?))
}

pub async fn list_adapters(State(state): Shared) -> Json<Vec<AdapterInfo>> {
    Json(state.adapters.list())
}

pub async fn import(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(request): ApiJson<ImportRequest>,
) -> Result<Json<ImportReport>, ApiError> {
    let bytes = STANDARD
        .decode(request.content_base64.trim())
        .map_err(|e| ApiError::BadRequest(format!("content_base64: {e}")))?;
    let institution = actor.resolve_institution(request.institution_id)?;
    let adapter = state
        .adapters
        .resolve(request.adapter.as_deref(), request.filename.as_deref())?;
    let options = ImportOptions {
        strategy: request.strategy,
        dry_run: request.dry_run,
    };

    let mut registrar = state.registrar.write().await;
    let report = import_file(
        &mut *registrar,
        &actor,
        institution,
        adapter,
        &bytes,
        options,
    )?;
    tracing::info!(
        adapter = %report.adapter,
        institution = %institution,
        strategy = %options.strategy,
        dry_run = options.dry_run,
        created = report.created,
        updated = report.updated,
        errors = report.errors.len(),
        "import finished"
    );
    Ok(Json(report))
}

pub async fn export(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> Result<Response, ApiError> {
    let institution = actor.resolve_institution(query.institution_id)?;
    let adapter = state.adapters.get(query.adapter.as_deref().unwrap_or("json"))?;
    let info = adapter.info();

    let batch = {
        let registrar = state.registrar.read().await;
        collect_export(&*registrar, &actor, institution)?
    };
    let body = export_with(adapter, &batch)?;

    let ext = info.extensions.first().map_or("dat", String::as_str);
    let disposition = format!(
        "attachment; filename=\"{}-{}.{ext}\"",
        batch.institution.short_name.to_lowercase(),
        info.id
    );
    tracing::info!(adapter = %info.id, institution = %institution, bytes = body.len(), "export finished");
    Ok((
        [
            (header::CONTENT_TYPE, info.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
