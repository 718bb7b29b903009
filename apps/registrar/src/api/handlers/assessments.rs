//! CLO data entry and review.
//!
//! Every workflow transition is logged at `info` with the assessment id,
//! the new status and the acting user. Bodies of `submit`, `approve` and
//! `reopen` may be omitted.

use crate::api::{ApiError, ApiJson, ApiQuery, AppState};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use registrar_core::registrar::AssessmentFilter;
use registrar_core::workflow::AssessmentData;
use registrar_core::{Actor, Assessment, AssessmentId};
use serde::Deserialize;
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

/// Body of `POST /api/assessments/{id}/submit`.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// Final numbers, saved before submitting. Omit to submit what is stored.
    #[serde(default)]
    pub data: Option<AssessmentData>,
}

/// Body of `approve` and `reopen`.
#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    /// Optional note for the instructor.
    #[serde(default)]
    pub note: Option<String>,
}

/// Body of `POST /api/assessments/{id}/rework`.
#[derive(Debug, Deserialize)]
pub struct ReworkRequest {
    /// What must change.
    pub feedback: String,
}

/// Body of `POST /api/assessments/{id}/never-coming-in`.
#[derive(Debug, Deserialize)]
pub struct NeverComingInRequest {
    /// Why no data will be reported.
    pub reason: String,
}

fn logged(action: &str, actor: &Actor, assessment: Assessment) -> Json<Assessment> {
    tracing::info!(
        assessment = %assessment.id,
        status = %assessment.status,
        by = %actor.user_id,
        "{action}"
    );
    Json(assessment)
}

pub async fn list(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(filter): ApiQuery<AssessmentFilter>,
) -> Result<Json<Vec<Assessment>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_assessments(&actor, &filter)?))
}

pub async fn get(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
) -> Result<Json<Assessment>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_assessment(&actor, id)?))
}

pub async fn record(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
    ApiJson(data): ApiJson<AssessmentData>,
) -> Result<Json<Assessment>, ApiError> {
    let mut registrar = state.registrar.write().await;
    let before = registrar.get_assessment(&actor, id)?.status;
    let assessment = registrar.record_assessment(&actor, id, data)?;
    if assessment.status == before {
        return Ok(Json(assessment));
    }
    Ok(logged("assessment data recorded", &actor, assessment))
}

pub async fn submit(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
    body: Option<ApiJson<SubmitRequest>>,
) -> Result<Json<Assessment>, ApiError> {
    let ApiJson(request) = body.unwrap_or_default();
    let mut registrar = state.registrar.write().await;
    let assessment = registrar.submit_assessment(&actor, id, request.data)?;
    Ok(logged("assessment submitted", &actor, assessment))
}

pub async fn approve(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
    body: Option<ApiJson<NoteRequest>>,
) -> Result<Json<Assessment>, ApiError> {
    let ApiJson(request) = body.unwrap_or_default();
    let mut registrar = state.registrar.write().await;
    let assessment = registrar.approve_assessment(&actor, id, request.note)?;
    Ok(logged("assessment approved", &actor, assessment))
}

pub async fn rework(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
    ApiJson(request): ApiJson<ReworkRequest>,
) -> Result<Json<Assessment>, ApiError> {
    let mut registrar = state.registrar.write().await;
    let assessment = registrar.request_rework(&actor, id, &request.feedback)?;
    Ok(logged("assessment returned for rework", &actor, assessment))
}

pub async fn never_coming_in(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
    ApiJson(request): ApiJson<NeverComingInRequest>,
) -> Result<Json<Assessment>, ApiError> {
    let mut registrar = state.registrar.write().await;
    let assessment = registrar.mark_never_coming_in(&actor, id, &request.reason)?;
    Ok(logged("assessment marked never coming in", &actor, assessment))
}

pub async fn reopen(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AssessmentId>,
    body: Option<ApiJson<NoteRequest>>,
) -> Result<Json<Assessment>, ApiError> {
    let ApiJson(request) = body.unwrap_or_default();
    let mut registrar = state.registrar.write().await;
    let assessment = registrar.reopen_assessment(&actor, id, request.note)?;
    Ok(logged("assessment reopened", &actor, assessment))
}
