//! Terms, offerings and sections.

use crate::api::{ApiError, ApiJson, ApiQuery, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use registrar_core::registrar::{
    NewOffering, NewSection, NewTerm, OfferingFilter, SectionFilter, SectionUpdate, TermUpdate,
};
use registrar_core::{
    Actor, InstitutionId, Offering, OfferingId, Section, SectionId, Term, TermId, UserId,
};
use serde::Deserialize;
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

/// Query of `GET /api/terms`.
#[derive(Debug, Default, Deserialize)]
pub struct TermsQuery {
    /// Institution to list. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Include deactivated terms.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Body of `PUT /api/sections/{id}/instructor`. `null` clears it.
#[derive(Debug, Deserialize)]
pub struct InstructorRequest {
    /// New instructor.
    #[serde(default)]
    pub instructor_id: Option<UserId>,
}

// -----------------------------------------------------------------------------
// Terms
// -----------------------------------------------------------------------------

pub async fn list_terms(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(query): ApiQuery<TermsQuery>,
) -> Result<Json<Vec<Term>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_terms(
        &actor,
        query.institution_id,
        query.include_inactive,
    )?))
}

pub async fn create_term(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(input): ApiJson<NewTerm>,
) -> Result<(StatusCode, Json<Term>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let term = registrar.create_term(&actor, input)?;
    Ok((StatusCode::CREATED, Json(term)))
}

pub async fn get_term(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<TermId>,
) -> Result<Json<Term>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_term(&actor, id)?))
}

pub async fn update_term(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<TermId>,
    ApiJson(update): ApiJson<TermUpdate>,
) -> Result<Json<Term>, ApiError> {
    let mut registrar = state.registrar.write().await;
    Ok(Json(registrar.update_term(&actor, id, update)?))
}

pub async fn delete_term(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<TermId>,
) -> Result<StatusCode, ApiError> {
    let mut registrar = state.registrar.write().await;
    registrar.delete_term(&actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Offerings
// -----------------------------------------------------------------------------

pub async fn list_offerings(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(filter): ApiQuery<OfferingFilter>,
) -> Result<Json<Vec<Offering>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_offerings(&actor, &filter)?))
}

pub async fn create_offering(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(input): ApiJson<NewOffering>,
) -> Result<(StatusCode, Json<Offering>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let offering = registrar.create_offering(&actor, input)?;
    Ok((StatusCode::CREATED, Json(offering)))
}

pub async fn get_offering(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<OfferingId>,
) -> Result<Json<Offering>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_offering(&actor, id)?))
}

pub async fn delete_offering(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<OfferingId>,
) -> Result<StatusCode, ApiError> {
    let mut registrar = state.registrar.write().await;
    registrar.delete_offering(&actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Sections
// -----------------------------------------------------------------------------

pub async fn list_sections(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(filter): ApiQuery<SectionFilter>,
) -> Result<Json<Vec<Section>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_sections(&actor, &filter)?))
}

pub async fn create_section(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(input): ApiJson<NewSection>,
) -> Result<(StatusCode, Json<Section>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let section = registrar.create_section(&actor, input)?;
    Ok((StatusCode::CREATED, Json(section)))
}

pub async fn get_section(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<SectionId>,
) -> Result<Json<Section>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_section(&actor, id)?))
}

pub async fn update_section(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<SectionId>,
    ApiJson(update): ApiJson<SectionUpdate>,
) -> Result<Json<Section>, ApiError> {
    let mut registrar = state.registrar.write().await;
    Ok(Json(registrar.update_section(&actor, id, update)?))
}

pub async fn delete_section(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<SectionId>,
) -> Result<StatusCode, ApiError> {
    let mut registrar = state.registrar.write().await;
    registrar.delete_section(&actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_instructor(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<SectionId>,
    ApiJson(request): ApiJson<InstructorRequest>,
) -> Result<Json<Section>, ApiError> {
    let mut registrar = state.registrar.write().await;
    let section = registrar.assign_instructor(&actor, id, request.instructor_id)?;
    tracing::info!(
        section = %section.id,
        instructor = ?section.instructor_id,
        by = %actor.user_id,
        "section instructor changed"
    );
    Ok(Json(section))
}
