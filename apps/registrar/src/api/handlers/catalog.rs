//! Courses and learning outcomes.

use crate::api::{ApiError, ApiJson, ApiQuery, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use registrar_core::registrar::{CourseFilter, CourseUpdate, NewCourse, NewOutcome, OutcomeUpdate};
use registrar_core::{Actor, Course, CourseId, Outcome, OutcomeId};
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

pub async fn list_courses(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(filter): ApiQuery<CourseFilter>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_courses(&actor, &filter)?))
}

pub async fn create_course(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(input): ApiJson<NewCourse>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let course = registrar.create_course(&actor, input)?;
    tracing::info!(course = %course.course_number, institution = %course.institution_id, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn get_course(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<CourseId>,
) -> Result<Json<Course>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_course(&actor, id)?))
}

pub async fn update_course(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<CourseId>,
    ApiJson(update): ApiJson<CourseUpdate>,
) -> Result<Json<Course>, ApiError> {
    let mut registrar = state.registrar.write().await;
    Ok(Json(registrar.update_course(&actor, id, update)?))
}

pub async fn delete_course(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<CourseId>,
) -> Result<StatusCode, ApiError> {
    let mut registrar = state.registrar.write().await;
    registrar.delete_course(&actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_outcomes(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<CourseId>,
) -> Result<Json<Vec<Outcome>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_outcomes(&actor, id)?))
}

pub async fn create_outcome(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<CourseId>,
    ApiJson(input): ApiJson<NewOutcome>,
) -> Result<(StatusCode, Json<Outcome>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let outcome = registrar.create_outcome(&actor, id, input)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn update_outcome(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<OutcomeId>,
    ApiJson(update): ApiJson<OutcomeUpdate>,
) -> Result<Json<Outcome>, ApiError> {
    let mut registrar = state.registrar.write().await;
    Ok(Json(registrar.update_outcome(&actor, id, update)?))
}
