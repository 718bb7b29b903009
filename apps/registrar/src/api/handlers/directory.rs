//! Institutions, programs, users and tokens.

use crate::api::{ApiError, ApiJson, ApiQuery, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use registrar_core::models::UserView;
use registrar_core::registrar::{
    InstitutionUpdate, NewInstitution, NewProgram, NewUser, UserUpdate,
};
use registrar_core::{Actor, Institution, InstitutionId, Program, ProgramId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

/// Query of `GET /api/users`.
#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    /// Institution to list. Site admins without it see everyone.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
}

/// Response of `POST /api/users/{id}/token`.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// The user the token belongs to.
    pub user: UserView,
    /// Plaintext token, shown once.
    pub token: String,
}

pub async fn list_institutions(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Institution>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_institutions(&actor)?))
}

pub async fn create_institution(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(input): ApiJson<NewInstitution>,
) -> Result<(StatusCode, Json<Institution>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let institution = registrar.create_institution(&actor, input)?;
    tracing::info!(institution = %institution.short_name, "institution created");
    Ok((StatusCode::CREATED, Json(institution)))
}

pub async fn get_institution(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InstitutionId>,
) -> Result<Json<Institution>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_institution(&actor, id)?))
}

pub async fn update_institution(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InstitutionId>,
    ApiJson(update): ApiJson<InstitutionUpdate>,
) -> Result<Json<Institution>, ApiError> {
    let mut registrar = state.registrar.write().await;
    Ok(Json(registrar.update_institution(&actor, id, update)?))
}

pub async fn list_programs(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InstitutionId>,
) -> Result<Json<Vec<Program>>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.list_programs(&actor, Some(id))?))
}

pub async fn create_program(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InstitutionId>,
    ApiJson(input): ApiJson<NewProgram>,
) -> Result<(StatusCode, Json<Program>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let program = registrar.create_program(&actor, id, input)?;
    Ok((StatusCode::CREATED, Json(program)))
}

pub async fn delete_program(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<ProgramId>,
) -> Result<StatusCode, ApiError> {
    let mut registrar = state.registrar.write().await;
    registrar.delete_program(&actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiQuery(query): ApiQuery<UsersQuery>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let registrar = state.registrar.read().await;
    let users = registrar.list_users(&actor, query.institution_id)?;
    Ok(Json(users.iter().map(|u| u.view()).collect()))
}

pub async fn create_user(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    ApiJson(input): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let user = registrar.create_user(&actor, input)?;
    tracing::info!(user = %user.email, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user.view())))
}

pub async fn get_user(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_user(&actor, id)?.view()))
}

pub async fn update_user(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<UserId>,
    ApiJson(update): ApiJson<UserUpdate>,
) -> Result<Json<UserView>, ApiError> {
    let deactivated = update.active == Some(false);
    let mut registrar = state.registrar.write().await;
    let user = registrar.update_user(&actor, id, update)?;
    if deactivated {
        registrar_core::cache::forget_user(&mut *state.tokens.lock().await, id);
    }
    Ok(Json(user.view()))
}

pub async fn issue_token(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<UserId>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let mut registrar = state.registrar.write().await;
    let (user, token) = registrar.issue_token(&actor, id)?;
    registrar_core::cache::forget_user(&mut *state.tokens.lock().await, id);
    tracing::info!(user = %user.email, issued_by = %actor.user_id, "token issued");
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            user: user.view(),
            token,
        }),
    ))
}

pub async fn revoke_token(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    let mut registrar = state.registrar.write().await;
    let mut tokens = state.tokens.lock().await;
    let user = registrar.revoke_token(&actor, id, Some(&mut *tokens))?;
    tracing::info!(user = %user.email, revoked_by = %actor.user_id, "token revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/me`
pub async fn me(
    State(state): Shared,
    Extension(actor): Extension<Actor>,
) -> Result<Json<UserView>, ApiError> {
    let registrar = state.registrar.read().await;
    Ok(Json(registrar.get_user(&actor, actor.user_id)?.view()))
}
