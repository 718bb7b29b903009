//! # HTTP API
//!
//! JSON over HTTP in front of [`Registrar`]. Every route under `/api`
//! requires `Authorization: Bearer <token>`; `/health` does not.
//!
//! | Area | Routes |
//! |------|--------|
//! | Directory | `/api/institutions`, `/api/institutions/{id}/programs`, `/api/programs/{id}`, `/api/users`, `/api/users/{id}/token`, `/api/me` |
//! | Catalog | `/api/courses`, `/api/courses/{id}/outcomes`, `/api/outcomes/{id}` |
//! | Schedule | `/api/terms`, `/api/offerings`, `/api/sections`, `/api/sections/{id}/instructor` |
//! | Assessments | `/api/assessments`, `/api/assessments/{id}/{data,submit,approve,rework,never-coming-in,reopen}` |
//! | Interchange | `/api/summary`, `/api/adapters`, `/api/import`, `/api/export` |

mod error;
mod extract;
mod handlers;
mod middleware;

pub use error::ApiError;
pub use extract::{ApiJson, ApiQuery};

use crate::config::ServerConfig;
use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, post, put};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use registrar_core::cache::{TokenCache, token_cache};
use registrar_core::{AdapterRegistry, Registrar, StoreBackend};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared server state.
pub struct AppState {
    /// The records service.
    pub registrar: RwLock<Registrar<StoreBackend>>,
    /// Recently verified bearer tokens.
    pub tokens: Mutex<TokenCache>,
    /// File adapters.
    pub adapters: AdapterRegistry,
    limiter: DefaultDirectRateLimiter,
}

impl AppState {
    /// Build the state for `registrar` with the limits from `config`.
    pub fn new(registrar: Registrar<StoreBackend>, config: &ServerConfig) -> Self {
        let per_second = NonZeroU32::new(config.rate_limit_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            registrar: RwLock::new(registrar),
            tokens: Mutex::new(token_cache(config.token_cache_size)),
            adapters: AdapterRegistry::with_builtin(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    /// Whether another request fits in the current rate window.
    pub fn admit(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Build the router.
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    use handlers::{assessments, catalog, directory, interchange, schedule};

    let api = Router::new()
        // Directory
        .route(
            "/institutions",
            get(directory::list_institutions).post(directory::create_institution),
        )
        .route(
            "/institutions/{id}",
            get(directory::get_institution).patch(directory::update_institution),
        )
        .route(
            "/institutions/{id}/programs",
            get(directory::list_programs).post(directory::create_program),
        )
        .route("/programs/{id}", delete(directory::delete_program))
        .route("/users", get(directory::list_users).post(directory::create_user))
        .route(
            "/users/{id}",
            get(directory::get_user).patch(directory::update_user),
        )
        .route(
            "/users/{id}/token",
            post(directory::issue_token).delete(directory::revoke_token),
        )
        .route("/me", get(directory::me))
        // Catalog
        .route(
            "/courses",
            get(catalog::list_courses).post(catalog::create_course),
        )
        .route(
            "/courses/{id}",
            get(catalog::get_course)
                .patch(catalog::update_course)
                .delete(catalog::delete_course),
        )
        .route(
            "/courses/{id}/outcomes",
            get(catalog::list_outcomes).post(catalog::create_outcome),
        )
        .route("/outcomes/{id}", patch(catalog::update_outcome))
        // Schedule
        .route("/terms", get(schedule::list_terms).post(schedule::create_term))
        .route(
            "/terms/{id}",
            get(schedule::get_term)
                .patch(schedule::update_term)
                .delete(schedule::delete_term),
        )
        .route(
            "/offerings",
            get(schedule::list_offerings).post(schedule::create_offering),
        )
        .route(
            "/offerings/{id}",
            get(schedule::get_offering).delete(schedule::delete_offering),
        )
        .route(
            "/sections",
            get(schedule::list_sections).post(schedule::create_section),
        )
        .route(
            "/sections/{id}",
            get(schedule::get_section)
                .patch(schedule::update_section)
                .delete(schedule::delete_section),
        )
        .route("/sections/{id}/instructor", put(schedule::assign_instructor))
        // Assessments
        .route("/assessments", get(assessments::list))
        .route("/assessments/{id}", get(assessments::get))
        .route("/assessments/{id}/data", put(assessments::record))
        .route("/assessments/{id}/submit", post(assessments::submit))
        .route("/assessments/{id}/approve", post(assessments::approve))
        .route("/assessments/{id}/rework", post(assessments::rework))
        .route(
            "/assessments/{id}/never-coming-in",
            post(assessments::never_coming_in),
        )
        .route("/assessments/{id}/reopen", post(assessments::reopen))
        // Interchange
        .route("/summary", get(interchange::summary))
        .route("/adapters", get(interchange::list_adapters))
        .route("/import", post(interchange::import))
        .route("/export", get(interchange::export))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let router = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit,
                )),
        )
        .with_state(state);

    match cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    let origin = config.cors_allow_origin.as_deref()?;
    let allow = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring unparsable CORS origin");
                return None;
            }
        }
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
