//! Authentication and rate limiting.

use super::{ApiError, AppState};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use registrar_core::RegistrarError;
use std::sync::Arc;

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Resolve the bearer token to an [`Actor`](registrar_core::Actor) and put
/// it in the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        tracing::warn!(path = %request.uri().path(), "missing bearer token");
        return Err(RegistrarError::Unauthenticated.into());
    };

    let actor = {
        let registrar = state.registrar.read().await;
        let mut tokens = state.tokens.lock().await;
        registrar.authenticate_cached(&token, &mut tokens)
    };
    match actor {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            Ok(next.run(request).await)
        }
        Err(err) => {
            tracing::warn!(path = %request.uri().path(), error = %err, "authentication failed");
            Err(err.into())
        }
    }
}

/// Refuse requests past the configured rate with 429.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.admit() {
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_bearer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer reg_abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("reg_abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
