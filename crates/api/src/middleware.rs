use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use registrar_core::DomainError;
use registrar_infra::ServiceError;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
}

/// Resolve the bearer token to a stored user and attach it to the request.
///
/// A token whose user no longer exists is treated like a bad token; a store
/// failure during the lookup is reported as a server error.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "missing or malformed bearer token",
        );
    };

    let user = match state.services.identity.authenticate(token).await {
        Ok(user) => user,
        Err(e @ (ServiceError::Token(_) | ServiceError::Domain(DomainError::Unauthenticated))) => {
            tracing::debug!(error = %e, "token rejected");
            return errors::json_error(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "invalid or expired token",
            );
        }
        Err(e) => return errors::service_error_to_response(e),
    };

    req.extensions_mut().insert(PrincipalContext::new(user));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
        assert_eq!(extract_bearer(&headers("Basic dXNlcg==")), None);
        assert_eq!(extract_bearer(&headers("Bearer   ")), None);
    }
}
