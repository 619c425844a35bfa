use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use uuid::Uuid;

use registrar_core::DomainError;
use registrar_infra::{ContentError, ServiceError};

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    if !err.is_client_error() {
        tracing::error!(error = %err, "request failed");
    }

    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Denied(denial) => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "permission_denied",
                "reason": denial.kind,
                "message": denial.message,
            })),
        )
            .into_response(),
        ServiceError::Token(e) => json_error(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string()),
        ServiceError::Content(ContentError::InvalidKey(key)) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_content_key", key)
        }
        ServiceError::Content(ContentError::NotFound(_)) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "content_missing",
            "stored content for this document is missing",
        ),
        ServiceError::Content(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "content_error",
            "failed to access document content",
        ),
        ServiceError::Store(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            "storage backend failure",
        ),
    }
}

fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::PermissionDenied(msg) => json_error(StatusCode::FORBIDDEN, "permission_denied", msg),
        DomainError::Unauthenticated => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "invalid credentials",
        ),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Body that failed to parse as the expected JSON shape.
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn parse_id<T: From<Uuid>>(raw: &str, what: &'static str) -> Result<T, axum::response::Response> {
    Uuid::parse_str(raw).map(T::from).map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("'{raw}' is not a valid {what} id"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use registrar_core::UserId;
    use registrar_policy::Denial;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("fee"), StatusCode::NOT_FOUND),
            (DomainError::conflict("stale"), StatusCode::CONFLICT),
            (DomainError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (DomainError::permission_denied("no"), StatusCode::FORBIDDEN),
            (DomainError::invariant("x"), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, status) in cases {
            assert_eq!(service_error_to_response(err.into()).status(), status);
        }
    }

    #[test]
    fn denials_are_forbidden() {
        let res = service_error_to_response(Denial::outstanding_fees().into());
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id::<UserId>("not-a-uuid", "user").is_err());
        let id = UserId::new();
        assert_eq!(parse_id::<UserId>(&id.to_string(), "user").ok(), Some(id));
    }
}
