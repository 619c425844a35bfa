use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use registrar_core::UserId;

use crate::app::dto::{ChangeRoleRequest, DocumentResponse, FeeResponse, UserResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user).delete(delete_user))
        .route("/:id/role", put(change_role))
        .route("/:id/fees", get(list_user_fees))
        .route("/:id/documents", get(list_user_documents))
        .route("/:id/debt", get(debt_summary))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.identity.list(principal.user()).await {
        Ok(users) => {
            let body: Vec<UserResponse> = users.iter().map(UserResponse::from_user).collect();
            Json(body).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

/// User detail, including the live unpaid total.
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let user = match services.identity.get(principal.user(), id).await {
        Ok(u) => u,
        Err(e) => return errors::service_error_to_response(e),
    };
    match services.ledger.total_debt(id).await {
        Ok(total) => Json(UserResponse::from_user(&user).with_total_debt(total)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    match services.identity.change_role(principal.user(), id, req.role).await {
        Ok(user) => Json(UserResponse::from_user(&user)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.identity.delete_user(principal.user(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_user_fees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.ledger.list_for_owner(principal.user(), id).await {
        Ok(fees) => Json(fees.iter().map(FeeResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_user_documents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.registry.list_for_owner(principal.user(), id).await {
        Ok(docs) => Json(docs.iter().map(DocumentResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn debt_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.ledger.debt_summary(principal.user(), id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
