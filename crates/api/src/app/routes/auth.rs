use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use registrar_auth::RegistrationForm;
use registrar_infra::ProfileChanges;

use crate::app::dto::{AuthResponse, LoginRequest, UpdateProfileRequest, UserResponse};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn protected_router() -> Router {
    Router::new().route("/auth/profile", get(get_profile).patch(update_profile))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegistrationForm>, JsonRejection>,
) -> axum::response::Response {
    let Json(form) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let user = match services.identity.register(form).await {
        Ok(u) => u,
        Err(e) => return errors::service_error_to_response(e),
    };
    let token = match services.identity.issue_token(&user) {
        Ok(t) => t,
        Err(e) => return errors::service_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from_user(&user),
            token,
        }),
    )
        .into_response()
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    match services.identity.login(&req.username, &req.password).await {
        Ok(outcome) => Json(AuthResponse {
            user: UserResponse::from_user(&outcome.user),
            token: outcome.token,
        })
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.ledger.total_debt(principal.user_id()).await {
        Ok(total) => Json(UserResponse::from_user(principal.user()).with_total_debt(total)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let changes = ProfileChanges {
        email: req.email,
        display_name: req.display_name,
    };
    match services
        .identity
        .update_profile(principal.user(), principal.user_id(), changes)
        .await
    {
        Ok(user) => Json(UserResponse::from_user(&user)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
