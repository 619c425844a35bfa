use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use registrar_core::{FeeId, UserId};
use registrar_infra::{FeeChanges, NewFee};

use crate::app::dto::{CreateFeeRequest, FeeResponse, UpdateFeeRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_fees).post(create_fee))
        .route("/:id", get(get_fee).patch(update_fee).delete(delete_fee))
        .route("/:id/mark_paid", post(mark_paid))
        .route("/:id/mark_unpaid", post(mark_unpaid))
}

pub async fn list_fees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.ledger.list(principal.user()).await {
        Ok(fees) => Json(fees.iter().map(FeeResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_fee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateFeeRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let input = NewFee {
        owner: UserId::from(req.owner),
        description: req.description,
        amount: req.amount,
        due_date: req.due_date,
    };
    match services.ledger.create_fee(principal.user(), input).await {
        Ok(fee) => (StatusCode::CREATED, Json(FeeResponse::from(&fee))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_fee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: FeeId = match errors::parse_id(&id, "fee") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.ledger.get(principal.user(), id).await {
        Ok(fee) => Json(FeeResponse::from(&fee)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_fee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateFeeRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: FeeId = match errors::parse_id(&id, "fee") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let changes = FeeChanges {
        description: req.description,
        amount: req.amount,
        due_date: req.due_date,
    };
    match services.ledger.edit_fee(principal.user(), id, changes).await {
        Ok(fee) => Json(FeeResponse::from(&fee)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_fee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: FeeId = match errors::parse_id(&id, "fee") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.ledger.delete_fee(principal.user(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: FeeId = match errors::parse_id(&id, "fee") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.ledger.set_paid(principal.user(), id, true).await {
        Ok(fee) => Json(FeeResponse::from(&fee)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn mark_unpaid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: FeeId = match errors::parse_id(&id, "fee") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.ledger.set_paid(principal.user(), id, false).await {
        Ok(fee) => Json(FeeResponse::from(&fee)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
