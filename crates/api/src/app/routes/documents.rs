use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use registrar_core::DocumentId;
use registrar_infra::{DocumentChanges, NewDocument};

use crate::app::dto::{DocumentResponse, UpdateDocumentRequest, UploadDocumentRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_documents).post(upload_document))
        .route(
            "/:id",
            get(get_document).patch(update_document).delete(delete_document),
        )
        .route("/:id/download", get(download_document))
        .route("/:id/verify", post(verify_document))
        .route("/:id/unverify", post(unverify_document))
}

pub async fn list_documents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.registry.list(principal.user()).await {
        Ok(docs) => Json(docs.iter().map(DocumentResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn upload_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<UploadDocumentRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let input = NewDocument {
        title: req.title,
        document_type: req.document_type,
        filename: req.filename,
        bytes: req.content,
    };
    match services.registry.upload(principal.user(), input).await {
        Ok(doc) => (StatusCode::CREATED, Json(DocumentResponse::from(&doc))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DocumentId = match errors::parse_id(&id, "document") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.registry.get(principal.user(), id).await {
        Ok(doc) => Json(DocumentResponse::from(&doc)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateDocumentRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: DocumentId = match errors::parse_id(&id, "document") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection(e),
    };

    let changes = DocumentChanges {
        title: req.title,
        document_type: req.document_type,
    };
    match services.registry.retitle(principal.user(), id, changes).await {
        Ok(doc) => Json(DocumentResponse::from(&doc)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DocumentId = match errors::parse_id(&id, "document") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.registry.delete(principal.user(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn download_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DocumentId = match errors::parse_id(&id, "document") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let download = match services.registry.download(principal.user(), id).await {
        Ok(d) => d,
        Err(e) => return errors::service_error_to_response(e),
    };

    let disposition = format!("attachment; filename=\"{}\"", header_safe_filename(&download.filename));
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response()
}

pub async fn verify_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DocumentId = match errors::parse_id(&id, "document") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.registry.verify(principal.user(), id).await {
        Ok(doc) => Json(DocumentResponse::from(&doc)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn unverify_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DocumentId = match errors::parse_id(&id, "document") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.registry.unverify(principal.user(), id).await {
        Ok(doc) => Json(DocumentResponse::from(&doc)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Printable ASCII only, without quotes or backslashes.
fn header_safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}
