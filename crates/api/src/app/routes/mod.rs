use axum::Router;

pub mod auth;
pub mod documents;
pub mod fees;
pub mod system;
pub mod users;

/// Endpoints that need no token.
pub fn public_router() -> Router {
    auth::public_router()
}

/// Endpoints behind the bearer-token middleware.
pub fn protected_router() -> Router {
    Router::new()
        .merge(auth::protected_router())
        .nest("/users", users::router())
        .nest("/fees", fees::router())
        .nest("/documents", documents::router())
}
