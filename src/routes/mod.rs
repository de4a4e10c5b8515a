use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod assets;
pub mod auth;
pub mod certificate;
pub mod course;
pub mod dashboard;
pub mod home;

/// Every portal route, without middleware. The binary layers tracing
/// on top; tests can mount this directly.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(course::router())
        .merge(test::router())
        .merge(certificate::router())
        .merge(admin::router())
}
