use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(handlers::login_page))
        .route("/auth/login", post(handlers::login))
        .route("/auth/signup", get(handlers::signup_page))
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/logout", post(handlers::logout))
        .route("/admin/login", get(handlers::admin_login_page))
        .route("/admin/login", post(handlers::admin_login))
        .route("/admin/setup", post(handlers::admin_setup))
}
