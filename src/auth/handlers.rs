use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::params;
use rusqlite::OptionalExtension;
use serde::Deserialize;

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/admin_login.html")]
pub struct AdminLoginTemplate {
    pub error: Option<String>,
    pub needs_setup: bool,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

pub fn get_cookie_value<'a>(parts: &'a axum::http::request::Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}

fn login_response(state: &AppState, token: &str, to: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, to.to_string()),
            (
                header::SET_COOKIE,
                session_cookie(
                    &state.config.auth.cookie_name,
                    token,
                    state.config.auth.session_hours,
                ),
            ),
        ],
        "",
    )
        .into_response()
}

/// Look up a user's id and password hash by email.
fn find_user(state: &AppState, email: &str) -> AppResult<Option<(String, String)>> {
    let conn = state.db.get()?;
    let row = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?1",
            params![email.trim().to_lowercase()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

fn has_role(state: &AppState, user_id: &str, role: &str) -> AppResult<bool> {
    let conn = state.db.get()?;
    let present: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM user_roles WHERE user_id = ?1 AND role = ?2",
        params![user_id, role],
        |row| row.get(0),
    )?;
    Ok(present)
}

fn insert_user(state: &AppState, form: &SignupForm) -> AppResult<String> {
    let email = form.email.trim().to_lowercase();
    let full_name = form.full_name.trim();
    if email.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".into()));
    }

    let hash = bcrypt::hash(&form.password, bcrypt::DEFAULT_COST)?;
    let user_id = uuid::Uuid::now_v7().to_string();

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO users (id, email, full_name, password_hash) VALUES (?1, ?2, ?3, ?4)",
        params![
            user_id,
            email,
            (!full_name.is_empty()).then_some(full_name),
            hash
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::BadRequest("An account with this email already exists".into())
        }
        other => AppError::Database(other),
    })?;

    Ok(user_id)
}

// -- Learner handlers --

/// GET /auth/login
pub async fn login_page(maybe_user: MaybeUser) -> Response {
    if maybe_user.0.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    Html(LoginTemplate { error: None }).into_response()
}

/// POST /auth/login — credential-pair sign-in
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let Some((user_id, hash)) = find_user(&state, &form.email)? else {
        return Ok(Html(LoginTemplate {
            error: Some("Invalid email or password".into()),
        })
        .into_response());
    };

    if !bcrypt::verify(&form.password, &hash)? {
        return Ok(Html(LoginTemplate {
            error: Some("Invalid email or password".into()),
        })
        .into_response());
    }

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    Ok(login_response(&state, &token, "/dashboard"))
}

/// GET /auth/signup
pub async fn signup_page(maybe_user: MaybeUser) -> Response {
    if maybe_user.0.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    Html(SignupTemplate { error: None }).into_response()
}

/// POST /auth/signup — create account and sign in
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let user_id = match insert_user(&state, &form) {
        Ok(id) => id,
        Err(AppError::BadRequest(msg)) => {
            return Ok(Html(SignupTemplate { error: Some(msg) }).into_response());
        }
        Err(e) => return Err(e),
    };

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    Ok(login_response(&state, &token, "/dashboard"))
}

// -- Admin handlers --

fn admin_exists(state: &AppState) -> AppResult<bool> {
    let conn = state.db.get()?;
    let present: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM user_roles WHERE role = 'admin'",
        [],
        |row| row.get(0),
    )?;
    Ok(present)
}

/// GET /admin/login — offers first-run setup until an admin exists
pub async fn admin_login_page(State(state): State<AppState>) -> AppResult<Response> {
    Ok(Html(AdminLoginTemplate {
        error: None,
        needs_setup: !admin_exists(&state)?,
    })
    .into_response())
}

/// POST /admin/login — credential check, then role lookup. A valid
/// credential pair without the admin role does not get a session.
pub async fn admin_login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let needs_setup = !admin_exists(&state)?;
    let refuse = |msg: &str| {
        Html(AdminLoginTemplate {
            error: Some(msg.to_string()),
            needs_setup,
        })
        .into_response()
    };

    let Some((user_id, hash)) = find_user(&state, &form.email)? else {
        return Ok(refuse("Invalid admin credentials"));
    };
    if !bcrypt::verify(&form.password, &hash)? {
        return Ok(refuse("Invalid admin credentials"));
    }
    if !has_role(&state, &user_id, "admin")? {
        return Ok(refuse("Access denied. Admin privileges required."));
    }

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    Ok(login_response(&state, &token, "/admin"))
}

/// POST /admin/setup — create the first admin account. Rejected once
/// any admin exists.
pub async fn admin_setup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    if admin_exists(&state)? {
        return Err(AppError::BadRequest("Admin account already exists".into()));
    }

    let user_id = match insert_user(&state, &form) {
        Ok(id) => id,
        Err(AppError::BadRequest(msg)) => {
            return Ok(Html(AdminLoginTemplate {
                error: Some(msg),
                needs_setup: true,
            })
            .into_response());
        }
        Err(e) => return Err(e),
    };

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO user_roles (user_id, role) VALUES (?1, 'admin')",
        params![user_id],
    )?;
    drop(conn);

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    Ok(login_response(&state, &token, "/admin"))
}

// -- Logout handler --

/// POST /auth/logout — delete session and redirect
pub async fn logout(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();

    if let Some(token) = get_cookie_value(&parts, &state.config.auth.cookie_name) {
        let _ = session::delete_session(&state.db, token);
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                clear_session_cookie(&state.config.auth.cookie_name),
            ),
        ],
        "",
    )
        .into_response())
}
