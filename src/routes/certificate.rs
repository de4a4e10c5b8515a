use askama::Template;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::learning::certificate::{self, CertificateArt};
use crate::learning::sequencer::ModuleSequencer;
use crate::routes::course::load_course_view;
use crate::routes::home::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/certificate.html")]
struct CertificateTemplate {
    course_id: String,
    recipient: String,
    course_title: String,
    issued_on: String,
    organization: String,
    approved: bool,
}

/// Verify the course is fully complete for this learner and return the
/// certificate row, issuing one if the completion happened out of band
/// (e.g. the final module has no test).
fn completed_certificate(
    state: &AppState,
    user: &CurrentUser,
    course_id: &str,
) -> AppResult<Option<(String, crate::db::models::Certificate)>> {
    let view = load_course_view(state, &user.id, course_id)?;
    if view.modules.is_empty() {
        return Err(AppError::NotFound);
    }

    let seq = ModuleSequencer::new(&view.modules, &view.tests, &view.records);
    if !seq.course_complete() {
        return Ok(None);
    }

    certificate::issue(&state.db, &user.id, course_id)?;
    let cert = certificate::find(&state.db, &user.id, course_id)?.ok_or(AppError::NotFound)?;
    Ok(Some((view.course.title, cert)))
}

async fn certificate_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<String>,
) -> AppResult<Response> {
    let Some((course_title, cert)) = completed_certificate(&state, &user, &course_id)? else {
        return Ok(Redirect::to(&format!("/course/{}", course_id)).into_response());
    };

    Ok(Html(CertificateTemplate {
        course_id,
        recipient: user.display_name().to_string(),
        course_title,
        issued_on: certificate::format_issue_date(&cert.issued_at),
        organization: state.config.certificate.organization.clone(),
        approved: cert.approved,
    })
    .into_response())
}

async fn certificate_download(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<String>,
) -> AppResult<Response> {
    let Some((course_title, cert)) = completed_certificate(&state, &user, &course_id)? else {
        return Ok(Redirect::to(&format!("/course/{}", course_id)).into_response());
    };

    let recipient = user.display_name().to_string();
    let art = CertificateArt {
        recipient: &recipient,
        course_title: &course_title,
        issued_on: &certificate::format_issue_date(&cert.issued_at),
        organization: &state.config.certificate.organization,
    };

    let Some(png) = certificate::render_png(&art, state.config.certificate.font_path.as_deref())?
    else {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            "Certificate rendering is unavailable: no TTF font found on this server",
        )
            .into_response());
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        certificate::download_filename(&recipient)
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        png,
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/course/{course_id}/certificate", get(certificate_page))
        .route(
            "/course/{course_id}/certificate/download",
            get(certificate_download),
        )
}
