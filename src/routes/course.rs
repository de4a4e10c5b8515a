use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use rusqlite::params;
use rusqlite::OptionalExtension;
use serde::Deserialize;

use crate::db::models::{ContentBlock, Course, Module, ProgressRecord, Test};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::learning::progress;
use crate::learning::sequencer::ModuleSequencer;
use crate::routes::home::Html;
use crate::state::AppState;

// -- Shared loaders (also used by the test and certificate routes) --

pub fn load_course(state: &AppState, course_id: &str) -> AppResult<Course> {
    let conn = state.db.get()?;
    conn.query_row(
        "SELECT id, title, description, duration_hours, created_at FROM courses WHERE id = ?1",
        params![course_id],
        Course::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Modules of a course in traversal order.
pub fn load_modules(state: &AppState, course_id: &str) -> AppResult<Vec<Module>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, course_id, title, description, content, order_index \
         FROM modules WHERE course_id = ?1 ORDER BY order_index ASC",
    )?;
    let modules = stmt
        .query_map(params![course_id], Module::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(modules)
}

pub fn load_tests(state: &AppState, course_id: &str) -> AppResult<Vec<Test>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT t.id, t.module_id, t.title, t.questions, t.passing_score \
         FROM tests t JOIN modules m ON m.id = t.module_id \
         WHERE m.course_id = ?1",
    )?;
    let tests = stmt
        .query_map(params![course_id], Test::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tests)
}

pub struct CourseView {
    pub course: Course,
    pub modules: Vec<Module>,
    pub tests: Vec<Test>,
    pub records: Vec<ProgressRecord>,
}

pub fn load_course_view(state: &AppState, user_id: &str, course_id: &str) -> AppResult<CourseView> {
    let course = load_course(state, course_id)?;
    let modules = load_modules(state, course_id)?;
    let tests = load_tests(state, course_id)?;
    let records = progress::load_progress(&state.db, user_id, course_id)?;
    Ok(CourseView {
        course,
        modules,
        tests,
        records,
    })
}

// -- Course player --

#[derive(Template)]
#[template(path = "pages/course.html")]
struct CourseTemplate {
    course_id: String,
    course_title: String,
    module_id: String,
    module_title: String,
    module_description: String,
    blocks: Vec<ContentBlock>,
    module_number: usize,
    total_modules: usize,
    percent: u32,
    completed: bool,
    has_test: bool,
    has_score: bool,
    score_value: i64,
    show_prev: bool,
    prev_index: usize,
    show_next: bool,
    next_index: usize,
    show_certificate: bool,
    notice: Option<String>,
    notice_error: bool,
}

#[derive(Deserialize)]
struct PlayerQuery {
    /// Requested module position; clamped to the furthest unlocked one.
    m: Option<usize>,
    result: Option<String>,
    score: Option<u32>,
}

async fn course_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<String>,
    Query(query): Query<PlayerQuery>,
) -> AppResult<Response> {
    let view = load_course_view(&state, &user.id, &course_id)?;
    if view.modules.is_empty() {
        return Err(AppError::NotFound);
    }

    let seq = ModuleSequencer::new(&view.modules, &view.tests, &view.records);

    // Navigating backward is always fine; forward only as far as the
    // sequencer unlocks.
    let mut index = query.m.unwrap_or_else(|| seq.current_index());
    index = index.min(view.modules.len() - 1);
    if !seq.is_unlocked(index) {
        index = seq.current_index();
    }

    let module = &view.modules[index];
    let test = seq.test_for(&module.id);
    let score = seq.test_score(&module.id);

    let (notice, notice_error) = match (query.result.as_deref(), query.score) {
        (Some("passed"), Some(s)) => (Some(format!("Test passed! You scored {}%.", s)), false),
        (Some("failed"), Some(s)) => (
            Some(format!(
                "You scored {}%. You need {}% to pass. You can retake the test anytime.",
                s,
                test.map(|t| t.passing_score).unwrap_or(0)
            )),
            true,
        ),
        _ => (None, false),
    };

    Ok(Html(CourseTemplate {
        course_id: view.course.id.clone(),
        course_title: view.course.title.clone(),
        module_id: module.id.clone(),
        module_title: module.title.clone(),
        module_description: module.description.clone(),
        blocks: module.content_blocks(),
        module_number: index + 1,
        total_modules: view.modules.len(),
        percent: seq.percent_complete(),
        completed: seq.is_completed(&module.id),
        has_test: test.is_some(),
        has_score: score.is_some(),
        score_value: score.unwrap_or(0),
        show_prev: index > 0,
        prev_index: index.saturating_sub(1),
        show_next: seq.can_advance_from(index),
        next_index: index + 1,
        show_certificate: seq.course_complete(),
        notice,
        notice_error,
    })
    .into_response())
}

/// Mark a module complete. For untested modules this is what unlocks
/// the successor; the progress write is awaited before redirecting.
async fn mark_complete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, module_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let modules = load_modules(&state, &course_id)?;
    let index = modules
        .iter()
        .position(|m| m.id == module_id)
        .ok_or(AppError::NotFound)?;

    let tests = load_tests(&state, &course_id)?;
    let records = progress::load_progress(&state.db, &user.id, &course_id)?;
    let seq = ModuleSequencer::new(&modules, &tests, &records);
    if !seq.is_unlocked(index) {
        return Err(AppError::BadRequest("Module is locked".into()));
    }

    progress::mark_complete(&state.db, &user.id, &course_id, &module_id)?;
    Ok(Redirect::to(&format!("/course/{}?m={}", course_id, index)).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/course/{course_id}", get(course_page))
        .route(
            "/course/{course_id}/module/{module_id}/complete",
            post(mark_complete),
        )
}
