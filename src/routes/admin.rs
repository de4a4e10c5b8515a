use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Form, Router};
use rusqlite::params;
use serde::Deserialize;

use crate::db::models::{ContentBlock, Question};
use crate::error::{AppError, AppResult};
use crate::extractors::AdminUser;
use crate::learning::certificate::{self, CertificateListing};
use crate::routes::course::{load_course, load_modules, load_tests};
use crate::routes::home::Html;
use crate::state::AppState;

/// Validation failures travel as short codes in the redirect query and
/// are expanded on the next render.
fn error_message(code: &str) -> String {
    match code {
        "missing_fields" => "Title and description are required".into(),
        "missing_title" => "A title is required".into(),
        "bad_content" => "Content must be a JSON list of content blocks".into(),
        "bad_questions" => {
            "Questions must be a JSON list with options and a valid correct index".into()
        }
        "no_questions" => "A test needs at least one question".into(),
        "bad_passing" => "Passing score must be between 0 and 100".into(),
        "duplicate_test" => "This module already has a test".into(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct ConsoleQuery {
    error: Option<String>,
}

// -- Console overview --

struct CourseRow {
    id: String,
    title: String,
    description: String,
    duration_hours: i64,
    module_count: i64,
}

struct CertificateRow {
    id: String,
    recipient: String,
    email: String,
    course_title: String,
    issued_on: String,
    approved: bool,
}

#[derive(Template)]
#[template(path = "pages/admin.html")]
struct AdminTemplate {
    admin_name: String,
    courses: Vec<CourseRow>,
    certificates: Vec<CertificateRow>,
    error: Option<String>,
}

async fn console(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<ConsoleQuery>,
) -> AppResult<impl IntoResponse> {
    let courses = {
        let conn = state.db.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.title, c.description, c.duration_hours, \
             (SELECT COUNT(*) FROM modules m WHERE m.course_id = c.id) \
             FROM courses c ORDER BY c.created_at ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CourseRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    duration_hours: row.get(3)?,
                    module_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let certificates = certificate::list_all(&state.db)?
        .into_iter()
        .map(|c: CertificateListing| CertificateRow {
            id: c.id,
            recipient: c.recipient,
            email: c.email,
            course_title: c.course_title,
            issued_on: certificate::format_issue_date(&c.issued_at),
            approved: c.approved,
        })
        .collect();

    Ok(Html(AdminTemplate {
        admin_name: admin.0.display_name().to_string(),
        courses,
        certificates,
        error: query.error.as_deref().map(error_message),
    }))
}

// -- Courses --

#[derive(Deserialize)]
struct CourseForm {
    title: String,
    description: String,
    duration_hours: Option<i64>,
}

async fn create_course(
    State(state): State<AppState>,
    admin: AdminUser,
    Form(form): Form<CourseForm>,
) -> AppResult<Redirect> {
    let title = form.title.trim();
    let description = form.description.trim();
    // Validate before touching the database; a bad form writes nothing
    if title.is_empty() || description.is_empty() {
        return Ok(Redirect::to("/admin?error=missing_fields"));
    }

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO courses (id, title, description, duration_hours, created_by) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::now_v7().to_string(),
            title,
            description,
            form.duration_hours.unwrap_or(0).max(0),
            admin.0.id,
        ],
    )?;
    Ok(Redirect::to("/admin"))
}

async fn delete_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    // Modules, tests, progress and certificates go with it (cascades)
    conn.execute("DELETE FROM courses WHERE id = ?1", params![course_id])?;
    Ok(Redirect::to("/admin"))
}

// -- Course builder --

struct BuilderModuleRow {
    id: String,
    title: String,
    description: String,
    position: usize,
    block_count: usize,
    has_test: bool,
    test_id: String,
    test_title: String,
    question_count: usize,
    passing_score: i64,
}

#[derive(Template)]
#[template(path = "pages/course_builder.html")]
struct CourseBuilderTemplate {
    course_id: String,
    course_title: String,
    modules: Vec<BuilderModuleRow>,
    error: Option<String>,
}

async fn course_builder(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<String>,
    Query(query): Query<ConsoleQuery>,
) -> AppResult<impl IntoResponse> {
    let course = load_course(&state, &course_id)?;
    let modules = load_modules(&state, &course_id)?;
    let tests = load_tests(&state, &course_id)?;

    let rows = modules
        .iter()
        .enumerate()
        .map(|(i, module)| {
            let test = tests.iter().find(|t| t.module_id == module.id);
            BuilderModuleRow {
                id: module.id.clone(),
                title: module.title.clone(),
                description: module.description.clone(),
                position: i + 1,
                block_count: module.content_blocks().len(),
                has_test: test.is_some(),
                test_id: test.map(|t| t.id.clone()).unwrap_or_default(),
                test_title: test.map(|t| t.title.clone()).unwrap_or_default(),
                question_count: test.map(|t| t.question_list().len()).unwrap_or(0),
                passing_score: test.map(|t| t.passing_score).unwrap_or(0),
            }
        })
        .collect();

    Ok(Html(CourseBuilderTemplate {
        course_id: course.id,
        course_title: course.title,
        modules: rows,
        error: query.error.as_deref().map(error_message),
    }))
}

// -- Modules --

#[derive(Deserialize)]
struct ModuleForm {
    title: String,
    description: String,
    content: String,
}

async fn create_module(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<String>,
    Form(form): Form<ModuleForm>,
) -> AppResult<Redirect> {
    let back = format!("/admin/courses/{}", course_id);

    let title = form.title.trim();
    if title.is_empty() {
        return Ok(Redirect::to(&format!("{}?error=missing_title", back)));
    }

    let content = form.content.trim();
    let content = if content.is_empty() {
        "[]".to_string()
    } else {
        // The payload must decode as content blocks; stored verbatim
        match serde_json::from_str::<Vec<ContentBlock>>(content) {
            Ok(_) => content.to_string(),
            Err(_) => return Ok(Redirect::to(&format!("{}?error=bad_content", back))),
        }
    };

    let conn = state.db.get()?;
    // MAX+1 keeps the position unique even after deletions in the middle
    conn.execute(
        "INSERT INTO modules (id, course_id, title, description, content, order_index) \
         VALUES (?1, ?2, ?3, ?4, ?5, \
                 (SELECT COALESCE(MAX(order_index) + 1, 0) FROM modules WHERE course_id = ?2))",
        params![
            uuid::Uuid::now_v7().to_string(),
            course_id,
            title,
            form.description.trim(),
            content,
        ],
    )?;
    Ok(Redirect::to(&back))
}

async fn delete_module(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(module_id): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let course_id: Option<String> = {
        use rusqlite::OptionalExtension;
        conn.query_row(
            "SELECT course_id FROM modules WHERE id = ?1",
            params![module_id],
            |row| row.get(0),
        )
        .optional()?
    };
    conn.execute("DELETE FROM modules WHERE id = ?1", params![module_id])?;
    Ok(match course_id {
        Some(id) => Redirect::to(&format!("/admin/courses/{}", id)),
        None => Redirect::to("/admin"),
    })
}

// -- Tests --

#[derive(Deserialize)]
struct TestForm {
    title: String,
    questions: String,
    passing_score: i64,
}

async fn create_test(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(module_id): Path<String>,
    Form(form): Form<TestForm>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let course_id: String = {
        use rusqlite::OptionalExtension;
        conn.query_row(
            "SELECT course_id FROM modules WHERE id = ?1",
            params![module_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(AppError::NotFound)?
    };
    let back = format!("/admin/courses/{}", course_id);

    let title = form.title.trim();
    if title.is_empty() {
        return Ok(Redirect::to(&format!("{}?error=missing_title", back)));
    }
    if !(0..=100).contains(&form.passing_score) {
        return Ok(Redirect::to(&format!("{}?error=bad_passing", back)));
    }
    let questions = match serde_json::from_str::<Vec<Question>>(form.questions.trim()) {
        Ok(list) if list.iter().all(Question::is_valid) => list,
        _ => return Ok(Redirect::to(&format!("{}?error=bad_questions", back))),
    };
    // An empty test could never be passed; refuse to create one
    if questions.is_empty() {
        return Ok(Redirect::to(&format!("{}?error=no_questions", back)));
    }

    let result = conn.execute(
        "INSERT INTO tests (id, module_id, title, questions, passing_score) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::now_v7().to_string(),
            module_id,
            title,
            serde_json::to_string(&questions)?,
            form.passing_score,
        ],
    );
    match result {
        Ok(_) => Ok(Redirect::to(&back)),
        // The UNIQUE module_id constraint: one test per module
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(Redirect::to(&format!("{}?error=duplicate_test", back)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete_test(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(test_id): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let course_id: Option<String> = {
        use rusqlite::OptionalExtension;
        conn.query_row(
            "SELECT m.course_id FROM tests t JOIN modules m ON m.id = t.module_id \
             WHERE t.id = ?1",
            params![test_id],
            |row| row.get(0),
        )
        .optional()?
    };
    conn.execute("DELETE FROM tests WHERE id = ?1", params![test_id])?;
    Ok(match course_id {
        Some(id) => Redirect::to(&format!("/admin/courses/{}", id)),
        None => Redirect::to("/admin"),
    })
}

// -- Certificates --

async fn approve_certificate(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(certificate_id): Path<String>,
) -> AppResult<Redirect> {
    certificate::approve(&state.db, &certificate_id, &admin.0.id)?;
    Ok(Redirect::to("/admin"))
}

async fn reject_certificate(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(certificate_id): Path<String>,
) -> AppResult<Redirect> {
    certificate::reject(&state.db, &certificate_id)?;
    Ok(Redirect::to("/admin"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(console))
        .route("/admin/courses", post(create_course))
        .route("/admin/courses/{course_id}", get(course_builder))
        .route("/admin/courses/{course_id}/delete", post(delete_course))
        .route("/admin/courses/{course_id}/modules", post(create_module))
        .route("/admin/modules/{module_id}/delete", post(delete_module))
        .route("/admin/modules/{module_id}/tests", post(create_test))
        .route("/admin/tests/{test_id}/delete", post(delete_test))
        .route(
            "/admin/certificates/{certificate_id}/approve",
            post(approve_certificate),
        )
        .route(
            "/admin/certificates/{certificate_id}/reject",
            post(reject_certificate),
        )
}
