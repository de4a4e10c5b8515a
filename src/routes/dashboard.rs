use askama::Template;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;

use crate::db::models::Course;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::learning::progress;
use crate::routes::home::Html;
use crate::state::AppState;

pub struct CourseCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration_hours: i64,
    pub total_modules: usize,
    pub completed_modules: usize,
    pub percent: u32,
    pub complete: bool,
}

/// Derived achievement badges (dashboard flourish from the original).
pub struct Achievements {
    pub first_module: bool,
    pub halfway: bool,
    pub course_complete: bool,
    pub high_scorer: bool,
}

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
struct DashboardTemplate {
    name: String,
    is_admin: bool,
    courses: Vec<CourseCard>,
    achievements: Achievements,
}

/// Course catalog with per-course aggregate progress.
async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let courses: Vec<Course> = {
        let conn = state.db.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, duration_hours, created_at \
             FROM courses ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map([], Course::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let module_counts: HashMap<String, usize> = {
        let conn = state.db.get()?;
        let mut stmt = conn.prepare("SELECT course_id, COUNT(*) FROM modules GROUP BY course_id")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        counts
    };

    let records = progress::load_all_progress(&state.db, &user.id)?;

    let mut completed_per_course: HashMap<&str, usize> = HashMap::new();
    for record in records.iter().filter(|r| r.completed_at.is_some()) {
        *completed_per_course.entry(record.course_id.as_str()).or_default() += 1;
    }

    let cards: Vec<CourseCard> = courses
        .into_iter()
        .map(|course| {
            let total = module_counts.get(&course.id).copied().unwrap_or(0);
            let completed = completed_per_course
                .get(course.id.as_str())
                .copied()
                .unwrap_or(0)
                .min(total);
            let percent = if total == 0 {
                0
            } else {
                ((100.0 * completed as f64) / total as f64).round() as u32
            };
            CourseCard {
                id: course.id,
                title: course.title,
                description: course.description,
                duration_hours: course.duration_hours,
                total_modules: total,
                completed_modules: completed,
                percent,
                complete: total > 0 && completed == total,
            }
        })
        .collect();

    let total_completed: usize = completed_per_course.values().sum();
    let total_modules: usize = module_counts.values().sum();
    let achievements = Achievements {
        first_module: total_completed > 0,
        halfway: total_modules > 0 && total_completed * 2 >= total_modules,
        course_complete: cards.iter().any(|c| c.complete),
        high_scorer: records
            .iter()
            .any(|r| r.test_score.map(|s| s >= 90).unwrap_or(false)),
    };

    Ok(Html(DashboardTemplate {
        name: user.display_name().to_string(),
        is_admin: user.is_admin,
        courses: cards,
        achievements,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}
