use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use academy::auth::session;
use academy::config::Config;
use academy::db;
use academy::routes;
use academy::state::{AppState, DbPool};

fn portal() -> (Router, DbPool) {
    let pool = db::create_memory_pool().expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    let state = AppState {
        db: pool.clone(),
        config: Config::default(),
    };
    (routes::router().with_state(state), pool)
}

/// Course with two modules: the first is plain content, the second has
/// a three-question test that passes at 70%.
fn seed_course(pool: &DbPool) {
    let conn = pool.get().unwrap();
    conn.execute_batch(
        r#"
        INSERT INTO courses (id, title, description, duration_hours)
            VALUES ('c1', 'Production Basics', 'Intro course', 2);
        INSERT INTO modules (id, course_id, title, description, content, order_index)
            VALUES ('m1', 'c1', 'Getting Started', 'First steps',
                    '[{"type": "text", "data": "Welcome."}]', 0);
        INSERT INTO modules (id, course_id, title, description, content, order_index)
            VALUES ('m2', 'c1', 'Safety Rules', 'Know the rules',
                    '[{"type": "list", "data": ["Rule one", "Rule two"]}]', 1);
        INSERT INTO tests (id, module_id, title, questions, passing_score)
            VALUES ('t2', 'm2', 'Safety Check',
                    '[{"question": "Q1", "options": ["a", "b", "c"], "correct": 0},
                      {"question": "Q2", "options": ["a", "b", "c"], "correct": 1},
                      {"question": "Q3", "options": ["a", "b", "c"], "correct": 2}]',
                    70);
        "#,
    )
    .unwrap();
}

fn seed_learner(pool: &DbPool) -> String {
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO users (id, email, full_name, password_hash) \
         VALUES ('u1', 'jane@example.com', 'Jane Doe', 'unusable')",
        [],
    )
    .unwrap();
    drop(conn);
    session::create_session(pool, "u1", 24).unwrap()
}

async fn get(app: &Router, path: &str, token: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .header(header::COOKIE, format!("academy_session={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_form(app: &Router, path: &str, token: &str, form: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::COOKIE, format!("academy_session={}", token))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Expected a redirect Location header")
        .to_str()
        .unwrap()
}

fn certificate_count(pool: &DbPool) -> i64 {
    pool.get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM certificates", [], |r| r.get(0))
        .unwrap()
}

#[tokio::test]
async fn anonymous_requests_are_rejected() {
    let (app, pool) = portal();
    seed_course(&pool);

    let response = get(&app, "/course/c1", "bogus-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dashboard_lists_courses_with_progress() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    let response = get(&app, "/dashboard", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Jane Doe"));
    assert!(body.contains("Production Basics"));
    assert!(body.contains("0 of 2 modules"));

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;

    let response = get(&app, "/dashboard", &token).await;
    let body = body_text(response).await;
    assert!(body.contains("1 of 2 modules"));
    assert!(body.contains("First module done"));
}

#[tokio::test]
async fn locked_module_request_falls_back_to_furthest_unlocked() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    // Nothing is complete yet, so asking for module 2 shows module 1
    let response = get(&app, "/course/c1?m=1", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Getting Started"));
    assert!(!body.contains("Safety Rules"));
}

#[tokio::test]
async fn completing_a_module_unlocks_the_next() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    let response = post_form(&app, "/course/c1/module/m1/complete", &token, "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = get(&app, "/course/c1?m=1", &token).await;
    let body = body_text(response).await;
    assert!(body.contains("Safety Rules"));
}

#[tokio::test]
async fn test_cannot_start_before_module_is_complete() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;

    // Module 2 is unlocked but not yet marked complete
    let response = get(&app, "/course/c1/test/m2", &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn next_is_refused_until_a_choice_is_made() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;
    post_form(&app, "/course/c1/module/m2/complete", &token, "").await;

    let response = post_form(
        &app,
        "/course/c1/test/m2",
        &token,
        "q=0&answers=&action=next",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Select an answer to continue"));
    assert!(body.contains("Q1")); // still on the first question
}

#[tokio::test]
async fn failing_score_records_but_issues_no_certificate() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;
    post_form(&app, "/course/c1/module/m2/complete", &token, "").await;

    // Walk the test answering 2 of 3 correctly
    post_form(&app, "/course/c1/test/m2", &token, "q=0&answers=&choice=0&action=next").await;
    post_form(&app, "/course/c1/test/m2", &token, "q=1&answers=0:0&choice=1&action=next").await;
    let response = post_form(
        &app,
        "/course/c1/test/m2",
        &token,
        "q=2&answers=0:0,1:1&choice=0&action=submit",
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/course/c1?result=failed&score=67");
    assert_eq!(certificate_count(&pool), 0);

    // The score is stored for the retake banner
    let score: i64 = pool
        .get()
        .unwrap()
        .query_row(
            "SELECT test_score FROM user_progress WHERE user_id = 'u1' AND module_id = 'm2'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(score, 67);

    // The certificate page refuses to render for an incomplete course
    let response = get(&app, "/course/c1/certificate", &token).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/course/c1");
}

#[tokio::test]
async fn passing_the_final_test_completes_the_course() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;
    post_form(&app, "/course/c1/module/m2/complete", &token, "").await;

    post_form(&app, "/course/c1/test/m2", &token, "q=0&answers=&choice=0&action=next").await;
    post_form(&app, "/course/c1/test/m2", &token, "q=1&answers=0:0&choice=1&action=next").await;
    let response = post_form(
        &app,
        "/course/c1/test/m2",
        &token,
        "q=2&answers=0:0,1:1&choice=2&action=submit",
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/course/c1/certificate");
    assert_eq!(certificate_count(&pool), 1);

    let response = get(&app, "/course/c1/certificate", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Jane Doe"));
    assert!(body.contains("Production Basics"));

    // Revisiting never duplicates the certificate
    get(&app, "/course/c1/certificate", &token).await;
    assert_eq!(certificate_count(&pool), 1);
}

#[tokio::test]
async fn retake_after_pass_keeps_latest_score() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;
    post_form(&app, "/course/c1/module/m2/complete", &token, "").await;

    // Pass with 100
    post_form(&app, "/course/c1/test/m2", &token, "q=0&answers=&choice=0&action=next").await;
    post_form(&app, "/course/c1/test/m2", &token, "q=1&answers=0:0&choice=1&action=next").await;
    post_form(
        &app,
        "/course/c1/test/m2",
        &token,
        "q=2&answers=0:0,1:1&choice=2&action=submit",
    )
    .await;

    // Retake and fail; the latest attempt wins
    post_form(&app, "/course/c1/test/m2", &token, "q=0&answers=&choice=1&action=next").await;
    post_form(&app, "/course/c1/test/m2", &token, "q=1&answers=0:1&choice=0&action=next").await;
    let response = post_form(
        &app,
        "/course/c1/test/m2",
        &token,
        "q=2&answers=0:1,1:0&choice=0&action=submit",
    )
    .await;
    assert_eq!(location(&response), "/course/c1?result=failed&score=0");

    let score: i64 = pool
        .get()
        .unwrap()
        .query_row(
            "SELECT test_score FROM user_progress WHERE user_id = 'u1' AND module_id = 'm2'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(score, 0);

    // The already-issued certificate is untouched
    assert_eq!(certificate_count(&pool), 1);
}

#[tokio::test]
async fn certificate_download_is_png_or_unavailable() {
    let (app, pool) = portal();
    seed_course(&pool);
    let token = seed_learner(&pool);

    post_form(&app, "/course/c1/module/m1/complete", &token, "").await;
    post_form(&app, "/course/c1/module/m2/complete", &token, "").await;
    post_form(&app, "/course/c1/test/m2", &token, "q=0&answers=&choice=0&action=next").await;
    post_form(&app, "/course/c1/test/m2", &token, "q=1&answers=0:0&choice=1&action=next").await;
    post_form(
        &app,
        "/course/c1/test/m2",
        &token,
        "q=2&answers=0:0,1:1&choice=2&action=submit",
    )
    .await;

    let response = get(&app, "/course/c1/certificate/download", &token).await;
    match response.status() {
        StatusCode::OK => {
            assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
            let disposition = response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .to_string();
            assert!(disposition.contains("Jane_Doe_Certificate.png"));
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
        }
        // Host without any TTF font: rendering degrades to a message
        StatusCode::SERVICE_UNAVAILABLE => {}
        other => panic!("Unexpected status: {}", other),
    }
}
