use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use academy::auth::session;
use academy::config::Config;
use academy::db;
use academy::learning::certificate;
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

fn seed_admin(pool: &DbPool) -> String {
    let conn = pool.get().unwrap();
    conn.execute_batch(
        "INSERT INTO users (id, email, full_name, password_hash)
             VALUES ('a1', 'admin@example.com', 'Site Admin', 'unusable');
         INSERT INTO user_roles (user_id, role) VALUES ('a1', 'admin');",
    )
    .unwrap();
    drop(conn);
    session::create_session(pool, "a1", 24).unwrap()
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

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Expected a redirect Location header")
        .to_str()
        .unwrap()
}

fn count(pool: &DbPool, table: &str) -> i64 {
    pool.get()
        .unwrap()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

#[tokio::test]
async fn console_is_gated_by_role() {
    let (app, pool) = portal();
    let learner_token = seed_learner(&pool);

    // Anonymous: sent to the admin login page
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/login");

    // Signed-in learner without the role: back to the dashboard
    let response = get(&app, "/admin", &learner_token).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    // A learner also cannot mutate
    let response = post_form(
        &app,
        "/admin/courses",
        &learner_token,
        "title=Sneaky&description=Nope",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
    assert_eq!(count(&pool, "courses"), 0);
}

#[tokio::test]
async fn blank_course_form_writes_nothing() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);

    let response = post_form(
        &app,
        "/admin/courses",
        &token,
        "title=++&description=Something",
    )
    .await;
    assert_eq!(location(&response), "/admin?error=missing_fields");
    assert_eq!(count(&pool, "courses"), 0);

    let response = post_form(&app, "/admin/courses", &token, "title=Valid&description=").await;
    assert_eq!(location(&response), "/admin?error=missing_fields");
    assert_eq!(count(&pool, "courses"), 0);
}

#[tokio::test]
async fn valid_course_is_created_and_listed() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);

    let response = post_form(
        &app,
        "/admin/courses",
        &token,
        "title=Production+Basics&description=Intro+course&duration_hours=2",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin");
    assert_eq!(count(&pool, "courses"), 1);

    let created_by: Option<String> = pool
        .get()
        .unwrap()
        .query_row("SELECT created_by FROM courses", [], |r| r.get(0))
        .unwrap();
    assert_eq!(created_by.as_deref(), Some("a1"));

    let response = get(&app, "/admin", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("Production Basics"));
}

#[tokio::test]
async fn module_positions_survive_middle_deletion() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);
    pool.get()
        .unwrap()
        .execute("INSERT INTO courses (id, title) VALUES ('c1', 'Course')", [])
        .unwrap();

    post_form(&app, "/admin/courses/c1/modules", &token, "title=One&description=&content=").await;
    post_form(&app, "/admin/courses/c1/modules", &token, "title=Two&description=&content=").await;

    let first_id: String = pool
        .get()
        .unwrap()
        .query_row(
            "SELECT id FROM modules WHERE order_index = 0",
            [],
            |r| r.get(0),
        )
        .unwrap();
    post_form(
        &app,
        &format!("/admin/modules/{}/delete", first_id),
        &token,
        "",
    )
    .await;

    // The next insert must not collide with the surviving position 1
    let response = post_form(
        &app,
        "/admin/courses/c1/modules",
        &token,
        "title=Three&description=&content=",
    )
    .await;
    assert_eq!(location(&response), "/admin/courses/c1");

    let index: i64 = pool
        .get()
        .unwrap()
        .query_row(
            "SELECT order_index FROM modules WHERE title = 'Three'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(index, 2);
}

#[tokio::test]
async fn malformed_module_content_is_rejected() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);
    pool.get()
        .unwrap()
        .execute("INSERT INTO courses (id, title) VALUES ('c1', 'Course')", [])
        .unwrap();

    let response = post_form(
        &app,
        "/admin/courses/c1/modules",
        &token,
        "title=Bad&description=&content=not-json",
    )
    .await;
    assert_eq!(location(&response), "/admin/courses/c1?error=bad_content");
    assert_eq!(count(&pool, "modules"), 0);
}

#[tokio::test]
async fn test_creation_validates_and_enforces_one_per_module() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);
    pool.get()
        .unwrap()
        .execute_batch(
            "INSERT INTO courses (id, title) VALUES ('c1', 'Course');
             INSERT INTO modules (id, course_id, title, order_index) VALUES ('m1', 'c1', 'Mod', 0);",
        )
        .unwrap();

    // Unparseable questions
    let response = post_form(
        &app,
        "/admin/modules/m1/tests",
        &token,
        "title=Quiz&questions=nope&passing_score=70",
    )
    .await;
    assert_eq!(location(&response), "/admin/courses/c1?error=bad_questions");

    // correct index out of bounds
    let response = post_form(
        &app,
        "/admin/modules/m1/tests",
        &token,
        "title=Quiz&questions=%5B%7B%22question%22%3A%22Q%22%2C%22options%22%3A%5B%22a%22%5D%2C%22correct%22%3A5%7D%5D&passing_score=70",
    )
    .await;
    assert_eq!(location(&response), "/admin/courses/c1?error=bad_questions");

    // Passing score outside 0..=100
    let response = post_form(
        &app,
        "/admin/modules/m1/tests",
        &token,
        "title=Quiz&questions=%5B%5D&passing_score=150",
    )
    .await;
    assert_eq!(location(&response), "/admin/courses/c1?error=bad_passing");

    // An empty question list is refused even with a zero threshold —
    // such a test could never be taken, stranding the course
    let response = post_form(
        &app,
        "/admin/modules/m1/tests",
        &token,
        "title=Quiz&questions=%5B%5D&passing_score=0",
    )
    .await;
    assert_eq!(location(&response), "/admin/courses/c1?error=no_questions");
    assert_eq!(count(&pool, "tests"), 0);

    // An unknown module id is a 404, not a server error
    let response = post_form(
        &app,
        "/admin/modules/nope/tests",
        &token,
        "title=Quiz&questions=%5B%5D&passing_score=70",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Valid create
    let valid =
        "title=Quiz&questions=%5B%7B%22question%22%3A%22Q%22%2C%22options%22%3A%5B%22a%22%2C%22b%22%5D%2C%22correct%22%3A1%7D%5D&passing_score=70";
    let response = post_form(&app, "/admin/modules/m1/tests", &token, valid).await;
    assert_eq!(location(&response), "/admin/courses/c1");
    assert_eq!(count(&pool, "tests"), 1);

    // A second test on the same module is refused
    let response = post_form(&app, "/admin/modules/m1/tests", &token, valid).await;
    assert_eq!(location(&response), "/admin/courses/c1?error=duplicate_test");
    assert_eq!(count(&pool, "tests"), 1);
}

#[tokio::test]
async fn certificate_approval_lifecycle() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);
    seed_learner(&pool);
    pool.get()
        .unwrap()
        .execute("INSERT INTO courses (id, title) VALUES ('c1', 'Course')", [])
        .unwrap();

    certificate::issue(&pool, "u1", "c1").unwrap();
    let cert = certificate::find(&pool, "u1", "c1").unwrap().unwrap();

    let response = post_form(
        &app,
        &format!("/admin/certificates/{}/approve", cert.id),
        &token,
        "",
    )
    .await;
    assert_eq!(location(&response), "/admin");

    let cert = certificate::find(&pool, "u1", "c1").unwrap().unwrap();
    assert!(cert.approved);
    assert_eq!(cert.approved_by.as_deref(), Some("a1"));

    let response = post_form(
        &app,
        &format!("/admin/certificates/{}/reject", cert.id),
        &token,
        "",
    )
    .await;
    assert_eq!(location(&response), "/admin");
    assert!(certificate::find(&pool, "u1", "c1").unwrap().is_none());
}

#[tokio::test]
async fn deleting_a_course_cascades() {
    let (app, pool) = portal();
    let token = seed_admin(&pool);
    seed_learner(&pool);
    pool.get()
        .unwrap()
        .execute_batch(
            "INSERT INTO courses (id, title) VALUES ('c1', 'Course');
             INSERT INTO modules (id, course_id, title, order_index) VALUES ('m1', 'c1', 'Mod', 0);
             INSERT INTO tests (id, module_id, title) VALUES ('t1', 'm1', 'Quiz');
             INSERT INTO user_progress (id, user_id, course_id, module_id, completed_at)
                 VALUES ('p1', 'u1', 'c1', 'm1', datetime('now'));",
        )
        .unwrap();
    certificate::issue(&pool, "u1", "c1").unwrap();

    let response = post_form(&app, "/admin/courses/c1/delete", &token, "").await;
    assert_eq!(location(&response), "/admin");

    assert_eq!(count(&pool, "courses"), 0);
    assert_eq!(count(&pool, "modules"), 0);
    assert_eq!(count(&pool, "tests"), 0);
    assert_eq!(count(&pool, "user_progress"), 0);
    assert_eq!(count(&pool, "certificates"), 0);
}
