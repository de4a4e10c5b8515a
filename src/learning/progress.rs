//! Per-user, per-module progress records. One row per (user, module),
//! upserted, never duplicated.

use rusqlite::params;

use crate::db::models::ProgressRecord;
use crate::error::AppResult;
use crate::state::DbPool;

/// Mark a module complete. Leaves any recorded test score untouched.
pub fn mark_complete(
    pool: &DbPool,
    user_id: &str,
    course_id: &str,
    module_id: &str,
) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO user_progress (id, user_id, course_id, module_id, completed_at) \
         VALUES (?1, ?2, ?3, ?4, datetime('now')) \
         ON CONFLICT (user_id, module_id) \
         DO UPDATE SET completed_at = excluded.completed_at",
        params![
            uuid::Uuid::now_v7().to_string(),
            user_id,
            course_id,
            module_id
        ],
    )?;
    Ok(())
}

/// Record a submitted test score, marking the module complete at the
/// same time. The latest submission wins.
pub fn record_test_score(
    pool: &DbPool,
    user_id: &str,
    course_id: &str,
    module_id: &str,
    score: u32,
) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO user_progress (id, user_id, course_id, module_id, completed_at, test_score) \
         VALUES (?1, ?2, ?3, ?4, datetime('now'), ?5) \
         ON CONFLICT (user_id, module_id) \
         DO UPDATE SET completed_at = excluded.completed_at, test_score = excluded.test_score",
        params![
            uuid::Uuid::now_v7().to_string(),
            user_id,
            course_id,
            module_id,
            score
        ],
    )?;
    Ok(())
}

/// Progress records for one user within one course.
pub fn load_progress(pool: &DbPool, user_id: &str, course_id: &str) -> AppResult<Vec<ProgressRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT user_id, course_id, module_id, completed_at, test_score \
         FROM user_progress WHERE user_id = ?1 AND course_id = ?2",
    )?;
    let records = stmt
        .query_map(params![user_id, course_id], ProgressRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// All progress records for one user, across courses (dashboard view).
pub fn load_all_progress(pool: &DbPool, user_id: &str) -> AppResult<Vec<ProgressRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT user_id, course_id, module_id, completed_at, test_score \
         FROM user_progress WHERE user_id = ?1",
    )?;
    let records = stmt
        .query_map(params![user_id], ProgressRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded_pool() -> DbPool {
        let pool = db::create_memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, password_hash) VALUES ('u1', 'u@x.com', 'h');
             INSERT INTO courses (id, title) VALUES ('c1', 'Course');
             INSERT INTO modules (id, course_id, title, order_index) VALUES ('m1', 'c1', 'M1', 0);",
        )
        .unwrap();
        pool
    }

    fn row_count(pool: &DbPool) -> i64 {
        pool.get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM user_progress", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn mark_complete_upserts_single_row() {
        let pool = seeded_pool();
        mark_complete(&pool, "u1", "c1", "m1").unwrap();
        mark_complete(&pool, "u1", "c1", "m1").unwrap();
        assert_eq!(row_count(&pool), 1);

        let records = load_progress(&pool, "u1", "c1").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].completed_at.is_some());
        assert!(records[0].test_score.is_none());
    }

    #[test]
    fn mark_complete_preserves_existing_score() {
        let pool = seeded_pool();
        record_test_score(&pool, "u1", "c1", "m1", 85).unwrap();
        mark_complete(&pool, "u1", "c1", "m1").unwrap();

        let records = load_progress(&pool, "u1", "c1").unwrap();
        assert_eq!(records[0].test_score, Some(85));
    }

    #[test]
    fn latest_test_score_wins() {
        let pool = seeded_pool();
        record_test_score(&pool, "u1", "c1", "m1", 40).unwrap();
        record_test_score(&pool, "u1", "c1", "m1", 90).unwrap();
        assert_eq!(row_count(&pool), 1);

        let records = load_progress(&pool, "u1", "c1").unwrap();
        assert_eq!(records[0].test_score, Some(90));
    }
}
