use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub portal: String,
    pub deal_bx_id: i64,
    pub attempt: i64,
}

/// Mirrors `SELECT ... FOR UPDATE SKIP LOCKED LIMIT 2*CONCURRENCY` (spec
/// §4.8): SQLite has no row-level locking, so each candidate is claimed
/// with an atomic conditional `UPDATE ... WHERE status IN (...)` instead —
/// the affected-row count tells us whether we won the race.
pub fn claim_batch(conn: &Connection, limit: usize) -> Result<Vec<JobRow>> {
    let now = Utc::now().to_rfc3339();
    let candidate_ids: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM transcription_job
             WHERE status IN ('new', 'retry') AND next_run_at <= ?1
             ORDER BY priority ASC, created_at ASC
             LIMIT ?2",
        )?;
        stmt.query_map(rusqlite::params![now, limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?
    };

    let locked_until = (Utc::now() + ChronoDuration::seconds(1500)).to_rfc3339();
    let mut claimed = Vec::new();
    for id in candidate_ids {
        let changed = conn.execute(
            "UPDATE transcription_job
             SET status = 'running', attempt = attempt + 1, locked_until = ?1, updated_at = ?2
             WHERE id = ?3 AND status IN ('new', 'retry')",
            rusqlite::params![locked_until, now, id],
        )?;
        if changed == 1 {
            if let Some(row) = get(conn, id)? {
                claimed.push(row);
            }
        }
    }
    Ok(claimed)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<JobRow>> {
    conn.query_row(
        "SELECT id, portal, deal_bx_id, attempt FROM transcription_job WHERE id = ?1",
        rusqlite::params![id],
        |row| {
            Ok(JobRow {
                id: row.get(0)?,
                portal: row.get(1)?,
                deal_bx_id: row.get(2)?,
                attempt: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn mark_done(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE transcription_job
         SET status = 'done', locked_until = NULL, last_error = NULL, updated_at = ?1
         WHERE id = ?2",
        rusqlite::params![Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

/// Backoff: `min(60, 2^min(attempt,6))` minutes.
pub fn mark_retry(conn: &Connection, id: i64, attempt: i64, error: &str) -> Result<()> {
    let minutes = (2i64.pow(attempt.min(6) as u32)).min(60);
    let next_run_at = (Utc::now() + ChronoDuration::minutes(minutes)).to_rfc3339();
    let truncated_error: String = error.chars().take(2000).collect();
    conn.execute(
        "UPDATE transcription_job
         SET status = 'retry', last_error = ?1, next_run_at = ?2, locked_until = NULL, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![truncated_error, next_run_at, id],
    )?;
    Ok(())
}

/// Inserts iff no active job exists for `(portal, deal_bx_id)` — relies on
/// the partial unique index over `status IN ('new','running','retry')`.
pub fn enqueue(conn: &Connection, portal: &str, deal_bx_id: i64) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO transcription_job
            (portal, deal_bx_id, status, attempt, priority, next_run_at, created_at, updated_at)
         VALUES (?1, ?2, 'new', 0, 100, ?3, ?3, ?3)",
        rusqlite::params![portal, deal_bx_id, now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_caps_at_60_minutes() {
        let conn = Connection::open_in_memory().unwrap();
        hub_core::db::init_db(&conn).unwrap();
        enqueue(&conn, "p1", 10).unwrap();
        let job = claim_batch(&conn, 10).unwrap().remove(0);
        mark_retry(&conn, job.id, job.attempt, "boom").unwrap();
        let next_run: String = conn
            .query_row("SELECT next_run_at FROM transcription_job WHERE id = ?1", [job.id], |r| r.get(0))
            .unwrap();
        let dt = chrono::DateTime::parse_from_rfc3339(&next_run).unwrap();
        let delta = dt.with_timezone(&Utc) - Utc::now();
        assert!(delta.num_minutes() >= 1 && delta.num_minutes() <= 3);
    }

    #[test]
    fn enqueue_is_idempotent_while_active() {
        let conn = Connection::open_in_memory().unwrap();
        hub_core::db::init_db(&conn).unwrap();
        enqueue(&conn, "p1", 10).unwrap();
        enqueue(&conn, "p1", 10).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transcription_job WHERE portal='p1' AND deal_bx_id=10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
