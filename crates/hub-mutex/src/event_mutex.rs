use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tracing::instrument;

use crate::error::Result;

/// Composes an event code `{portal}:DEAL:{deal_id}[:{suffix}]` — suffix
/// disambiguates concurrent pipelines over the same deal (e.g. `COMMENTS`,
/// `CALLS`, `STAGE`).
pub fn event_code(portal: &str, deal_id: i64, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{portal}:DEAL:{deal_id}:{suffix}"),
        None => format!("{portal}:DEAL:{deal_id}"),
    }
}

/// Advisory, self-healing mutex keyed by event-code (C6, spec §4.6). No
/// TTL — stale locks are operator-cleared.
pub struct EventMutex {
    conn: Arc<Mutex<Connection>>,
}

impl EventMutex {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Upserts `{event_code, is_running=true}` with conflict target
    /// `event_code` and `WHERE is_running=false` in the update arm. Returns
    /// whether this caller now owns the lock.
    #[instrument(skip(self))]
    pub fn acquire(&self, event_code: &str) -> Result<bool> {
        let guard = self.conn.lock().expect("event mutex db poisoned");
        let changed = guard.execute(
            "INSERT INTO event_lock (event_code, is_running, updated_at, error)
             VALUES (?1, 1, ?2, NULL)
             ON CONFLICT(event_code) DO UPDATE
                SET is_running = 1, updated_at = excluded.updated_at, error = NULL
             WHERE event_lock.is_running = 0",
            rusqlite::params![event_code, Utc::now().to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    /// Unconditional release; optionally records the failure that caused it.
    #[instrument(skip(self))]
    pub fn release(&self, event_code: &str, err: Option<&str>) -> Result<()> {
        let guard = self.conn.lock().expect("event mutex db poisoned");
        guard.execute(
            "UPDATE event_lock SET is_running = 0, updated_at = ?1, error = ?2 WHERE event_code = ?3",
            rusqlite::params![Utc::now().to_rfc3339(), err, event_code],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutex() -> EventMutex {
        let conn = Connection::open_in_memory().unwrap();
        hub_core::db::init_db(&conn).unwrap();
        EventMutex::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn composes_event_codes() {
        assert_eq!(event_code("p1", 10, None), "p1:DEAL:10");
        assert_eq!(event_code("p1", 10, Some("CALLS")), "p1:DEAL:10:CALLS");
    }

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let m = mutex();
        assert!(m.acquire("p1:DEAL:10").unwrap());
        assert!(!m.acquire("p1:DEAL:10").unwrap());
        m.release("p1:DEAL:10", None).unwrap();
        assert!(m.acquire("p1:DEAL:10").unwrap());
    }

    #[test]
    fn release_records_error() {
        let m = mutex();
        assert!(m.acquire("p1:DEAL:10").unwrap());
        m.release("p1:DEAL:10", Some("boom")).unwrap();
        let guard = m.conn.lock().unwrap();
        let err: Option<String> = guard
            .query_row(
                "SELECT error FROM event_lock WHERE event_code = 'p1:DEAL:10'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(err.as_deref(), Some("boom"));
    }
}
