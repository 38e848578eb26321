use rusqlite::Connection;

use crate::error::Result;

/// Opens (creating if absent) the shared SQLite database and applies the
/// full schema. Mirrors `skynet-sessions::db::init_db` / `skynet-scheduler`'s
/// `CREATE TABLE IF NOT EXISTS` + `CREATE INDEX IF NOT EXISTS` style: one
/// `execute_batch` call, idempotent on every restart.
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS transport_activation (
            inbox_id    INTEGER PRIMARY KEY,
            is_active   INTEGER NOT NULL DEFAULT 1,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS contact_routing (
            phone       TEXT NOT NULL,
            agent_code  TEXT NOT NULL,
            kind        TEXT NOT NULL,
            inbox_id    INTEGER NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(phone, agent_code, kind)
        );
        CREATE INDEX IF NOT EXISTS idx_contact_routing_lookup
            ON contact_routing(phone, agent_code, kind);

        CREATE TABLE IF NOT EXISTS routing_lock (
            lock_key    INTEGER PRIMARY KEY,
            locked_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rr_cursor (
            agent_code_and_kind TEXT PRIMARY KEY,
            last_index          INTEGER NOT NULL DEFAULT -1,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS deal_link (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            bx_portal         TEXT NOT NULL,
            bx_deal_id        INTEGER NOT NULL,
            cw_conversation_id INTEGER NOT NULL,
            cw_inbox_id       INTEGER NOT NULL,
            cw_contact_id     INTEGER NOT NULL,
            is_primary        INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL,
            UNIQUE(bx_portal, bx_deal_id, cw_conversation_id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_link_primary_per_deal
            ON deal_link(bx_portal, bx_deal_id) WHERE is_primary = 1;

        CREATE TABLE IF NOT EXISTS deal (
            bx_id                   INTEGER NOT NULL,
            bx_portal               TEXT NOT NULL,
            funnel_id               INTEGER,
            contact_id              INTEGER,
            stage_id                TEXT,
            last_sync_chatwoot      TEXT,
            last_transcribed_call   TEXT,
            last_sync_comment_id    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (bx_id, bx_portal)
        );

        CREATE TABLE IF NOT EXISTS helpdesk_conversation (
            chatwoot_id             INTEGER PRIMARY KEY,
            last_message_id         INTEGER,
            last_client_message_date TEXT,
            agent_contact_sent      INTEGER NOT NULL DEFAULT 0,
            next_meeting_datetime   TEXT,
            warmup_number           INTEGER NOT NULL DEFAULT 0,
            last_warmup_date        TEXT
        );

        CREATE TABLE IF NOT EXISTS processed_call (
            portal          TEXT NOT NULL,
            call_id         TEXT NOT NULL,
            deal_bx_id      INTEGER NOT NULL,
            transcribation  TEXT,
            error           TEXT,
            sent_to_bx      INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (portal, call_id)
        );

        CREATE TABLE IF NOT EXISTS event_lock (
            event_code  TEXT PRIMARY KEY,
            is_running  INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL,
            error       TEXT
        );

        CREATE TABLE IF NOT EXISTS transcription_job (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            portal      TEXT NOT NULL,
            deal_bx_id  INTEGER NOT NULL,
            status      TEXT NOT NULL DEFAULT 'new',
            attempt     INTEGER NOT NULL DEFAULT 0,
            priority    INTEGER NOT NULL DEFAULT 100,
            next_run_at TEXT NOT NULL,
            locked_until TEXT,
            last_error  TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_transcription_job_active
            ON transcription_job(portal, deal_bx_id)
            WHERE status IN ('new', 'running', 'retry');
        CREATE INDEX IF NOT EXISTS idx_transcription_job_dispatch
            ON transcription_job(status, next_run_at, priority, created_at);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
