use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ProcessedCallRow {
    pub transcribation: Option<String>,
    pub error: Option<String>,
    pub sent_to_bx: bool,
}

pub fn get(conn: &Connection, portal: &str, call_id: &str) -> Result<Option<ProcessedCallRow>> {
    conn.query_row(
        "SELECT transcribation, error, sent_to_bx FROM processed_call WHERE portal = ?1 AND call_id = ?2",
        rusqlite::params![portal, call_id],
        |row| {
            Ok(ProcessedCallRow {
                transcribation: row.get(0)?,
                error: row.get(1)?,
                sent_to_bx: row.get::<_, i64>(2)? != 0,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn upsert(
    conn: &Connection,
    portal: &str,
    call_id: &str,
    deal_bx_id: i64,
    transcribation: Option<&str>,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO processed_call (portal, call_id, deal_bx_id, transcribation, error, sent_to_bx)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(portal, call_id) DO UPDATE SET
            transcribation = excluded.transcribation,
            error = excluded.error",
        rusqlite::params![portal, call_id, deal_bx_id, transcribation, error],
    )?;
    Ok(())
}

pub fn mark_sent(conn: &Connection, portal: &str, call_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE processed_call SET sent_to_bx = 1 WHERE portal = ?1 AND call_id = ?2",
        rusqlite::params![portal, call_id],
    )?;
    Ok(())
}
