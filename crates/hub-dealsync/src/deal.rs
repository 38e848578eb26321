use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DealRow {
    pub bx_id: i64,
    pub bx_portal: String,
    pub funnel_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub stage_id: Option<String>,
    pub last_sync_chatwoot: Option<DateTime<Utc>>,
    pub last_transcribed_call: Option<DateTime<Utc>>,
    pub last_sync_comment_id: i64,
}

pub fn get(conn: &Connection, portal: &str, deal_id: i64) -> Result<Option<DealRow>> {
    conn.query_row(
        "SELECT bx_id, bx_portal, funnel_id, contact_id, stage_id,
                last_sync_chatwoot, last_transcribed_call, last_sync_comment_id
         FROM deal WHERE bx_id = ?1 AND bx_portal = ?2",
        rusqlite::params![deal_id, portal],
        row_to_deal,
    )
    .optional()
    .map_err(Into::into)
}

/// Upserts funnel/contact/stage from a freshly fetched CRM deal. Never
/// touches the monotonic `last_transcribed_call` / `last_sync_comment_id`
/// columns.
pub fn upsert(
    conn: &Connection,
    portal: &str,
    deal_id: i64,
    funnel_id: Option<i64>,
    contact_id: Option<i64>,
    stage_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO deal (bx_id, bx_portal, funnel_id, contact_id, stage_id, last_sync_comment_id)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(bx_id, bx_portal) DO UPDATE SET
            funnel_id = excluded.funnel_id,
            contact_id = excluded.contact_id",
        rusqlite::params![deal_id, portal, funnel_id, contact_id, stage_id],
    )?;
    Ok(())
}

pub fn set_stage(conn: &Connection, portal: &str, deal_id: i64, stage_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE deal SET stage_id = ?1 WHERE bx_id = ?2 AND bx_portal = ?3",
        rusqlite::params![stage_id, deal_id, portal],
    )?;
    Ok(())
}

/// Write only if strictly greater than the stored value (monotonic).
pub fn bump_last_sync_comment_id(conn: &Connection, portal: &str, deal_id: i64, max_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE deal SET last_sync_comment_id = ?1
         WHERE bx_id = ?2 AND bx_portal = ?3 AND last_sync_comment_id < ?1",
        rusqlite::params![max_id, deal_id, portal],
    )?;
    Ok(())
}

/// Write only if strictly greater than the stored value (monotonic).
pub fn bump_last_transcribed_call(conn: &Connection, portal: &str, deal_id: i64, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE deal SET last_transcribed_call = ?1
         WHERE bx_id = ?2 AND bx_portal = ?3
           AND (last_transcribed_call IS NULL OR last_transcribed_call < ?1)",
        rusqlite::params![at.to_rfc3339(), deal_id, portal],
    )?;
    Ok(())
}

pub fn mark_synced(conn: &Connection, portal: &str, deal_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE deal SET last_sync_chatwoot = ?1 WHERE bx_id = ?2 AND bx_portal = ?3",
        rusqlite::params![Utc::now().to_rfc3339(), deal_id, portal],
    )?;
    Ok(())
}

fn row_to_deal(row: &rusqlite::Row) -> rusqlite::Result<DealRow> {
    Ok(DealRow {
        bx_id: row.get(0)?,
        bx_portal: row.get(1)?,
        funnel_id: row.get(2)?,
        contact_id: row.get(3)?,
        stage_id: row.get(4)?,
        last_sync_chatwoot: parse_ts(row.get(5)?),
        last_transcribed_call: parse_ts(row.get(6)?),
        last_sync_comment_id: row.get(7)?,
    })
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
