use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

/// `HelpdeskConversation.last_message_id` — the idempotency marker used by
/// the pre-set/post-check pair around a reply (spec §4.10 steps 2, 6).
pub fn get_last_message_id(conn: &Connection, conversation_id: i64) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT last_message_id FROM helpdesk_conversation WHERE chatwoot_id = ?1",
        rusqlite::params![conversation_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn set_last_message_id(conn: &Connection, conversation_id: i64, message_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO helpdesk_conversation (chatwoot_id, last_message_id)
         VALUES (?1, ?2)
         ON CONFLICT(chatwoot_id) DO UPDATE SET last_message_id = excluded.last_message_id",
        rusqlite::params![conversation_id, message_id],
    )?;
    Ok(())
}
