use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::instrument;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub portal: String,
    pub deal_id: i64,
    pub conversation_id: i64,
    pub inbox_id: i64,
    pub contact_id: i64,
    pub is_primary: bool,
    pub created_at: String,
}

/// Deal↔conversation many-to-many linking with exactly one primary per deal
/// (C5, spec §4.5).
pub struct LinkRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl LinkRegistry {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Idempotent: a conflict on `(portal, deal_id, conversation_id)` is a no-op.
    #[instrument(skip(self))]
    pub fn link_deal_with_conversation(
        &self,
        portal: &str,
        deal_id: i64,
        conversation_id: i64,
        inbox_id: i64,
        contact_id: i64,
    ) -> Result<()> {
        let guard = self.conn.lock().expect("link db mutex poisoned");
        guard.execute(
            "INSERT OR IGNORE INTO deal_link
                (bx_portal, bx_deal_id, cw_conversation_id, cw_inbox_id, cw_contact_id, is_primary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            rusqlite::params![portal, deal_id, conversation_id, inbox_id, contact_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Clears every other `is_primary` in the group and sets the chosen
    /// link. Returns `false` if no such link row exists.
    #[instrument(skip(self))]
    pub fn set_primary(&self, portal: &str, deal_id: i64, conversation_id: i64) -> Result<bool> {
        let mut guard = self.conn.lock().expect("link db mutex poisoned");
        let tx = guard.transaction()?;
        tx.execute(
            "UPDATE deal_link SET is_primary = 0 WHERE bx_portal = ?1 AND bx_deal_id = ?2",
            rusqlite::params![portal, deal_id],
        )?;
        let affected = tx.execute(
            "UPDATE deal_link SET is_primary = 1
             WHERE bx_portal = ?1 AND bx_deal_id = ?2 AND cw_conversation_id = ?3",
            rusqlite::params![portal, deal_id, conversation_id],
        )?;
        tx.commit()?;
        Ok(affected == 1)
    }

    #[instrument(skip(self))]
    pub fn get_links_for_deal(&self, portal: &str, deal_id: i64) -> Result<Vec<Link>> {
        let guard = self.conn.lock().expect("link db mutex poisoned");
        let mut stmt = guard.prepare(
            "SELECT bx_portal, bx_deal_id, cw_conversation_id, cw_inbox_id, cw_contact_id, is_primary, created_at
             FROM deal_link
             WHERE bx_portal = ?1 AND bx_deal_id = ?2
             ORDER BY is_primary DESC, created_at DESC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![portal, deal_id], |row| {
                Ok(Link {
                    portal: row.get(0)?,
                    deal_id: row.get(1)?,
                    conversation_id: row.get(2)?,
                    inbox_id: row.get(3)?,
                    contact_id: row.get(4)?,
                    is_primary: row.get::<_, i64>(5)? != 0,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reverse lookup: every `(portal, deal_id)` linked to a conversation —
    /// used by `NotifyResponsible` (C7) to find which deals to notify.
    #[instrument(skip(self))]
    pub fn get_deals_for_conversation(&self, conversation_id: i64) -> Result<Vec<(String, i64)>> {
        let guard = self.conn.lock().expect("link db mutex poisoned");
        let mut stmt = guard.prepare(
            "SELECT DISTINCT bx_portal, bx_deal_id FROM deal_link WHERE cw_conversation_id = ?1",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![conversation_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The primary link's conversation, else the most recent one.
    #[instrument(skip(self))]
    pub fn get_selected_conversation_id(&self, portal: &str, deal_id: i64) -> Result<Option<i64>> {
        let guard = self.conn.lock().expect("link db mutex poisoned");
        guard
            .query_row(
                "SELECT cw_conversation_id FROM deal_link
                 WHERE bx_portal = ?1 AND bx_deal_id = ?2
                 ORDER BY is_primary DESC, created_at DESC
                 LIMIT 1",
                rusqlite::params![portal, deal_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LinkRegistry {
        let conn = Connection::open_in_memory().unwrap();
        hub_core::db::init_db(&conn).unwrap();
        LinkRegistry::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn linking_is_idempotent() {
        let registry = engine();
        registry.link_deal_with_conversation("p1", 10, 100, 1, 500).unwrap();
        registry.link_deal_with_conversation("p1", 10, 100, 1, 500).unwrap();
        let links = registry.get_links_for_deal("p1", 10).unwrap();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn set_primary_clears_others() {
        let registry = engine();
        registry.link_deal_with_conversation("p1", 10, 100, 1, 500).unwrap();
        registry.link_deal_with_conversation("p1", 10, 101, 2, 501).unwrap();
        assert!(registry.set_primary("p1", 10, 101).unwrap());
        let links = registry.get_links_for_deal("p1", 10).unwrap();
        assert!(links[0].is_primary);
        assert_eq!(links[0].conversation_id, 101);
        assert!(!links[1].is_primary);
    }

    #[test]
    fn set_primary_on_missing_link_returns_false() {
        let registry = engine();
        registry.link_deal_with_conversation("p1", 10, 100, 1, 500).unwrap();
        assert!(!registry.set_primary("p1", 10, 999).unwrap());
    }

    #[test]
    fn finds_deals_linked_to_a_conversation() {
        let registry = engine();
        registry.link_deal_with_conversation("p1", 10, 555, 1, 500).unwrap();
        registry.link_deal_with_conversation("p1", 11, 555, 1, 500).unwrap();
        let deals = registry.get_deals_for_conversation(555).unwrap();
        assert_eq!(deals.len(), 2);
        assert!(deals.contains(&("p1".to_string(), 10)));
        assert!(deals.contains(&("p1".to_string(), 11)));
    }

    #[test]
    fn selected_conversation_prefers_primary_else_most_recent() {
        let registry = engine();
        registry.link_deal_with_conversation("p1", 10, 100, 1, 500).unwrap();
        registry.link_deal_with_conversation("p1", 10, 101, 2, 501).unwrap();
        assert_eq!(registry.get_selected_conversation_id("p1", 10).unwrap(), Some(101));
        registry.set_primary("p1", 10, 100).unwrap();
        assert_eq!(registry.get_selected_conversation_id("p1", 10).unwrap(), Some(100));
    }
}
