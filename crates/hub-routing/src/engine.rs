use std::sync::{Arc, Mutex};

use chrono::Utc;
use hub_core::config::{AgentDirectory, TransportKind};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, instrument};

use crate::error::{Result, RoutingError};
use crate::lock;

/// Sticky per-contact round-robin transport selection (C4) — the critical
/// correctness component (spec §4.4, §8).
pub struct RoutingEngine {
    conn: Arc<Mutex<Connection>>,
    directory: Arc<AgentDirectory>,
}

impl RoutingEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, directory: Arc<AgentDirectory>) -> Self {
        Self { conn, directory }
    }

    /// `PickTransport(agent_code, kind, phone) -> Transport | NoValidTransport`.
    #[instrument(skip(self), fields(agent_code = %agent_code, kind = %kind, phone = %phone))]
    pub async fn pick_transport(&self, agent_code: &str, kind: TransportKind, phone: &str) -> Result<i64> {
        let candidates = self.active_candidates(agent_code, kind)?;
        if candidates.is_empty() {
            return Err(RoutingError::NoValidTransport {
                agent_code: agent_code.to_string(),
                kind: kind.to_string(),
            });
        }

        if let Some(inbox) = self.read_contact_routing(phone, agent_code, kind)? {
            if candidates.contains(&inbox) {
                return Ok(inbox);
            }
        }

        let key = lock::lock_key(agent_code, &kind.to_string());
        let phone = phone.to_string();
        let agent_code_owned = agent_code.to_string();
        let conn = self.conn.clone();
        let candidates = candidates.clone();

        lock::with_lock(&conn, key, move |db| {
            // Re-read under the lock — another worker may have raced us.
            if let Some(inbox) =
                read_contact_routing_sync(db, &phone, &agent_code_owned, kind)?
            {
                if candidates.contains(&inbox) {
                    return Ok(inbox);
                }
            }

            let last_index: i64 = db
                .query_row(
                    "SELECT last_index FROM rr_cursor WHERE agent_code_and_kind = ?1",
                    rusqlite::params![rr_key(&agent_code_owned, kind)],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(-1);
            let new_index = ((last_index + 1) as usize) % candidates.len();
            let inbox = candidates[new_index];

            db.execute(
                "INSERT INTO rr_cursor (agent_code_and_kind, last_index, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(agent_code_and_kind) DO UPDATE SET last_index = excluded.last_index, updated_at = excluded.updated_at",
                rusqlite::params![rr_key(&agent_code_owned, kind), new_index as i64, Utc::now().to_rfc3339()],
            )?;

            db.execute(
                "INSERT INTO contact_routing (phone, agent_code, kind, inbox_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(phone, agent_code, kind) DO UPDATE SET inbox_id = excluded.inbox_id, updated_at = excluded.updated_at",
                rusqlite::params![phone, agent_code_owned, kind.to_string(), inbox, Utc::now().to_rfc3339()],
            )?;

            info!(agent_code = %agent_code_owned, inbox_id = inbox, rr_index = new_index, "rotated transport selection");
            Ok(inbox)
        })
        .await
    }

    fn active_candidates(&self, agent_code: &str, kind: TransportKind) -> Result<Vec<i64>> {
        let configured = self.directory.transports_for(agent_code, kind);
        let guard = self.conn.lock().expect("routing db mutex poisoned");
        let mut out = Vec::new();
        for transport in configured {
            let active: bool = guard
                .query_row(
                    "SELECT is_active FROM transport_activation WHERE inbox_id = ?1",
                    rusqlite::params![transport.inbox_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .map(|v| v != 0)
                .unwrap_or(true); // not yet bootstrapped => assume active
            if active {
                out.push(transport.inbox_id);
            }
        }
        Ok(out)
    }

    fn read_contact_routing(&self, phone: &str, agent_code: &str, kind: TransportKind) -> Result<Option<i64>> {
        let guard = self.conn.lock().expect("routing db mutex poisoned");
        read_contact_routing_sync(&guard, phone, agent_code, kind)
    }

    /// Bootstraps `transport_activation` rows for every configured
    /// transport that doesn't have one yet (insert-if-missing, defaults to
    /// active) — run once at startup.
    #[instrument(skip(self))]
    pub fn bootstrap_activation(&self) -> Result<()> {
        let guard = self.conn.lock().expect("routing db mutex poisoned");
        for transport in self.directory.all_transports() {
            guard.execute(
                "INSERT OR IGNORE INTO transport_activation (inbox_id, is_active, updated_at) VALUES (?1, 1, ?2)",
                rusqlite::params![transport.inbox_id, Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_active(&self, inbox_id: i64, active: bool) -> Result<()> {
        let guard = self.conn.lock().expect("routing db mutex poisoned");
        guard.execute(
            "INSERT INTO transport_activation (inbox_id, is_active, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(inbox_id) DO UPDATE SET is_active = excluded.is_active, updated_at = excluded.updated_at",
            rusqlite::params![inbox_id, active as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn rr_key(agent_code: &str, kind: TransportKind) -> String {
    format!("{agent_code}:{kind}")
}

fn read_contact_routing_sync(
    db: &Connection,
    phone: &str,
    agent_code: &str,
    kind: TransportKind,
) -> Result<Option<i64>> {
    db.query_row(
        "SELECT inbox_id FROM contact_routing WHERE phone = ?1 AND agent_code = ?2 AND kind = ?3",
        rusqlite::params![phone, agent_code, kind.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(RoutingError::from)
}
