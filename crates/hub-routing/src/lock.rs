//! Cross-process advisory lock keyed by `hash(agent_code:kind)` (spec §4.4,
//! §9). Postgres exposes `pg_advisory_lock(bigint)` for this; SQLite has no
//! advisory-lock primitive, so the same contract (an 8-byte signed integer
//! key, held exclusively for the duration of the RR rotation) is realized
//! with a dedicated table and an `INSERT`-as-acquire / `DELETE`-as-release
//! pattern. Noted in DESIGN.md as a deliberate SQLite adaptation.

use rusqlite::Connection;
use sha1::{Digest, Sha1};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, RoutingError};

const MAX_ATTEMPTS: u32 = 25;
const RETRY_DELAY_MS: u64 = 200;

/// 8-byte signed integer derived from the first 8 bytes of
/// `SHA1("{agent_code}:{kind}")` — this derivation is part of the contract
/// because the lock key is shared across processes (spec §9).
pub fn lock_key(agent_code: &str, kind: &str) -> i64 {
    let mut hasher = Sha1::new();
    hasher.update(format!("{agent_code}:{kind}").as_bytes());
    let digest = hasher.finalize();
    i64::from_be_bytes(digest[..8].try_into().expect("sha1 digest >= 8 bytes"))
}

/// Acquires the advisory lock, retrying up to 25 times at 200 ms, then
/// runs `f` while holding it, then releases.
pub async fn with_lock<F, T>(conn: &Arc<Mutex<Connection>>, key: i64, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    acquire(conn, key).await?;
    let result = {
        let guard = conn.lock().expect("routing db mutex poisoned");
        f(&guard)
    };
    release(conn, key);
    result
}

async fn acquire(conn: &Arc<Mutex<Connection>>, key: i64) -> Result<()> {
    for attempt in 0..MAX_ATTEMPTS {
        let acquired = {
            let guard = conn.lock().expect("routing db mutex poisoned");
            guard
                .execute(
                    "INSERT OR IGNORE INTO routing_lock (lock_key, locked_at) VALUES (?1, ?2)",
                    rusqlite::params![key, chrono::Utc::now().to_rfc3339()],
                )
                .map(|rows| rows == 1)?
        };
        if acquired {
            return Ok(());
        }
        if attempt + 1 < MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
        }
    }
    Err(RoutingError::LockTimeout(key))
}

fn release(conn: &Arc<Mutex<Connection>>, key: i64) {
    let guard = conn.lock().expect("routing db mutex poisoned");
    let _ = guard.execute("DELETE FROM routing_lock WHERE lock_key = ?1", rusqlite::params![key]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_stable() {
        let a = lock_key("maksim", "wa");
        let b = lock_key("maksim", "wa");
        assert_eq!(a, b);
        assert_ne!(a, lock_key("maksim", "tg"));
    }
}
