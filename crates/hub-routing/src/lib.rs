pub mod engine;
pub mod error;
pub mod lock;

pub use engine::RoutingEngine;
pub use error::{Result, RoutingError};

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::config::{AgentConfig, AgentDirectory, TransportConfig, TransportKind};
    use rusqlite::Connection;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn test_directory(inbox_ids: &[i64]) -> Arc<AgentDirectory> {
        let agent = AgentConfig {
            agent_code: "maksim".to_string(),
            display_name: "Maksim".to_string(),
            openai_token: "sk-test".to_string(),
            prompt_path: None,
            transports: inbox_ids
                .iter()
                .map(|&inbox_id| TransportConfig {
                    kind: TransportKind::Wa,
                    instance_id: format!("inst-{inbox_id}"),
                    api_token: "tok".to_string(),
                    inbox_id,
                    assignee_id: None,
                })
                .collect(),
        };
        Arc::new(AgentDirectory::build(&[agent]))
    }

    fn test_engine(inbox_ids: &[i64]) -> RoutingEngine {
        let conn = Connection::open_in_memory().unwrap();
        hub_core::db::init_db(&conn).unwrap();
        RoutingEngine::new(Arc::new(Mutex::new(conn)), test_directory(inbox_ids))
    }

    #[tokio::test]
    async fn sticky_over_repeated_lookups() {
        let engine = test_engine(&[100, 101]);
        let first = engine
            .pick_transport("maksim", TransportKind::Wa, "+79991234567")
            .await
            .unwrap();
        for _ in 0..5 {
            let again = engine
                .pick_transport("maksim", TransportKind::Wa, "+79991234567")
                .await
                .unwrap();
            assert_eq!(first, again);
        }
    }

    #[tokio::test]
    async fn round_robins_fresh_contacts_fairly() {
        let engine = test_engine(&[100, 101]);
        let mut counts: HashMap<i64, u32> = HashMap::new();
        for i in 0..20 {
            let phone = format!("+7999000{i:04}");
            let inbox = engine
                .pick_transport("maksim", TransportKind::Wa, &phone)
                .await
                .unwrap();
            *counts.entry(inbox).or_default() += 1;
        }
        assert_eq!(counts.len(), 2);
        for &count in counts.values() {
            assert!((9..=11).contains(&count), "unfair distribution: {counts:?}");
        }
    }

    #[tokio::test]
    async fn fails_with_no_active_candidates() {
        let engine = test_engine(&[100]);
        engine.set_active(100, false).unwrap();
        let err = engine
            .pick_transport("maksim", TransportKind::Wa, "+79991234567")
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::NoValidTransport { .. }));
    }

    #[tokio::test]
    async fn reroutes_when_sticky_transport_deactivated() {
        let engine = test_engine(&[100, 101]);
        let first = engine
            .pick_transport("maksim", TransportKind::Wa, "+79991234567")
            .await
            .unwrap();
        engine.set_active(first, false).unwrap();
        let second = engine
            .pick_transport("maksim", TransportKind::Wa, "+79991234567")
            .await
            .unwrap();
        assert_ne!(first, second);
    }
}
