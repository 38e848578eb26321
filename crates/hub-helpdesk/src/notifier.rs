use async_trait::async_trait;

/// Breaks the cycle noted in spec §9 ("Cyclic module dependencies"): the
/// deal-sync engine (C7) wants to be told about marker hits detected by the
/// helpdesk client (C2), but C2 must not import C7. The composition root
/// (`hub-gateway`) injects a `Notifier` implementation into
/// `HelpdeskClient::new` instead.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_responsible(&self, conversation_id: i64, marker: &str);
}

/// No-op notifier, used when no deal-sync integration is wired up (tests,
/// standalone helpdesk-only deployments).
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_responsible(&self, _conversation_id: i64, _marker: &str) {}
}
