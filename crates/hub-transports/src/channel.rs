use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Authorized,
    NotAuthorized,
    Blocked,
    Unknown,
}

impl InstanceState {
    pub fn from_wire(state: &str) -> Self {
        match state {
            "authorized" => InstanceState::Authorized,
            "notAuthorized" => InstanceState::NotAuthorized,
            "blocked" => InstanceState::Blocked,
            _ => InstanceState::Unknown,
        }
    }
}

/// Uniform contract over the two messenger gateways (spec §4.3). `&self`,
/// not `&mut self`, so sends can run concurrently across tasks — mirrors
/// `skynet-channels::channel::Channel::send`.
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> Result<()>;

    async fn send_file_by_url(
        &self,
        phone: &str,
        url: &str,
        filename: Option<&str>,
        caption: Option<&str>,
    ) -> Result<()>;

    async fn send_contact(
        &self,
        phone: &str,
        contact_phone: &str,
        first: &str,
        last: Option<&str>,
    ) -> Result<()>;

    async fn get_instance_phone(&self) -> Result<String>;

    async fn get_instance_state(&self) -> Result<InstanceState>;
}
