pub mod channel;
pub mod error;
pub mod tg;
pub mod wa;

pub use channel::{InstanceState, TransportClient};
pub use error::{Result, TransportError};
pub use tg::{TgClient, TgInboundMessage, TgWebhook};
pub use wa::{parse_inbound_message, WaClient, WaInboundMessage, WaWebhook};
