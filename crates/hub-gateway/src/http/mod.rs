pub mod bx24;
pub mod health;
pub mod sdk_agent;
pub mod transport;
pub mod website;
