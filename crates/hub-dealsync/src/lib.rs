pub mod deal;
pub mod engine;
pub mod error;

pub use deal::DealRow;
pub use engine::DealSyncEngine;
pub use error::{DealSyncError, Result};
