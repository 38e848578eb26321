pub mod error;
pub mod event_mutex;

pub use error::{MutexError, Result};
pub use event_mutex::{event_code, EventMutex};
