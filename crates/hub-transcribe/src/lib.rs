pub mod call_info;
pub mod error;
pub mod job;
pub mod processed_call;
pub mod stt;
pub mod worker;

pub use error::{Result, TranscribeError};
pub use stt::{HttpSttClient, SttClient};
pub use worker::TranscriptionWorker;
