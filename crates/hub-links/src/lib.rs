pub mod error;
pub mod link;

pub use error::{LinkError, Result};
pub use link::{Link, LinkRegistry};
