pub mod config;
pub mod error;

pub use config::SbkConfig;
pub use error::{SbkError, SbkResult};
