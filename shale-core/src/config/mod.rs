//! Configuration management

mod loader;
mod types;

pub use self::loader::ConfigLoader;
pub use self::types::{LoggingConfig, ShaleConfig};
