pub mod admin;
pub mod admin_commands;
pub mod callbacks;
pub mod commands;
pub mod config;
pub mod error;
pub mod pending;
pub mod router;
pub mod templates;

#[cfg(test)]
mod test_support;

pub use admin::AdminGate;
pub use config::{Config, ConfigError};
pub use error::BotError;
pub use router::Bot;
