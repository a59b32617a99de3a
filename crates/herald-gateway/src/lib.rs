pub mod api;
pub mod broadcast;
pub mod client;
pub mod send;

pub use api::ChatApi;
pub use broadcast::{BroadcastConfig, BroadcastDispatcher, BroadcastError, BroadcastJob, Tally};
pub use client::TelegramClient;
pub use send::{SendCapability, SendError};
