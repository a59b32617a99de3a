pub mod models;
pub mod telegram;
