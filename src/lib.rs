// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod paper;
pub mod persistence;
pub mod risk;
pub mod status;
pub mod strategy;

// Re-export commonly used types
pub use crate::config::Settings;
pub use error::{BotError, Result};
pub use execution::{BrokerGateway, Engine, EngineState};
pub use models::*;
pub use strategy::Strategy;
