use thiserror::Error;

use crate::execution::gateway::GatewayError;
use crate::persistence::StoreError;

/// Errors surfaced by the engine
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("none of the configured symbols are available")]
    NoSymbols,

    #[error("invalid bar data for {symbol}: {reason}")]
    BadBars { symbol: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BotError>;
