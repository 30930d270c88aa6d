use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::state_machine::StateKind;

#[derive(Debug, Error)]
pub enum QuotatoError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: StateKind, to: StateKind },

    #[error("Contact initiation failed: {0}")]
    ContactInitiation(String),

    #[error("Reply classification failed: {0}")]
    Classification(String),

    #[error("Vendor discovery failed: {0}")]
    Discovery(String),

    #[error("Vendor cache error: {0}")]
    Persistence(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = QuotatoError> = std::result::Result<T, E>;
