//! Error types for the band keeper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the band keeper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // Pricing errors
    #[error("Token supply is zero, price band is undefined")]
    DegenerateSupply,

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Negative trade amount: price {price} is on the wrong side of band edge {edge}")]
    NegativeTradeAmount { price: String, edge: String },

    #[error("Fixed-point overflow in {0}")]
    ArithmeticOverflow(&'static str),

    // Remote errors
    #[error("Remote read failed: {0}")]
    RemoteRead(String),

    #[error("Allowance grant to {spender} failed: {reason}")]
    AllowanceGrant { spender: String, reason: String },

    #[error("Swap rejected: {0}")]
    SwapRejected(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error came back from a remote collaborator
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteRead(_) | Error::AllowanceGrant { .. } | Error::SwapRejected(_)
        )
    }

    /// Check if this error means the pass inputs could not produce a band or trade
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            Error::DegenerateSupply
                | Error::DegenerateInput(_)
                | Error::NegativeTradeAmount { .. }
                | Error::ArithmeticOverflow(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
