//! Reserve Band Keeper Library
//!
//! Keeps a token's market price inside a band derived from its reserve
//! backing by submitting corrective swaps when the price leaves it.

pub mod band;
pub mod cli;
pub mod config;
pub mod error;
pub mod keeper;
pub mod remote;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
