//! Band module - Pure pricing logic
//!
//! Everything here is deterministic and side-effect free:
//! - Fixed-point amounts (`Wad`)
//! - Floor/ceiling derivation
//! - Breach classification
//! - Corrective trade sizing

pub mod calculator;
pub mod detector;
pub mod sizer;
pub mod wad;

pub use calculator::{PriceBand, PriceBandCalculator, BPS_SCALE};
pub use detector::{detect, BreachState};
pub use sizer::{CorrectiveTrade, TradeDirection, TradeSizer};
pub use wad::Wad;
