//! Corrective trade sizing
//!
//! A breach is corrected by trading the relative distance between the
//! current price and the violated band edge:
//! - below floor: `(floor - price) / price`, buy the managed token
//! - above ceiling: `(price - ceiling) / price`, sell the managed token
//!
//! A rounding buffer is added to the truncated quotient so the trade never
//! undershoots the edge.

use serde::Serialize;
use std::fmt;

use super::calculator::PriceBand;
use super::detector::BreachState;
use super::wad::Wad;
use crate::error::{Error, Result};

/// Side of the corrective trade, from the managed token's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    BuyManagedToken,
    SellManagedToken,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::BuyManagedToken => f.write_str("buy"),
            TradeDirection::SellManagedToken => f.write_str("sell"),
        }
    }
}

/// Trade that moves the price back toward the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorrectiveTrade {
    pub direction: TradeDirection,
    /// Managed-token amount, always > 0
    pub amount: Wad,
}

/// Sizes corrective trades with a fixed rounding buffer
#[derive(Debug, Clone, Copy)]
pub struct TradeSizer {
    buffer: Wad,
}

impl TradeSizer {
    /// `buffer_units` is in raw 1e-18 units and must be at least 1
    pub fn new(buffer_units: u64) -> Self {
        Self {
            buffer: Wad::from_raw_u128(buffer_units.max(1) as u128),
        }
    }

    pub fn buffer(&self) -> Wad {
        self.buffer
    }

    /// Size the trade for `breach`. Returns `None` when there is nothing to correct.
    pub fn size(
        &self,
        breach: BreachState,
        current_price: Wad,
        band: &PriceBand,
    ) -> Result<Option<CorrectiveTrade>> {
        let (direction, distance) = match breach {
            BreachState::NoBreach => return Ok(None),
            BreachState::BelowFloor => (
                TradeDirection::BuyManagedToken,
                band.floor.checked_sub(current_price).ok_or_else(|| {
                    Error::NegativeTradeAmount {
                        price: current_price.to_string(),
                        edge: band.floor.to_string(),
                    }
                })?,
            ),
            BreachState::AboveCeiling => (
                TradeDirection::SellManagedToken,
                current_price.checked_sub(band.ceiling).ok_or_else(|| {
                    Error::NegativeTradeAmount {
                        price: current_price.to_string(),
                        edge: band.ceiling.to_string(),
                    }
                })?,
            ),
        };

        if current_price.is_zero() {
            return Err(Error::DegenerateInput(
                "current price is zero, trade size is undefined".to_string(),
            ));
        }

        let amount = distance
            .checked_div(current_price)
            .and_then(|q| q.checked_add(self.buffer))
            .ok_or(Error::ArithmeticOverflow("trade size"))?;

        Ok(Some(CorrectiveTrade { direction, amount }))
    }
}

impl Default for TradeSizer {
    fn default() -> Self {
        Self::new(1)
    }
}
