//! Breach classification of the current price against the band

use serde::Serialize;
use std::fmt;

use super::calculator::PriceBand;
use super::wad::Wad;

/// Where the current price sits relative to the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachState {
    NoBreach,
    BelowFloor,
    AboveCeiling,
}

impl BreachState {
    pub fn is_breach(&self) -> bool {
        !matches!(self, BreachState::NoBreach)
    }
}

impl fmt::Display for BreachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreachState::NoBreach => "in band",
            BreachState::BelowFloor => "below floor",
            BreachState::AboveCeiling => "above ceiling",
        };
        f.write_str(s)
    }
}

/// Classify `current_price` against `band`.
///
/// The floor check runs first, so a band whose ceiling sits below its floor
/// still reports `BelowFloor` for prices under the floor.
pub fn detect(current_price: Wad, band: &PriceBand) -> BreachState {
    if current_price < band.floor {
        BreachState::BelowFloor
    } else if current_price > band.ceiling {
        BreachState::AboveCeiling
    } else {
        BreachState::NoBreach
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(s: &str) -> Wad {
        s.parse().unwrap()
    }

    fn band(floor: &str, ceiling: &str) -> PriceBand {
        PriceBand {
            floor: wad(floor),
            ceiling: wad(ceiling),
        }
    }

    #[test]
    fn test_scenarios() {
        let b = band("0.5", "0.75");
        assert_eq!(detect(wad("0.4"), &b), BreachState::BelowFloor);
        assert_eq!(detect(wad("0.9"), &b), BreachState::AboveCeiling);
        assert_eq!(detect(wad("0.6"), &b), BreachState::NoBreach);
    }

    #[test]
    fn test_edges_are_in_band() {
        let b = band("0.5", "0.75");
        assert_eq!(detect(wad("0.5"), &b), BreachState::NoBreach);
        assert_eq!(detect(wad("0.75"), &b), BreachState::NoBreach);
        assert_eq!(
            detect(wad("0.499999999999999999"), &b),
            BreachState::BelowFloor
        );
        assert_eq!(
            detect(wad("0.750000000000000001"), &b),
            BreachState::AboveCeiling
        );
    }

    #[test]
    fn test_floor_takes_precedence_on_inverted_band() {
        // multiplier below 1.0x puts the ceiling under the floor
        let b = band("0.5", "0.25");
        assert_eq!(detect(wad("0.3"), &b), BreachState::BelowFloor);
        assert_eq!(detect(wad("0.6"), &b), BreachState::AboveCeiling);
    }

    #[test]
    fn test_zero_price_and_zero_band() {
        assert_eq!(detect(Wad::ZERO, &band("0", "0")), BreachState::NoBreach);
        assert_eq!(detect(Wad::ZERO, &band("0.5", "0.75")), BreachState::BelowFloor);
        assert!(BreachState::BelowFloor.is_breach());
        assert!(!BreachState::NoBreach.is_breach());
    }
}
