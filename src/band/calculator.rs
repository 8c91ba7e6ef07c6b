//! Floor and ceiling price derivation from reserve backing

use serde::Serialize;
use std::fmt;

use super::wad::Wad;
use crate::error::{Error, Result};

/// Basis-point denominator (10_000 bps = 1.0x)
pub const BPS_SCALE: u32 = 10_000;

/// Acceptable trading band for the managed token, in reference-asset units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBand {
    /// Fair-value price implied by reserves / supply
    pub floor: Wad,
    /// Floor scaled by the ceiling multiplier
    pub ceiling: Wad,
}

impl fmt::Display for PriceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.floor, self.ceiling)
    }
}

/// Computes the price band for one pass
#[derive(Debug, Clone, Copy)]
pub struct PriceBandCalculator {
    bps_scale: u32,
}

impl PriceBandCalculator {
    pub fn new(bps_scale: u32) -> Self {
        Self { bps_scale }
    }

    /// `floor = reserve / supply`, `ceiling = floor * multiplier / scale`
    pub fn compute_band(
        &self,
        reserve_value: Wad,
        token_supply: Wad,
        ceiling_multiplier_bps: u32,
    ) -> Result<PriceBand> {
        if token_supply.is_zero() {
            return Err(Error::DegenerateSupply);
        }
        if self.bps_scale == 0 {
            return Err(Error::DegenerateInput("basis-point scale is zero".to_string()));
        }

        let floor = reserve_value
            .checked_div(token_supply)
            .ok_or(Error::ArithmeticOverflow("floor"))?;
        let ceiling = floor
            .mul_bps(ceiling_multiplier_bps, self.bps_scale)
            .ok_or(Error::ArithmeticOverflow("ceiling"))?;

        Ok(PriceBand { floor, ceiling })
    }
}

impl Default for PriceBandCalculator {
    fn default() -> Self {
        Self::new(BPS_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    fn wad(s: &str) -> Wad {
        s.parse().unwrap()
    }

    #[test]
    fn test_floor_is_exact_quotient() {
        let calc = PriceBandCalculator::default();
        let cases = [
            ("1000000", "2000000"),
            ("1", "3"),
            ("123456.789", "7"),
            ("0.000000000000000001", "1000000000"),
            ("98765432109876543210.5", "12345.000000000000000001"),
        ];

        for (r, s) in cases {
            let (r, s) = (wad(r), wad(s));
            let band = calc.compute_band(r, s, BPS_SCALE).unwrap();
            let expected = r.raw() * U256::exp10(18) / s.raw();
            assert_eq!(band.floor.raw(), expected, "floor mismatch for {} / {}", r, s);
            // Repeated passes give the same bits
            assert_eq!(band, calc.compute_band(r, s, BPS_SCALE).unwrap());
        }
    }

    #[test]
    fn test_ceiling_not_below_floor_for_multiplier_at_least_one() {
        let calc = PriceBandCalculator::default();
        for m in [10_000, 10_001, 12_500, 15_000, 20_000, 100_000] {
            for (r, s) in [("1000000", "2000000"), ("1", "3"), ("0.000000000000000007", "3")] {
                let band = calc.compute_band(wad(r), wad(s), m).unwrap();
                assert!(band.ceiling >= band.floor, "m={} r={} s={}", m, r, s);
            }
        }
    }

    #[test]
    fn test_zero_supply_is_degenerate() {
        let calc = PriceBandCalculator::default();
        for m in [0, 10_000, 15_000] {
            for r in ["0", "1", "1000000"] {
                let err = calc.compute_band(wad(r), Wad::ZERO, m).unwrap_err();
                assert!(matches!(err, Error::DegenerateSupply));
            }
        }
    }

    #[test]
    fn test_scenario_band() {
        let calc = PriceBandCalculator::default();
        let band = calc
            .compute_band(wad("1000000"), wad("2000000"), 15_000)
            .unwrap();
        assert_eq!(band.floor, wad("0.5"));
        assert_eq!(band.ceiling, wad("0.75"));
        assert_eq!(band.to_string(), "[0.5, 0.75]");
    }

    #[test]
    fn test_zero_scale_rejected() {
        let calc = PriceBandCalculator::new(0);
        assert!(calc.compute_band(wad("1"), wad("1"), 10_000).is_err());
    }
}
