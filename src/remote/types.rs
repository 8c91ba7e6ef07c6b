//! Value types exchanged with remote collaborators

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::band::Wad;
use crate::error::{Error, Result};

lazy_static! {
    static ref ADDRESS_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

/// Hex account/contract address, stored lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> String {
        format!("{}..{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !ADDRESS_RE.is_match(s) {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain reserve snapshot, read once per pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveStatus {
    pub total_reserve_value: Wad,
    pub backing_ratio_bps: u32,
}

/// Receipt of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Authorization for `spender` to pull `amount` of `asset` from `owner`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowanceGrant {
    pub owner: Address,
    pub spender: Address,
    pub asset: Address,
    pub amount: Wad,
}

/// Which leg of the swap is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapKind {
    /// Amount names the asset received; the paid amount is solved for
    ExactOutput,
    /// Amount names the asset paid; the received amount is solved for
    ExactInput,
}

/// One hop through a pool, indexing into `SwapInstruction::assets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStep {
    pub pool_id: String,
    pub asset_in_index: usize,
    pub asset_out_index: usize,
    pub amount: Wad,
}

/// Where swap funds come from and go to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsDescriptor {
    pub sender: Address,
    pub recipient: Address,
    pub from_internal_balance: bool,
    pub to_internal_balance: bool,
}

impl FundsDescriptor {
    /// Pay from and receive into the same external account
    pub fn external(owner: &Address) -> Self {
        Self {
            sender: owner.clone(),
            recipient: owner.clone(),
            from_internal_balance: false,
            to_internal_balance: false,
        }
    }
}

/// Per-asset bound the counterparty must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", content = "amount", rename_all = "snake_case")]
pub enum Limit {
    /// At most this much may be pulled in
    MaxIn(Wad),
    /// At least this much must come out
    MinOut(Wad),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLimit {
    pub asset: Address,
    pub limit: Limit,
}

/// Fully specified swap call, built fresh for every trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstruction {
    pub pool_id: String,
    pub kind: SwapKind,
    pub steps: Vec<SwapStep>,
    pub assets: Vec<Address>,
    pub asset_in: Address,
    pub asset_out: Address,
    /// Size of the fixed leg
    pub amount: Wad,
    pub limits: Vec<AssetLimit>,
    /// Only set for exact-input swaps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_output: Option<Wad>,
    pub funds: FundsDescriptor,
    /// Unix seconds after which the counterparty must reject the swap
    pub deadline: i64,
}

impl SwapInstruction {
    /// Look up the bound for `asset`
    pub fn limit_for(&self, asset: &Address) -> Option<Limit> {
        self.limits
            .iter()
            .find(|l| &l.asset == asset)
            .map(|l| l.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        let a: Address = "0xABCDEF0123456789abcdef0123456789ABCDEF01".parse().unwrap();
        assert_eq!(a.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(a.short(), "0xabcd..ef01");

        assert!("0x1234".parse::<Address>().is_err());
        assert!("abcdef0123456789abcdef0123456789abcdef0101".parse::<Address>().is_err());
        assert!("0xZZCDEF0123456789abcdef0123456789ABCDEF01".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_serde() {
        let a: Address =
            serde_json::from_str(r#""0x00000000000000000000000000000000000000aa""#).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            r#""0x00000000000000000000000000000000000000aa""#
        );
        assert!(serde_json::from_str::<Address>(r#""nope""#).is_err());
    }

    #[test]
    fn test_reserve_status_wire_format() {
        let json = r#"{"totalReserveValue":"1000000","backingRatioBps":9500}"#;
        let status: ReserveStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.total_reserve_value, Wad::from_units(1_000_000));
        assert_eq!(status.backing_ratio_bps, 9500);
    }

    #[test]
    fn test_limit_wire_format() {
        let l = Limit::MaxIn(Wad::from_units(2));
        assert_eq!(
            serde_json::to_string(&l).unwrap(),
            r#"{"side":"max_in","amount":"2"}"#
        );
    }
}
