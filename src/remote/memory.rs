//! In-process ledger
//!
//! Simulates the reserve, both tokens and the exchange vault well enough to
//! run complete passes offline. Swaps settle at a fixed spot price and
//! enforce the same preconditions a real vault would: deadline, limits,
//! allowances for both counterparties and balances.
//!
//! Every write attempt is recorded so callers can inspect what a pass did.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::types::{
    Address, AllowanceGrant, Limit, ReserveStatus, SwapInstruction, SwapKind, TxReceipt,
};
use super::{PoolWriter, PriceSource, ReserveReader, TokenReader, TokenWriter};
use crate::band::Wad;
use crate::config::ContractsConfig;
use crate::error::{Error, Result};

/// Initial ledger state
#[derive(Debug, Clone)]
pub struct LedgerSeed {
    pub contracts: ContractsConfig,
    pub pool_id: String,
    pub reserve: ReserveStatus,
    pub ceiling_multiplier_bps: u32,
    pub managed_supply: Wad,
    /// Reference-asset units per managed token
    pub spot_price: Wad,
    /// Opening balances: (token, owner, amount)
    pub balances: Vec<(Address, Address, Wad)>,
}

/// A write the ledger was asked to perform
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    Approve { grant: AllowanceGrant, accepted: bool },
    Swap { instruction: SwapInstruction, accepted: bool },
}

impl LedgerCall {
    pub fn is_swap(&self) -> bool {
        matches!(self, LedgerCall::Swap { .. })
    }

    pub fn is_approve(&self) -> bool {
        matches!(self, LedgerCall::Approve { .. })
    }
}

/// Simulated chain state
pub struct MemoryLedger {
    contracts: ContractsConfig,
    pool_id: String,
    reserve: RwLock<ReserveStatus>,
    ceiling_multiplier_bps: RwLock<u32>,
    spot_price: RwLock<Wad>,
    supplies: DashMap<Address, Wad>,
    /// (token, owner) -> amount
    balances: DashMap<(Address, Address), Wad>,
    /// (token, owner, spender) -> amount
    allowances: DashMap<(Address, Address, Address), Wad>,
    /// spender -> rejection reason
    failing_spenders: DashMap<Address, String>,
    swap_rejection: RwLock<Option<String>>,
    read_failure: RwLock<Option<String>>,
    calls: Mutex<Vec<LedgerCall>>,
    tx_counter: AtomicU64,
    approvals_in_flight: AtomicUsize,
    max_approvals_in_flight: AtomicUsize,
    multiplier_reads: AtomicUsize,
}

/// Decrements the in-flight approval counter even if the caller drops the future
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryLedger {
    pub fn new(seed: LedgerSeed) -> Self {
        let supplies = DashMap::new();
        supplies.insert(seed.contracts.managed_token.clone(), seed.managed_supply);

        let balances = DashMap::new();
        for (token, owner, amount) in seed.balances {
            balances.insert((token, owner), amount);
        }

        Self {
            contracts: seed.contracts,
            pool_id: seed.pool_id,
            reserve: RwLock::new(seed.reserve),
            ceiling_multiplier_bps: RwLock::new(seed.ceiling_multiplier_bps),
            spot_price: RwLock::new(seed.spot_price),
            supplies,
            balances,
            allowances: DashMap::new(),
            failing_spenders: DashMap::new(),
            swap_rejection: RwLock::new(None),
            read_failure: RwLock::new(None),
            calls: Mutex::new(Vec::new()),
            tx_counter: AtomicU64::new(0),
            approvals_in_flight: AtomicUsize::new(0),
            max_approvals_in_flight: AtomicUsize::new(0),
            multiplier_reads: AtomicUsize::new(0),
        }
    }

    pub fn pool_id_value(&self) -> String {
        self.pool_id.clone()
    }

    // Failure injection

    /// Reject every approval naming `spender`
    pub fn fail_approvals_for(&self, spender: &Address, reason: &str) {
        self.failing_spenders.insert(spender.clone(), reason.to_string());
    }

    /// Reject every swap with `reason`
    pub async fn reject_swaps(&self, reason: &str) {
        *self.swap_rejection.write().await = Some(reason.to_string());
    }

    /// Accept swaps again after `reject_swaps`
    pub async fn accept_swaps(&self) {
        *self.swap_rejection.write().await = None;
    }

    /// Fail every read with `reason`
    pub async fn fail_reads(&self, reason: &str) {
        *self.read_failure.write().await = Some(reason.to_string());
    }

    // State access

    pub async fn set_spot_price(&self, price: Wad) {
        *self.spot_price.write().await = price;
    }

    pub async fn set_reserve(&self, status: ReserveStatus) {
        *self.reserve.write().await = status;
    }

    pub fn set_supply(&self, token: &Address, supply: Wad) {
        self.supplies.insert(token.clone(), supply);
    }

    pub fn balance(&self, token: &Address, owner: &Address) -> Wad {
        self.balances
            .get(&(token.clone(), owner.clone()))
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Wad {
        self.allowances
            .get(&(token.clone(), owner.clone(), spender.clone()))
            .map(|a| *a)
            .unwrap_or_default()
    }

    /// All write attempts, in submission order
    pub async fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().await.clone()
    }

    pub async fn swap_attempts(&self) -> usize {
        self.calls.lock().await.iter().filter(|c| c.is_swap()).count()
    }

    pub async fn approve_attempts(&self) -> usize {
        self.calls.lock().await.iter().filter(|c| c.is_approve()).count()
    }

    /// How many times the ceiling multiplier was read
    pub fn multiplier_reads(&self) -> usize {
        self.multiplier_reads.load(Ordering::SeqCst)
    }

    /// Highest number of approvals that were executing at the same time
    pub fn max_concurrent_approvals(&self) -> usize {
        self.max_approvals_in_flight.load(Ordering::SeqCst)
    }

    async fn check_reads(&self) -> Result<()> {
        match self.read_failure.read().await.as_ref() {
            Some(reason) => Err(Error::RemoteRead(reason.clone())),
            None => Ok(()),
        }
    }

    fn next_receipt(&self) -> TxReceipt {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        TxReceipt {
            tx_hash: format!("0x{:064x}", n),
            block_number: Some(n),
        }
    }

    /// Convert `amount` of `from` into the other asset at the spot price
    fn quote(&self, from: &Address, amount: Wad, price: Wad) -> Result<Wad> {
        let quoted = if *from == self.contracts.managed_token {
            amount.checked_mul(price)
        } else {
            amount.checked_div(price)
        };
        quoted.ok_or_else(|| Error::SwapRejected("pool cannot quote this amount".to_string()))
    }

    async fn swap(&self, instruction: &SwapInstruction, expected: SwapKind) -> Result<TxReceipt> {
        let outcome = self.try_swap(instruction, expected).await;
        self.calls.lock().await.push(LedgerCall::Swap {
            instruction: instruction.clone(),
            accepted: outcome.is_ok(),
        });
        outcome
    }

    async fn try_swap(&self, instruction: &SwapInstruction, expected: SwapKind) -> Result<TxReceipt> {
        if let Some(reason) = self.swap_rejection.read().await.as_ref() {
            return Err(Error::SwapRejected(reason.clone()));
        }
        if instruction.kind != expected {
            return Err(Error::SwapRejected("wrong swap kind".to_string()));
        }
        if instruction.pool_id != self.pool_id {
            return Err(Error::SwapRejected(format!("unknown pool {}", instruction.pool_id)));
        }
        if chrono::Utc::now().timestamp() > instruction.deadline {
            return Err(Error::SwapRejected("deadline passed".to_string()));
        }

        let price = *self.spot_price.read().await;
        let (amount_in, amount_out) = match instruction.kind {
            SwapKind::ExactOutput => {
                let amount_in = self.quote(&instruction.asset_out, instruction.amount, price)?;
                (amount_in, instruction.amount)
            }
            SwapKind::ExactInput => {
                let amount_out = self.quote(&instruction.asset_in, instruction.amount, price)?;
                if let Some(min) = instruction.min_output {
                    if amount_out < min {
                        return Err(Error::SwapRejected(format!(
                            "output {} below minimum {}",
                            amount_out, min
                        )));
                    }
                }
                (instruction.amount, amount_out)
            }
        };

        match instruction.limit_for(&instruction.asset_in) {
            Some(Limit::MaxIn(max)) if amount_in > max => {
                return Err(Error::SwapRejected(format!(
                    "input {} exceeds limit {}",
                    amount_in, max
                )));
            }
            _ => {}
        }
        match instruction.limit_for(&instruction.asset_out) {
            Some(Limit::MinOut(min)) if amount_out < min => {
                return Err(Error::SwapRejected(format!(
                    "output {} below limit {}",
                    amount_out, min
                )));
            }
            _ => {}
        }

        let owner = &instruction.funds.sender;
        for spender in [&self.contracts.pool_spender, &self.contracts.vault_spender] {
            let allowed = self.allowance(&instruction.asset_in, owner, spender);
            if allowed < amount_in {
                return Err(Error::SwapRejected(format!(
                    "allowance {} for {} below required {}",
                    allowed,
                    spender.short(),
                    amount_in
                )));
            }
        }

        let balance = self.balance(&instruction.asset_in, owner);
        let remaining = balance.checked_sub(amount_in).ok_or_else(|| {
            Error::SwapRejected(format!("balance {} below required {}", balance, amount_in))
        })?;

        // Settle: debit input, credit output, consume the vault's allowance
        self.balances
            .insert((instruction.asset_in.clone(), owner.clone()), remaining);
        let recipient_key = (
            instruction.asset_out.clone(),
            instruction.funds.recipient.clone(),
        );
        let credited = self
            .balance(&recipient_key.0, &recipient_key.1)
            .checked_add(amount_out)
            .ok_or(Error::ArithmeticOverflow("swap settlement"))?;
        self.balances.insert(recipient_key, credited);

        let allowance_key = (
            instruction.asset_in.clone(),
            owner.clone(),
            self.contracts.vault_spender.clone(),
        );
        let left = self
            .allowance(&allowance_key.0, &allowance_key.1, &allowance_key.2)
            .checked_sub(amount_in)
            .unwrap_or_default();
        self.allowances.insert(allowance_key, left);

        debug!("Ledger settled swap: in {} out {}", amount_in, amount_out);
        Ok(self.next_receipt())
    }
}

#[async_trait]
impl ReserveReader for MemoryLedger {
    async fn reserve_status(&self) -> Result<ReserveStatus> {
        self.check_reads().await?;
        Ok(*self.reserve.read().await)
    }

    async fn ceiling_multiplier_bps(&self) -> Result<u32> {
        self.multiplier_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reads().await?;
        Ok(*self.ceiling_multiplier_bps.read().await)
    }
}

#[async_trait]
impl TokenReader for MemoryLedger {
    async fn total_supply(&self, token: &Address) -> Result<Wad> {
        self.check_reads().await?;
        self.supplies
            .get(token)
            .map(|s| *s)
            .ok_or_else(|| Error::RemoteRead(format!("unknown token {}", token)))
    }

    async fn balance_of(&self, token: &Address, owner: &Address) -> Result<Wad> {
        self.check_reads().await?;
        Ok(self.balance(token, owner))
    }
}

#[async_trait]
impl TokenWriter for MemoryLedger {
    async fn approve(&self, grant: &AllowanceGrant) -> Result<TxReceipt> {
        let now = self.approvals_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.approvals_in_flight);
        self.max_approvals_in_flight.fetch_max(now, Ordering::SeqCst);

        // Give a concurrently issued approval the chance to start
        tokio::task::yield_now().await;

        let rejection = self
            .failing_spenders
            .get(&grant.spender)
            .map(|r| r.value().clone());

        self.calls.lock().await.push(LedgerCall::Approve {
            grant: grant.clone(),
            accepted: rejection.is_none(),
        });

        if let Some(reason) = rejection {
            return Err(Error::AllowanceGrant {
                spender: grant.spender.to_string(),
                reason,
            });
        }

        self.allowances.insert(
            (grant.asset.clone(), grant.owner.clone(), grant.spender.clone()),
            grant.amount,
        );
        Ok(self.next_receipt())
    }
}

#[async_trait]
impl PoolWriter for MemoryLedger {
    async fn pool_id(&self, pool: &Address) -> Result<String> {
        self.check_reads().await?;
        if *pool != self.contracts.pool {
            return Err(Error::RemoteRead(format!("unknown pool {}", pool)));
        }
        Ok(self.pool_id.clone())
    }

    async fn swap_exact_output(&self, instruction: &SwapInstruction) -> Result<TxReceipt> {
        self.swap(instruction, SwapKind::ExactOutput).await
    }

    async fn swap_exact_input(&self, instruction: &SwapInstruction) -> Result<TxReceipt> {
        self.swap(instruction, SwapKind::ExactInput).await
    }
}

#[async_trait]
impl PriceSource for MemoryLedger {
    async fn spot_price(&self) -> Result<Wad> {
        self.check_reads().await?;
        Ok(*self.spot_price.read().await)
    }
}
