//! In-Memory Ledger
//!
//! A deterministic stand-in for the token and reserve-asset contracts used by
//! demo mode and tests. Every write mines exactly one block and emits the
//! same events the real contract does. Failures can be injected per call
//! type.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::client::{
    Asset, Block, LedgerClient, LedgerError, LedgerResult, RawLog, TxHash, TxReceipt,
};
use super::events::EventKind;
use crate::common::config::BURN_ADDRESS;
use crate::types::units::{scale, RESERVE_DECIMALS, TOKEN_DECIMALS};

/// Default genesis timestamp (2023-11-14)
const DEFAULT_GENESIS: u64 = 1_700_000_000;

/// Failure applied to the next write call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFailure {
    /// The wallet refuses to sign
    UserRejected,
    /// Submitted and mined, but reverted
    Revert(String),
    /// Gateway unreachable at submission
    Unavailable(String),
}

#[derive(Debug)]
struct LedgerState {
    head: u64,
    genesis_timestamp: u64,
    block_time: u64,
    events: Vec<RawLog>,
    balances: HashMap<(Asset, String), u128>,
    allowances: HashMap<(String, String), u128>,
    total_supply: u128,
    burned: u128,
    deployed_in_loans: u128,
    /// Reserve base units per whole token
    mint_price: u128,
    units: HashMap<String, Vec<String>>,
    next_unit: u64,
    markers: HashMap<String, Vec<String>>,
    receipts: HashMap<TxHash, TxReceipt>,
    next_tx: u64,
    next_loan: u128,
    next_proposal: u128,
    failing_event_block: Option<u64>,
    failing_block_lookup: Option<u64>,
    markers_unavailable: bool,
    next_tx_failure: Option<TxFailure>,
    event_requests: usize,
    submitted: Vec<(String, u128)>,
}

fn key(address: &str) -> String {
    address.to_lowercase()
}

impl LedgerState {
    fn balance(&self, asset: Asset, owner: &str) -> u128 {
        self.balances.get(&(asset, key(owner))).copied().unwrap_or(0)
    }

    fn set_balance(&mut self, asset: Asset, owner: &str, amount: u128) {
        self.balances.insert((asset, key(owner)), amount);
    }

    fn credit(&mut self, asset: Asset, owner: &str, amount: u128) {
        let current = self.balance(asset, owner);
        self.set_balance(asset, owner, current.saturating_add(amount));
    }

    fn circulating(&self, token: &str) -> u128 {
        self.total_supply
            .saturating_sub(self.balance(Asset::Token, token))
            .saturating_sub(self.burned)
    }

    fn push(&mut self, block: u64, kind: EventKind, args: Vec<u128>) {
        let log_index = self
            .events
            .iter()
            .filter(|e| e.block_number == block)
            .count() as u32;
        self.events.push(RawLog {
            block_number: block,
            log_index,
            signature: kind.signature().to_string(),
            args,
        });
        self.head = self.head.max(block);
    }

    fn emit_supply(&mut self, block: u64, token: &str) {
        let held = self.balance(Asset::Token, token);
        self.push(block, EventKind::SupplyUpdated, vec![self.total_supply, held]);
    }

    fn emit_reserve(&mut self, block: u64, token: &str) {
        let actual = self.balance(Asset::Reserve, token);
        self.push(
            block,
            EventKind::ReserveUpdated,
            vec![actual, self.deployed_in_loans],
        );
    }

    fn next_hash(&mut self) -> TxHash {
        self.next_tx += 1;
        TxHash(format!("0x{:064x}", self.next_tx))
    }

    /// Mine a block holding one transaction
    fn mine_tx(&mut self, kind: &str, amount: u128, revert: Option<String>) -> (TxHash, u64) {
        let hash = self.next_hash();
        let block = self.head + 1;
        self.head = block;
        self.submitted.push((kind.to_string(), amount));
        self.receipts.insert(
            hash.clone(),
            TxReceipt {
                tx_hash: hash.clone(),
                block_number: block,
                success: revert.is_none(),
                revert_reason: revert,
            },
        );
        (hash, block)
    }
}

/// Simulated ledger
#[derive(Debug)]
pub struct InMemoryLedger {
    token_address: String,
    wallet: String,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Empty ledger at block 0 for `wallet`
    pub fn new(token_address: impl Into<String>, wallet: impl Into<String>) -> Self {
        Self {
            token_address: token_address.into(),
            wallet: wallet.into(),
            state: Mutex::new(LedgerState {
                head: 0,
                genesis_timestamp: DEFAULT_GENESIS,
                block_time: 2,
                events: Vec::new(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                total_supply: 0,
                burned: 0,
                deployed_in_loans: 0,
                mint_price: scale(RESERVE_DECIMALS),
                units: HashMap::new(),
                next_unit: 1,
                markers: HashMap::new(),
                receipts: HashMap::new(),
                next_tx: 0,
                next_loan: 1,
                next_proposal: 1,
                failing_event_block: None,
                failing_block_lookup: None,
                markers_unavailable: false,
                next_tx_failure: None,
                event_requests: 0,
                submitted: Vec::new(),
            }),
        }
    }

    /// A ledger with a month of hourly-block history for demo runs
    pub fn demo(token_address: impl Into<String>, wallet: impl Into<String>) -> Self {
        let ledger = Self::new(token_address, wallet).with_block_time(DEFAULT_GENESIS, 3_600);
        let one = scale(TOKEN_DECIMALS);

        ledger.set_mint_price(1_000_000);
        ledger.seed_supply(1_000_000 * one, 600_000 * one);
        ledger.deposit_reserve(420_000_000_000);

        for day in 0..30u64 {
            ledger.mine(23);
            match day % 5 {
                0 => {
                    ledger.issue_loan(5_000_000_000 + day as u128 * 100_000_000);
                }
                2 => {
                    ledger.release_supply(2_500 * one);
                    ledger.deposit_reserve(2_650_000_000);
                }
                3 => {
                    ledger.repay_loan(1, 2_000_000_000);
                }
                4 => {
                    ledger.create_proposal();
                }
                _ => {
                    ledger.deposit_reserve(150_000_000);
                }
            }
        }

        let wallet = ledger.wallet.clone();
        ledger.credit(Asset::Reserve, &wallet, 250_000_000);
        ledger.credit(Asset::Token, &wallet, 12 * one);
        ledger.add_units(&wallet, (1..=12).map(|i| format!("demo-{}", i)).collect());
        ledger.mark_unit("demo-2", "governance-vote");
        ledger
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn token_address(&self) -> &str {
        &self.token_address
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    /// Set genesis timestamp and seconds per block
    pub fn with_block_time(self, genesis_timestamp: u64, block_time: u64) -> Self {
        {
            let mut state = self.state();
            state.genesis_timestamp = genesis_timestamp;
            state.block_time = block_time.max(1);
        }
        self
    }

    pub fn set_mint_price(&self, reserve_per_unit: u128) {
        self.state().mint_price = reserve_per_unit;
    }

    /// Adjust a balance without emitting events
    pub fn credit(&self, asset: Asset, owner: &str, amount: u128) {
        self.state().credit(asset, owner, amount);
    }

    pub fn set_allowance(&self, owner: &str, spender: &str, amount: u128) {
        self.state()
            .allowances
            .insert((key(owner), key(spender)), amount);
    }

    /// Advance the head by `blocks` empty blocks
    pub fn mine(&self, blocks: u64) -> u64 {
        let mut state = self.state();
        state.head += blocks;
        state.head
    }

    /// Record an arbitrary event in a new block; returns the block number
    pub fn emit(&self, kind: EventKind, args: Vec<u128>) -> u64 {
        let mut state = self.state();
        let block = state.head + 1;
        state.push(block, kind, args);
        block
    }

    /// Record an event at a specific block
    pub fn emit_at(&self, block: u64, kind: EventKind, args: Vec<u128>) {
        self.state().push(block, kind, args);
    }

    /// Set supply and contract inventory, in token base units
    pub fn seed_supply(&self, total_supply: u128, held_by_contract: u128) -> u64 {
        let token = self.token_address.clone();
        let mut state = self.state();
        state.total_supply = total_supply;
        state.set_balance(Asset::Token, &token, held_by_contract);
        let block = state.head + 1;
        state.emit_supply(block, &token);
        block
    }

    /// Move contract inventory into circulation
    pub fn release_supply(&self, amount: u128) -> u64 {
        let token = self.token_address.clone();
        let mut state = self.state();
        let held = state.balance(Asset::Token, &token);
        state.set_balance(Asset::Token, &token, held.saturating_sub(amount));
        let block = state.head + 1;
        state.emit_supply(block, &token);
        block
    }

    /// Add reserve asset to the contract
    pub fn deposit_reserve(&self, amount: u128) -> u64 {
        let token = self.token_address.clone();
        let mut state = self.state();
        state.credit(Asset::Reserve, &token, amount);
        let block = state.head + 1;
        state.emit_reserve(block, &token);
        block
    }

    pub fn issue_loan(&self, amount: u128) -> u64 {
        let token = self.token_address.clone();
        let mut state = self.state();
        let id = state.next_loan;
        state.next_loan += 1;
        state.deployed_in_loans += amount;
        let block = state.head + 1;
        state.push(block, EventKind::LoanIssued, vec![id, amount]);
        state.emit_reserve(block, &token);
        block
    }

    pub fn repay_loan(&self, id: u128, amount: u128) -> u64 {
        let token = self.token_address.clone();
        let mut state = self.state();
        state.deployed_in_loans = state.deployed_in_loans.saturating_sub(amount);
        let block = state.head + 1;
        state.push(block, EventKind::LoanRepaid, vec![id, amount]);
        state.emit_reserve(block, &token);
        block
    }

    pub fn create_proposal(&self) -> u64 {
        let mut state = self.state();
        let id = state.next_proposal;
        state.next_proposal += 1;
        let block = state.head + 1;
        state.push(block, EventKind::ProposalCreated, vec![id]);
        block
    }

    /// Append whole units owned by `owner`
    pub fn add_units(&self, owner: &str, unit_ids: Vec<String>) {
        self.state()
            .units
            .entry(key(owner))
            .or_default()
            .extend(unit_ids);
    }

    pub fn mark_unit(&self, unit_id: &str, marker: &str) {
        self.state()
            .markers
            .entry(unit_id.to_string())
            .or_default()
            .push(marker.to_string());
    }

    /// Fail any event query whose range covers `block`
    pub fn fail_events_at(&self, block: Option<u64>) {
        self.state().failing_event_block = block;
    }

    /// Fail header lookups for `block`
    pub fn fail_block_lookup_at(&self, block: Option<u64>) {
        self.state().failing_block_lookup = block;
    }

    pub fn set_markers_unavailable(&self, unavailable: bool) {
        self.state().markers_unavailable = unavailable;
    }

    /// Fail the next approve, mint or redeem
    pub fn fail_next_tx(&self, failure: TxFailure) {
        self.state().next_tx_failure = Some(failure);
    }

    /// Number of event queries served
    pub fn event_requests(&self) -> usize {
        self.state().event_requests
    }

    /// Write calls submitted so far, as `(kind, amount)`
    pub fn submitted(&self) -> Vec<(String, u128)> {
        self.state().submitted.clone()
    }

    pub fn head(&self) -> u64 {
        self.state().head
    }

    /// Apply a pending injected failure to a write call
    fn take_failure(state: &mut LedgerState) -> LedgerResult<Option<String>> {
        match state.next_tx_failure.take() {
            None => Ok(None),
            Some(TxFailure::UserRejected) => Err(LedgerError::UserRejected),
            Some(TxFailure::Unavailable(reason)) => Err(LedgerError::Unavailable(reason)),
            Some(TxFailure::Revert(reason)) => Ok(Some(reason)),
        }
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn balance_of(&self, asset: Asset, owner: &str) -> LedgerResult<u128> {
        Ok(self.state().balance(asset, owner))
    }

    async fn allowance(&self, owner: &str, spender: &str) -> LedgerResult<u128> {
        Ok(self
            .state()
            .allowances
            .get(&(key(owner), key(spender)))
            .copied()
            .unwrap_or(0))
    }

    async fn approve(&self, spender: &str, amount: u128) -> LedgerResult<TxHash> {
        let mut state = self.state();
        if let Some(reason) = Self::take_failure(&mut state)? {
            return Ok(state.mine_tx("approve", amount, Some(reason)).0);
        }

        state
            .allowances
            .insert((key(&self.wallet), key(spender)), amount);
        Ok(state.mine_tx("approve", amount, None).0)
    }

    async fn mint(&self, to: &str, amount: u128) -> LedgerResult<TxHash> {
        let token = self.token_address.clone();
        let mut state = self.state();
        if let Some(reason) = Self::take_failure(&mut state)? {
            return Ok(state.mine_tx("mint", amount, Some(reason)).0);
        }

        let one = scale(TOKEN_DECIMALS);
        let units = amount / one;
        let cost = units * state.mint_price;
        let allowance = state
            .allowances
            .get(&(key(&self.wallet), key(&token)))
            .copied()
            .unwrap_or(0);
        let balance = state.balance(Asset::Reserve, &self.wallet);

        let revert = if units == 0 || amount % one != 0 {
            Some("mint amount must be whole units".to_string())
        } else if allowance < cost {
            Some("insufficient allowance".to_string())
        } else if balance < cost {
            Some("insufficient balance".to_string())
        } else {
            None
        };
        if revert.is_some() {
            return Ok(state.mine_tx("mint", amount, revert).0);
        }

        let wallet = self.wallet.clone();
        state.set_balance(Asset::Reserve, &wallet, balance - cost);
        state.credit(Asset::Reserve, &token, cost);
        state
            .allowances
            .insert((key(&wallet), key(&token)), allowance - cost);

        // Sell from contract inventory first, then issue
        let held = state.balance(Asset::Token, &token);
        let from_inventory = held.min(amount);
        state.set_balance(Asset::Token, &token, held - from_inventory);
        state.total_supply += amount - from_inventory;
        state.credit(Asset::Token, to, amount);

        let first = state.next_unit;
        state.next_unit += units as u64;
        let ids = (first..first + units as u64).map(|i| format!("unit-{}", i));
        state.units.entry(key(to)).or_default().extend(ids);

        let (hash, block) = state.mine_tx("mint", amount, None);
        state.emit_supply(block, &token);
        state.emit_reserve(block, &token);
        Ok(hash)
    }

    async fn redeem(&self, amount: u128) -> LedgerResult<TxHash> {
        let token = self.token_address.clone();
        let wallet = self.wallet.clone();
        let mut state = self.state();
        if let Some(reason) = Self::take_failure(&mut state)? {
            return Ok(state.mine_tx("redeem", amount, Some(reason)).0);
        }

        let balance = state.balance(Asset::Token, &wallet);
        let circulating = state.circulating(&token);
        let actual = state.balance(Asset::Reserve, &token);

        let revert = if amount == 0 || balance < amount {
            Some("insufficient balance".to_string())
        } else if circulating == 0 {
            Some("nothing in circulation".to_string())
        } else {
            None
        };
        if revert.is_some() {
            return Ok(state.mine_tx("redeem", amount, revert).0);
        }

        let payout = amount.saturating_mul(actual) / circulating;
        state.set_balance(Asset::Token, &wallet, balance - amount);
        state.credit(Asset::Token, BURN_ADDRESS, amount);
        state.burned += amount;
        state.set_balance(Asset::Reserve, &token, actual - payout.min(actual));
        state.credit(Asset::Reserve, &wallet, payout.min(actual));

        let redeemed_units = (amount / scale(TOKEN_DECIMALS)) as usize;
        let removed: Vec<String> = state
            .units
            .get_mut(&key(&wallet))
            .map(|owned| {
                let n = redeemed_units.min(owned.len());
                owned.drain(..n).collect()
            })
            .unwrap_or_default();
        for id in removed {
            state.markers.remove(&id);
        }

        let (hash, block) = state.mine_tx("redeem", amount, None);
        let burned = state.burned;
        state.push(block, EventKind::TokensBurned, vec![burned]);
        state.emit_reserve(block, &token);

        let circulating = state.circulating(&token);
        if circulating > 0 {
            let price = state.balance(Asset::Reserve, &token) * scale(TOKEN_DECIMALS) / circulating;
            state.push(block, EventKind::RedemptionPriceUpdated, vec![price]);
        }
        Ok(hash)
    }

    async fn get_events(
        &self,
        signatures: &[&str],
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<RawLog>> {
        let mut state = self.state();
        state.event_requests += 1;

        if let Some(block) = state.failing_event_block {
            if (from_block..=to_block).contains(&block) {
                return Err(LedgerError::Unavailable(format!(
                    "event query {}..={} rate limited",
                    from_block, to_block
                )));
            }
        }

        let mut logs: Vec<RawLog> = state
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .filter(|e| signatures.contains(&e.signature.as_str()))
            .cloned()
            .collect();
        logs.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(logs)
    }

    async fn get_block(&self, number: u64) -> LedgerResult<Block> {
        let state = self.state();
        if number > state.head {
            return Err(LedgerError::NotFound(format!("block {}", number)));
        }
        if state.failing_block_lookup == Some(number) {
            return Err(LedgerError::Unavailable(format!("block {} unavailable", number)));
        }

        Ok(Block {
            number,
            timestamp: state.genesis_timestamp + number * state.block_time,
        })
    }

    async fn head_block(&self) -> LedgerResult<u64> {
        Ok(self.state().head)
    }

    async fn total_supply(&self) -> LedgerResult<u128> {
        Ok(self.state().total_supply)
    }

    async fn get_owned_units(&self, owner: &str) -> LedgerResult<Vec<String>> {
        Ok(self
            .state()
            .units
            .get(&key(owner))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_unit_markers(&self, unit_id: &str) -> LedgerResult<Vec<String>> {
        let state = self.state();
        if state.markers_unavailable {
            return Err(LedgerError::Unavailable("marker registry offline".to_string()));
        }
        Ok(state.markers.get(unit_id).cloned().unwrap_or_default())
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> LedgerResult<TxReceipt> {
        self.state()
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("receipt {}", tx_hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0x1000000000000000000000000000000000000001";
    const WALLET: &str = "0x2000000000000000000000000000000000000002";

    fn one() -> u128 {
        scale(TOKEN_DECIMALS)
    }

    #[tokio::test]
    async fn test_mint_moves_reserve_and_tokens() {
        let ledger = InMemoryLedger::new(TOKEN, WALLET);
        ledger.seed_supply(1000 * one(), 500 * one());
        ledger.credit(Asset::Reserve, WALLET, 10_000_000);
        ledger.set_allowance(WALLET, TOKEN, 10_000_000);

        let tx = ledger.mint(WALLET, 3 * one()).await.unwrap();
        let receipt = ledger.wait_for_receipt(&tx).await.unwrap();
        assert!(receipt.success);

        assert_eq!(ledger.balance_of(Asset::Reserve, WALLET).await.unwrap(), 7_000_000);
        assert_eq!(ledger.balance_of(Asset::Reserve, TOKEN).await.unwrap(), 3_000_000);
        assert_eq!(ledger.balance_of(Asset::Token, WALLET).await.unwrap(), 3 * one());
        assert_eq!(ledger.balance_of(Asset::Token, TOKEN).await.unwrap(), 497 * one());
        assert_eq!(ledger.get_owned_units(WALLET).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mint_without_allowance_reverts() {
        let ledger = InMemoryLedger::new(TOKEN, WALLET);
        ledger.credit(Asset::Reserve, WALLET, 10_000_000);

        let tx = ledger.mint(WALLET, one()).await.unwrap();
        let err = ledger.wait_for_receipt(&tx).await.unwrap().into_result();
        assert!(matches!(err, Err(LedgerError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_redeem_burns_and_pays_out() {
        let ledger = InMemoryLedger::new(TOKEN, WALLET);
        ledger.seed_supply(100 * one(), 0);
        ledger.deposit_reserve(110_000_000);
        ledger.credit(Asset::Token, WALLET, 10 * one());
        ledger.add_units(WALLET, vec!["a".to_string(), "b".to_string()]);
        ledger.mark_unit("a", "vote");

        let tx = ledger.redeem(one()).await.unwrap();
        assert!(ledger.wait_for_receipt(&tx).await.unwrap().success);

        assert_eq!(ledger.balance_of(Asset::Token, BURN_ADDRESS).await.unwrap(), one());
        assert_eq!(ledger.balance_of(Asset::Reserve, WALLET).await.unwrap(), 1_100_000);
        assert_eq!(ledger.get_owned_units(WALLET).await.unwrap(), vec!["b".to_string()]);
        assert!(ledger.get_unit_markers("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_queries_and_injected_failures() {
        let ledger = InMemoryLedger::new(TOKEN, WALLET);
        let first = ledger.seed_supply(10, 0);
        ledger.mine(10);
        let second = ledger.create_proposal();

        let sigs = EventKind::all_signatures();
        let logs = ledger.get_events(&sigs, 0, ledger.head()).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].block_number, first);
        assert_eq!(logs[1].block_number, second);

        ledger.fail_events_at(Some(second));
        assert!(ledger.get_events(&sigs, first, first).await.is_ok());
        assert!(ledger.get_events(&sigs, first, second).await.is_err());
        assert_eq!(ledger.event_requests(), 3);

        ledger.fail_next_tx(TxFailure::UserRejected);
        assert!(matches!(
            ledger.approve(TOKEN, 1).await,
            Err(LedgerError::UserRejected)
        ));
        assert!(ledger.approve(TOKEN, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_block_timestamps() {
        let ledger = InMemoryLedger::new(TOKEN, WALLET).with_block_time(1_000, 12);
        ledger.mine(5);

        assert_eq!(ledger.get_block(5).await.unwrap().timestamp, 1_060);
        assert!(matches!(
            ledger.get_block(6).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_demo_ledger_has_history() {
        let ledger = InMemoryLedger::demo(TOKEN, WALLET);
        assert!(ledger.head() > 24 * 29);
        assert!(ledger.total_supply().await.unwrap() > 0);
        assert_eq!(ledger.get_owned_units(WALLET).await.unwrap().len(), 12);
        assert_eq!(ledger.get_unit_markers("demo-2").await.unwrap().len(), 1);
    }
}
