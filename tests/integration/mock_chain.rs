//! Mock chain for integration testing.
//!
//! Provides a deterministic `ChainStateReader` + `ActionExecutor` that
//! serves configurable params, balances, positions and prices, records
//! every call, and applies submitted intents to its own CDP state, all
//! in-memory with no network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdp_spammer::chain::{ActionExecutor, ChainStateReader};
use cdp_spammer::types::*;

pub const OWNER: &str = "kava1owner";
pub const DENOM: &str = "bnb";
pub const HEIGHT: u64 = 5000;

/// Stage at which the mock should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Params,
    Balance,
    Position,
    Price,
    Execute,
}

/// Per-method call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub params: u32,
    pub balance: u32,
    pub position: u32,
    pub price: u32,
    pub execute: u32,
}

struct State {
    params: Option<ModuleParams>,
    balance: Option<AccountBalance>,
    position: Option<Position>,
    price: Decimal,
    /// Ratio assigned to a CDP opened through `execute`.
    opened_ratio: Decimal,
    fail_at: Option<FailAt>,
    calls: Calls,
    /// Heights the position and price reads were pinned to.
    pinned_heights: Vec<u64>,
    executed: Vec<ActionIntent>,
}

/// A mock chain for deterministic testing.
///
/// Clones share state, so one copy can be handed to the orchestrator as
/// reader and another as executor while the test inspects a third.
#[derive(Clone)]
pub struct MockChain {
    state: Arc<Mutex<State>>,
    execute_delay: Option<Duration>,
}

impl MockChain {
    /// A chain where `OWNER` holds 1000 `bnb` and has no CDP, the
    /// conversion factor is 6 and the price is 2.0.
    pub fn new() -> Self {
        let params = ModuleParams {
            collateral_denom: DENOM.into(),
            market_id: "bnb:usd".into(),
            principal_denom: "usdx".into(),
            debt_limit: 2_000_000_000,
            conversion_factor: 6,
            liquidation_ratio: Some(dec!(1.5)),
        };
        let balance = AccountBalance {
            address: OWNER.into(),
            coins: BTreeMap::from([(DENOM.to_string(), 1000), ("ukava".to_string(), 10_000)]),
            account_number: 12,
            sequence: 0,
        };
        Self {
            state: Arc::new(Mutex::new(State {
                params: Some(params),
                balance: Some(balance),
                position: None,
                price: dec!(2.0),
                opened_ratio: dec!(3.0),
                fail_at: None,
                calls: Calls::default(),
                pinned_heights: Vec::new(),
                executed: Vec::new(),
            })),
            execute_delay: None,
        }
    }

    /// Make `execute` take `delay` of (tokio) time before returning.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn fail_at(&self, stage: FailAt) {
        self.state.lock().unwrap().fail_at = Some(stage);
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail_at = None;
    }

    pub fn remove_params(&self) {
        self.state.lock().unwrap().params = None;
    }

    pub fn remove_balance(&self) {
        self.state.lock().unwrap().balance = None;
    }

    pub fn set_position(&self, position: Position) {
        self.state.lock().unwrap().position = Some(position);
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls
    }

    pub fn pinned_heights(&self) -> Vec<u64> {
        self.state.lock().unwrap().pinned_heights.clone()
    }

    pub fn executed(&self) -> Vec<ActionIntent> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn position_snapshot(&self) -> Option<Position> {
        self.state.lock().unwrap().position.clone()
    }

    fn check(state: &State, stage: FailAt) -> Result<()> {
        if state.fail_at == Some(stage) {
            Err(anyhow!("mock {stage:?} failure"))
        } else {
            Ok(())
        }
    }

    /// Apply a submitted intent to the in-memory CDP.
    fn apply(state: &mut State, intent: &ActionIntent) -> Result<()> {
        let collateral = intent.collateral_amount.unwrap_or(0);
        let principal = intent.principal_amount.unwrap_or(0);

        if intent.kind == ActionKind::CreatePosition {
            if state.position.is_some() {
                return Err(anyhow!("cdp already exists"));
            }
            state.position = Some(Position {
                id: 1,
                owner: OWNER.into(),
                collateral_denom: intent.collateral_denom.clone(),
                principal_denom: intent.principal_denom.clone(),
                collateral_amount: collateral,
                principal_amount: principal,
                collateral_value: principal * 3,
                collateralization_ratio: state.opened_ratio,
            });
            return Ok(());
        }

        let position = state
            .position
            .as_mut()
            .ok_or_else(|| anyhow!("cdp not found"))?;
        match intent.kind {
            ActionKind::Deposit => position.collateral_amount += collateral,
            ActionKind::Withdraw => {
                position.collateral_amount = position
                    .collateral_amount
                    .checked_sub(collateral)
                    .ok_or_else(|| anyhow!("withdraw exceeds collateral"))?
            }
            ActionKind::DrawDebt => position.principal_amount += principal,
            ActionKind::RepayDebt => {
                position.principal_amount = position.principal_amount.saturating_sub(principal)
            }
            ActionKind::CreatePosition => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ChainStateReader for MockChain {
    async fn module_params(&self, _collateral_denom: &str) -> Result<ParamsSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.params += 1;
        Self::check(&state, FailAt::Params)?;
        Ok(ParamsSnapshot {
            height: HEIGHT,
            params: state.params.clone(),
        })
    }

    async fn balance(&self, _address: &str) -> Result<Option<AccountBalance>> {
        let mut state = self.state.lock().unwrap();
        state.calls.balance += 1;
        Self::check(&state, FailAt::Balance)?;
        Ok(state.balance.clone())
    }

    async fn position(
        &self,
        owner: &str,
        collateral_denom: &str,
        height: u64,
    ) -> Result<Option<Position>> {
        let mut state = self.state.lock().unwrap();
        state.calls.position += 1;
        state.pinned_heights.push(height);
        Self::check(&state, FailAt::Position)?;
        Ok(state
            .position
            .clone()
            .filter(|p| p.owner == owner && p.collateral_denom == collateral_denom))
    }

    async fn price(&self, market_id: &str, height: u64) -> Result<PriceQuote> {
        let mut state = self.state.lock().unwrap();
        state.calls.price += 1;
        state.pinned_heights.push(height);
        Self::check(&state, FailAt::Price)?;
        Ok(PriceQuote {
            market_id: market_id.to_string(),
            price: state.price,
            height,
        })
    }
}

#[async_trait]
impl ActionExecutor for MockChain {
    async fn execute(&self, intent: &ActionIntent) -> Result<TxReceipt> {
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.execute += 1;
        Self::check(&state, FailAt::Execute)?;
        Self::apply(&mut state, intent)?;
        state.executed.push(intent.clone());

        Ok(TxReceipt {
            tx_hash: format!("MOCK{}", state.executed.len()),
            kind: intent.kind,
            dry_run: false,
            submitted_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
