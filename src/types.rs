//! Shared types for the CDP spammer.
//!
//! These types form the snapshot the decision engine works from and the
//! single intent it produces each cycle. Chain clients and the engine both
//! depend on this module, never on each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Chain snapshot
// ---------------------------------------------------------------------------

/// A denom/amount pair in the denom's smallest integer unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u64) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// CDP module parameters for the configured collateral type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleParams {
    pub collateral_denom: String,
    /// Pricefeed market used to value the collateral.
    pub market_id: String,
    pub principal_denom: String,
    /// Protocol-wide ceiling on principal drawn against this collateral type.
    pub debt_limit: u64,
    /// Power-of-ten exponent between human units and integer collateral units.
    pub conversion_factor: u32,
    pub liquidation_ratio: Option<Decimal>,
}

/// Result of the module parameter read: the block height every later read
/// in the cycle is pinned to, plus the matching collateral parameters if the
/// response carried them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsSnapshot {
    pub height: u64,
    pub params: Option<ModuleParams>,
}

/// Wallet holdings and the account metadata needed to sign.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountBalance {
    pub address: String,
    pub coins: BTreeMap<String, u64>,
    pub account_number: u64,
    pub sequence: u64,
}

impl AccountBalance {
    /// Balance of a single denom, `None` if the wallet holds none of it.
    pub fn amount_of(&self, denom: &str) -> Option<u64> {
        self.coins.get(denom).copied()
    }
}

/// The address's collateralized debt position for one collateral denom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub owner: String,
    pub collateral_denom: String,
    pub principal_denom: String,
    pub collateral_amount: u64,
    pub principal_amount: u64,
    /// Collateral value in principal units at the current price.
    pub collateral_value: u64,
    pub collateralization_ratio: Decimal,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CDP #{} ({}{} / {}{}, ratio {})",
            self.id,
            self.collateral_amount,
            self.collateral_denom,
            self.principal_amount,
            self.principal_denom,
            self.collateralization_ratio.round_dp(4),
        )
    }
}

/// Oracle price for a pricefeed market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub market_id: String,
    pub price: Decimal,
    pub height: u64,
}

// ---------------------------------------------------------------------------
// Decision output
// ---------------------------------------------------------------------------

/// The five CDP message kinds the spammer can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    CreatePosition,
    Deposit,
    Withdraw,
    DrawDebt,
    RepayDebt,
}

impl ActionKind {
    pub const ALL: &'static [ActionKind] = &[
        ActionKind::CreatePosition,
        ActionKind::Deposit,
        ActionKind::Withdraw,
        ActionKind::DrawDebt,
        ActionKind::RepayDebt,
    ];

    /// Whether this action moves collateral (as opposed to principal).
    pub fn moves_collateral(&self) -> bool {
        matches!(
            self,
            ActionKind::CreatePosition | ActionKind::Deposit | ActionKind::Withdraw
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::CreatePosition => write!(f, "create"),
            ActionKind::Deposit => write!(f, "deposit"),
            ActionKind::Withdraw => write!(f, "withdraw"),
            ActionKind::DrawDebt => write!(f, "draw"),
            ActionKind::RepayDebt => write!(f, "repay"),
        }
    }
}

/// The single decision a cycle produces. Consumed immediately by the
/// executor and never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub kind: ActionKind,
    pub collateral_denom: String,
    pub principal_denom: String,
    pub collateral_amount: Option<u64>,
    pub principal_amount: Option<u64>,
}

impl ActionIntent {
    pub fn create(collateral: Coin, principal: Coin) -> Self {
        Self {
            kind: ActionKind::CreatePosition,
            collateral_denom: collateral.denom,
            principal_denom: principal.denom,
            collateral_amount: Some(collateral.amount),
            principal_amount: Some(principal.amount),
        }
    }

    /// A deposit or withdraw against an existing position.
    pub fn adjust_collateral(kind: ActionKind, position: &Position, amount: u64) -> Self {
        Self {
            kind,
            collateral_denom: position.collateral_denom.clone(),
            principal_denom: position.principal_denom.clone(),
            collateral_amount: Some(amount),
            principal_amount: None,
        }
    }

    /// A draw or repay against an existing position.
    pub fn adjust_principal(kind: ActionKind, position: &Position, amount: u64) -> Self {
        Self {
            kind,
            collateral_denom: position.collateral_denom.clone(),
            principal_denom: position.principal_denom.clone(),
            collateral_amount: None,
            principal_amount: Some(amount),
        }
    }

    pub fn collateral(&self) -> Option<Coin> {
        self.collateral_amount
            .map(|amount| Coin::new(self.collateral_denom.clone(), amount))
    }

    pub fn principal(&self) -> Option<Coin> {
        self.principal_amount
            .map(|amount| Coin::new(self.principal_denom.clone(), amount))
    }
}

impl fmt::Display for ActionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(c) = self.collateral() {
            write!(f, " collateral={c}")?;
        }
        if let Some(p) = self.principal() {
            write!(f, " principal={p}")?;
        }
        Ok(())
    }
}

/// Receipt returned once a transaction has been handed to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub kind: ActionKind,
    pub dry_run: bool,
    pub submitted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons a cycle ends without a submitted transaction. Each variant names
/// the stage that failed; none of them outlives the cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("module params read failed: {0:#}")]
    Params(#[source] anyhow::Error),

    #[error("collateral params for {denom} missing at height {height}")]
    ParamsMissing { denom: String, height: u64 },

    #[error("balance read failed: {0:#}")]
    Balance(#[source] anyhow::Error),

    #[error("address {0} has no balance")]
    BalanceUnavailable(String),

    #[error("address {address} holds no {denom}")]
    CollateralUnavailable { address: String, denom: String },

    #[error("position read failed at height {height}: {source:#}")]
    Position {
        height: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("price read for {market_id} failed: {source:#}")]
    Price {
        market_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{kind} submission failed: {source:#}")]
    Submission {
        kind: ActionKind,
        #[source]
        source: anyhow::Error,
    },
}

impl CycleError {
    /// Short stage label for structured logs.
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Params(_) | CycleError::ParamsMissing { .. } => "params",
            CycleError::Balance(_)
            | CycleError::BalanceUnavailable(_)
            | CycleError::CollateralUnavailable { .. } => "balance",
            CycleError::Position { .. } => "position",
            CycleError::Price { .. } => "price",
            CycleError::Submission { .. } => "submit",
        }
    }
}

/// Fatal startup errors. The process never schedules a cycle after one.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable not set: {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
