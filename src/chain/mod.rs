//! Chain integrations.
//!
//! Defines the two seams between the decision pipeline and the network:
//! - `ChainStateReader` for point-in-time queries against the LCD
//! - `ActionExecutor` for building, signing and broadcasting one message
//!
//! The concrete implementations talk to a Kava legacy LCD endpoint.

pub mod broadcaster;
pub mod lcd;
pub mod msgs;
pub mod parser;
pub mod wallet;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::types::{AccountBalance, ActionIntent, ParamsSnapshot, Position, PriceQuote, TxReceipt};

/// Read-only view of the chain state a cycle depends on.
///
/// Only `position` has an "absent" outcome that is not an error: `Ok(None)`
/// means the owner has no CDP for that denom yet.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// CDP module parameters for `collateral_denom`, plus the block height
    /// the response was served at.
    async fn module_params(&self, collateral_denom: &str) -> Result<ParamsSnapshot>;

    /// Account holdings. `Ok(None)` when the LCD knows nothing about the address.
    async fn balance(&self, address: &str) -> Result<Option<AccountBalance>>;

    /// The owner's CDP for `collateral_denom` at `height`.
    async fn position(
        &self,
        owner: &str,
        collateral_denom: &str,
        height: u64,
    ) -> Result<Option<Position>>;

    /// Oracle price for `market_id` at `height`.
    async fn price(&self, market_id: &str, height: u64) -> Result<PriceQuote>;
}

/// Turns an intent into one signed, broadcast transaction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, intent: &ActionIntent) -> Result<TxReceipt>;

    /// Executor name for logging.
    fn name(&self) -> &str;
}
