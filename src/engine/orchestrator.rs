//! Cycle orchestrator.
//!
//! Runs one params → balance → position → (price) → decide → submit pass.
//! Reads are strictly sequential and each one gates the next; the position
//! and price reads are pinned to the height returned by the params read.
//! Any failed read aborts the cycle with a `CycleError` naming the stage.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::decision::{DecisionEngine, RandomSource};
use crate::chain::{ActionExecutor, ChainStateReader};
use crate::types::{ActionIntent, CycleError, TxReceipt};

/// Immutable per-process identity every cycle works on behalf of.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub address: String,
    pub collateral_denom: String,
}

/// Which branch of the decision engine a cycle took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Create,
    Manage,
}

/// Summary of a cycle that reached submission.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub height: u64,
    pub mode: CycleMode,
    pub intent: ActionIntent,
    pub receipt: TxReceipt,
}

pub struct CycleOrchestrator {
    context: CycleContext,
    reader: Arc<dyn ChainStateReader>,
    executor: Arc<dyn ActionExecutor>,
    engine: DecisionEngine,
    rng: Mutex<Box<dyn RandomSource>>,
}

impl CycleOrchestrator {
    pub fn new(
        context: CycleContext,
        reader: Arc<dyn ChainStateReader>,
        executor: Arc<dyn ActionExecutor>,
        engine: DecisionEngine,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            context,
            reader,
            executor,
            engine,
            rng: Mutex::new(rng),
        }
    }

    /// Run one full cycle. At most one transaction is submitted; nothing is
    /// retried.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let address = self.context.address.as_str();
        let denom = self.context.collateral_denom.as_str();

        // 1. Module params, which also fix the height for later reads
        let snapshot = self
            .reader
            .module_params(denom)
            .await
            .map_err(CycleError::Params)?;
        let height = snapshot.height;
        let params = snapshot.params.ok_or_else(|| {
            warn!(denom, height, "CDP module params carry no collateral params");
            CycleError::ParamsMissing {
                denom: denom.to_string(),
                height,
            }
        })?;
        debug!(
            height,
            market_id = %params.market_id,
            principal_denom = %params.principal_denom,
            conversion_factor = params.conversion_factor,
            debt_limit = params.debt_limit,
            liquidation_ratio = ?params.liquidation_ratio,
            "Module params loaded"
        );

        // 2. Account balance
        let balance = self
            .reader
            .balance(address)
            .await
            .map_err(CycleError::Balance)?
            .ok_or_else(|| CycleError::BalanceUnavailable(address.to_string()))?;

        // 3. Collateral holdings
        let collateral_balance =
            balance
                .amount_of(denom)
                .ok_or_else(|| CycleError::CollateralUnavailable {
                    address: address.to_string(),
                    denom: denom.to_string(),
                })?;
        debug!(collateral_balance, denom, "Balance loaded");

        // 4. Position, then decide
        let position = self
            .reader
            .position(address, denom, height)
            .await
            .map_err(|source| CycleError::Position { height, source })?;

        let (mode, intent) = match position {
            None => {
                let quote = self
                    .reader
                    .price(&params.market_id, height)
                    .await
                    .map_err(|source| CycleError::Price {
                        market_id: params.market_id.clone(),
                        source,
                    })?;
                info!(
                    height,
                    market_id = %quote.market_id,
                    price = %quote.price,
                    collateral_balance,
                    "No CDP found, creating"
                );
                let mut rng = self.rng.lock().await;
                let intent = self.engine.decide_create(
                    &params,
                    quote.price,
                    collateral_balance,
                    rng.as_mut(),
                );
                (CycleMode::Create, intent)
            }
            Some(position) => {
                info!(
                    height,
                    cdp_id = position.id,
                    collateral_value = position.collateral_value,
                    ratio = %position.collateralization_ratio,
                    "Managing CDP"
                );
                let mut rng = self.rng.lock().await;
                let intent = self
                    .engine
                    .decide_manage(&position, params.debt_limit, rng.as_mut());
                (CycleMode::Manage, intent)
            }
        };

        // 5. Submit
        info!(intent = %intent, "Submitting");
        let receipt = self
            .executor
            .execute(&intent)
            .await
            .map_err(|source| CycleError::Submission {
                kind: intent.kind,
                source,
            })?;

        Ok(CycleReport {
            height,
            mode,
            intent,
            receipt,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
