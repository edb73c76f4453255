//! Decision engine.
//!
//! Converts one cycle's chain snapshot into exactly one randomized
//! `ActionIntent`. Two modes:
//!
//! - **create** (no CDP yet): lock a random 2–80% of the collateral balance
//!   and draw a random 2–65% of its value as principal.
//! - **manage** (CDP exists): the collateralization ratio against the
//!   threshold picks a pair of actions, and a coin flip picks one of them.
//!
//!   | ratio          | flip = 0 | flip = 1 |
//!   |----------------|----------|----------|
//!   | > threshold    | withdraw | draw     |
//!   | <= threshold   | deposit  | repay    |
//!
//! The engine is pure given its `RandomSource` and never fails.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::DecisionSettings;
use crate::types::{ActionIntent, ActionKind, Coin, ModuleParams, Position};

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Source of the engine's random draws.
pub trait RandomSource: Send {
    /// Uniform draw in `[0, 1)`.
    fn fraction(&mut self) -> Decimal;

    /// Uniform binary draw, `0` or `1`.
    fn coin_flip(&mut self) -> u8;
}

/// `StdRng`-backed source, seeded from entropy or a fixed seed.
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for StdRandom {
    fn fraction(&mut self) -> Decimal {
        let f: f64 = self.rng.gen();
        Decimal::from_f64(f).unwrap_or(Decimal::ZERO)
    }

    fn coin_flip(&mut self) -> u8 {
        self.rng.gen_range(0..2)
    }
}

/// Replays fixed sequences of draws, cycling when a sequence runs out.
/// An empty sequence yields `0`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    fractions: VecDeque<Decimal>,
    flips: VecDeque<u8>,
}

impl ScriptedRandom {
    pub fn new(fractions: Vec<Decimal>, flips: Vec<u8>) -> Self {
        Self {
            fractions: fractions.into(),
            flips: flips.into(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn fraction(&mut self) -> Decimal {
        match self.fractions.pop_front() {
            Some(f) => {
                self.fractions.push_back(f);
                f
            }
            None => Decimal::ZERO,
        }
    }

    fn coin_flip(&mut self) -> u8 {
        match self.flips.pop_front() {
            Some(b) => {
                self.flips.push_back(b);
                b
            }
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Decision engine bounds.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Share of the collateral balance locked on create: `[min, max]`.
    pub collateral_fraction_min: Decimal,
    pub collateral_fraction_max: Decimal,
    /// Share of the locked collateral's value drawn as principal on create.
    pub principal_fraction_min: Decimal,
    pub principal_fraction_max: Decimal,
    /// Power-of-ten exponent of the principal denom's integer unit.
    pub principal_denom_exponent: u32,
    /// Collateralization ratio separating the two manage-mode action pairs.
    pub ratio_threshold: Decimal,
    /// Deposit/withdraw amounts are at most `collateral / divisor`.
    pub collateral_adjust_divisor: u64,
    /// Draw/repay amounts are at most `principal / divisor`.
    pub principal_adjust_divisor: u64,
    /// Cap draws at the headroom left under the debt limit.
    pub clamp_draw_to_debt_limit: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            collateral_fraction_min: dec!(0.02),
            collateral_fraction_max: dec!(0.80),
            principal_fraction_min: dec!(0.02),
            principal_fraction_max: dec!(0.65),
            principal_denom_exponent: 6,
            ratio_threshold: dec!(2.2),
            collateral_adjust_divisor: 10,
            principal_adjust_divisor: 2,
            clamp_draw_to_debt_limit: false,
        }
    }
}

impl From<&DecisionSettings> for DecisionConfig {
    fn from(s: &DecisionSettings) -> Self {
        Self {
            collateral_fraction_min: s.collateral_fraction_min,
            collateral_fraction_max: s.collateral_fraction_max,
            principal_fraction_min: s.principal_fraction_min,
            principal_fraction_max: s.principal_fraction_max,
            principal_denom_exponent: s.principal_denom_exponent,
            ratio_threshold: s.ratio_threshold,
            collateral_adjust_divisor: s.collateral_adjust_divisor,
            principal_adjust_divisor: s.principal_adjust_divisor,
            clamp_draw_to_debt_limit: s.clamp_draw_to_debt_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Create mode: open a CDP with randomized collateral and principal.
    ///
    /// `collateral_balance` is in integer collateral units; it is converted
    /// to human units through `params.conversion_factor`, sampled, valued at
    /// `price`, and both results are truncated back to integer units.
    pub fn decide_create(
        &self,
        params: &ModuleParams,
        price: Decimal,
        collateral_balance: u64,
        rng: &mut dyn RandomSource,
    ) -> ActionIntent {
        let cfg = &self.config;
        let collateral_scale = pow10(params.conversion_factor);
        let principal_scale = pow10(cfg.principal_denom_exponent);

        let available = Decimal::from(collateral_balance) / collateral_scale;
        let collateral_fraction = lerp(
            cfg.collateral_fraction_min,
            cfg.collateral_fraction_max,
            clamp_unit(rng.fraction()),
        );
        let collateral_to_lock = mul(collateral_fraction, available);
        let value_of_collateral = mul(price.max(Decimal::ZERO), collateral_to_lock);

        let principal_fraction = lerp(
            cfg.principal_fraction_min,
            cfg.principal_fraction_max,
            clamp_unit(rng.fraction()),
        );
        let principal_to_lock = mul(mul(principal_fraction, value_of_collateral), principal_scale);

        let collateral_amount = to_amount(mul(collateral_to_lock, collateral_scale));
        let principal_amount = to_amount(principal_to_lock);

        debug!(
            collateral_fraction = %collateral_fraction.round_dp(4),
            principal_fraction = %principal_fraction.round_dp(4),
            price = %price,
            collateral_amount,
            principal_amount,
            "Create decision"
        );

        ActionIntent::create(
            Coin::new(params.collateral_denom.clone(), collateral_amount),
            Coin::new(params.principal_denom.clone(), principal_amount),
        )
    }

    /// Manage mode: nudge an existing CDP's collateral or principal.
    ///
    /// `debt_limit` only bounds draws when `clamp_draw_to_debt_limit` is set.
    pub fn decide_manage(
        &self,
        position: &Position,
        debt_limit: u64,
        rng: &mut dyn RandomSource,
    ) -> ActionIntent {
        let cfg = &self.config;

        let collateral_amount = scaled_share(
            clamp_unit(rng.fraction()),
            position.collateral_amount,
            cfg.collateral_adjust_divisor,
        );
        let mut principal_amount = scaled_share(
            clamp_unit(rng.fraction()),
            position.principal_amount,
            cfg.principal_adjust_divisor,
        );
        let flip = rng.coin_flip() % 2;

        let over_collateralized = position.collateralization_ratio > cfg.ratio_threshold;
        let kind = match (over_collateralized, flip) {
            (true, 0) => ActionKind::Withdraw,
            (true, _) => ActionKind::DrawDebt,
            (false, 0) => ActionKind::Deposit,
            (false, _) => ActionKind::RepayDebt,
        };

        if kind == ActionKind::DrawDebt && cfg.clamp_draw_to_debt_limit {
            let headroom = debt_limit.saturating_sub(position.principal_amount);
            if principal_amount > headroom {
                debug!(principal_amount, headroom, "Draw clamped to debt limit");
                principal_amount = headroom;
            }
        }

        debug!(
            ratio = %position.collateralization_ratio,
            threshold = %cfg.ratio_threshold,
            flip,
            kind = %kind,
            "Manage decision"
        );

        if kind.moves_collateral() {
            ActionIntent::adjust_collateral(kind, position, collateral_amount)
        } else {
            ActionIntent::adjust_principal(kind, position, principal_amount)
        }
    }
}

// ---------------------------------------------------------------------------
// Decimal helpers
// ---------------------------------------------------------------------------

fn pow10(exp: u32) -> Decimal {
    (0..exp).fold(Decimal::ONE, |acc, _| {
        acc.checked_mul(Decimal::TEN).unwrap_or(Decimal::MAX)
    })
}

fn mul(a: Decimal, b: Decimal) -> Decimal {
    a.checked_mul(b).unwrap_or(Decimal::MAX)
}

fn clamp_unit(f: Decimal) -> Decimal {
    f.max(Decimal::ZERO).min(Decimal::ONE)
}

/// `min + t·(max − min)`, clamped to `[0, 1]`.
fn lerp(min: Decimal, max: Decimal, t: Decimal) -> Decimal {
    clamp_unit(min + (max - min) * t)
}

/// `floor(fraction · amount / divisor)`.
fn scaled_share(fraction: Decimal, amount: u64, divisor: u64) -> u64 {
    let share = Decimal::from(amount) / Decimal::from(divisor.max(1));
    to_amount(mul(fraction, share))
}

/// Truncate toward zero into an integer amount, saturating at the bounds.
fn to_amount(d: Decimal) -> u64 {
    d.trunc()
        .max(Decimal::ZERO)
        .to_u64()
        .unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
