//! End-to-end cycles through the orchestrator against `MockChain`.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use cdp_spammer::chain::broadcaster::TxBroadcaster;
use cdp_spammer::chain::lcd::LcdClient;
use cdp_spammer::chain::wallet::Wallet;
use cdp_spammer::config::TxConfig;
use cdp_spammer::engine::decision::{DecisionConfig, DecisionEngine, ScriptedRandom};
use cdp_spammer::engine::orchestrator::{CycleContext, CycleMode, CycleOrchestrator};
use cdp_spammer::types::*;

use crate::mock_chain::{FailAt, MockChain, DENOM, HEIGHT, OWNER};

fn context() -> CycleContext {
    CycleContext {
        address: OWNER.into(),
        collateral_denom: DENOM.into(),
    }
}

fn orchestrator(chain: &MockChain, rng: ScriptedRandom) -> CycleOrchestrator {
    CycleOrchestrator::new(
        context(),
        Arc::new(chain.clone()),
        Arc::new(chain.clone()),
        DecisionEngine::new(DecisionConfig::default()),
        Box::new(rng),
    )
}

fn open_position(ratio: rust_decimal::Decimal) -> Position {
    Position {
        id: 9,
        owner: OWNER.into(),
        collateral_denom: DENOM.into(),
        principal_denom: "usdx".into(),
        collateral_amount: 20_000,
        principal_amount: 4_000,
        collateral_value: 8_000,
        collateralization_ratio: ratio,
    }
}

#[tokio::test]
async fn test_first_cycle_creates_cdp() {
    let chain = MockChain::new();
    let orch = orchestrator(&chain, ScriptedRandom::new(vec![dec!(0.5)], vec![]));

    let report = assert_ok!(orch.run_cycle().await);

    assert_eq!(report.mode, CycleMode::Create);
    assert_eq!(report.intent.kind, ActionKind::CreatePosition);
    assert_eq!(report.intent.collateral(), Some(Coin::new("bnb", 410)));
    assert_eq!(report.intent.principal(), Some(Coin::new("usdx", 274)));
    assert_eq!(report.receipt.tx_hash, "MOCK1");

    let calls = chain.calls();
    assert_eq!(calls.price, 1);
    assert_eq!(calls.execute, 1);
    // Position and price both read at the params height.
    assert_eq!(chain.pinned_heights(), vec![HEIGHT, HEIGHT]);
}

#[tokio::test]
async fn test_second_cycle_manages_created_cdp() {
    let chain = MockChain::new();
    let orch = orchestrator(&chain, ScriptedRandom::new(vec![dec!(0.5)], vec![1]));

    orch.run_cycle().await.unwrap();
    let report = orch.run_cycle().await.unwrap();

    // Opened at ratio 3.0, above the threshold, flip 1: draw debt.
    assert_eq!(report.mode, CycleMode::Manage);
    assert_eq!(report.intent.kind, ActionKind::DrawDebt);
    assert_eq!(report.intent.principal_amount, Some(68));

    assert_eq!(chain.calls().price, 1);
    assert_eq!(chain.position_snapshot().unwrap().principal_amount, 274 + 68);
}

#[tokio::test]
async fn test_under_threshold_deposits() {
    let chain = MockChain::new();
    chain.set_position(open_position(dec!(1.9)));
    let orch = orchestrator(&chain, ScriptedRandom::new(vec![dec!(0.5)], vec![0]));

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.intent.kind, ActionKind::Deposit);
    assert_eq!(report.intent.collateral_amount, Some(1_000));
    assert_eq!(chain.calls().price, 0);
    assert_eq!(chain.position_snapshot().unwrap().collateral_amount, 21_000);
}

#[tokio::test]
async fn test_manage_amounts_stay_within_bounds() {
    let chain = MockChain::new();
    chain.set_position(open_position(dec!(2.5)));
    let fractions = vec![dec!(0), dec!(0.25), dec!(0.999)];
    let orch = orchestrator(&chain, ScriptedRandom::new(fractions, vec![0, 1]));

    for _ in 0..6 {
        let position = chain.position_snapshot().unwrap();
        let report = orch.run_cycle().await.unwrap();
        match report.intent.kind {
            ActionKind::Withdraw => {
                assert!(report.intent.collateral_amount.unwrap() <= position.collateral_amount / 10)
            }
            ActionKind::DrawDebt => {
                assert!(report.intent.principal_amount.unwrap() <= position.principal_amount / 2)
            }
            other => panic!("unexpected {other} above threshold"),
        }
    }
    assert_eq!(chain.calls().execute, 6);
}

#[tokio::test]
async fn test_undefined_balance_skips_rest_of_cycle() {
    let chain = MockChain::new();
    chain.remove_balance();
    let orch = orchestrator(&chain, ScriptedRandom::default());

    let err = assert_err!(orch.run_cycle().await);

    assert_eq!(err.stage(), "balance");
    let calls = chain.calls();
    assert_eq!(calls.params, 1);
    assert_eq!(calls.balance, 1);
    assert_eq!(calls.position, 0);
    assert_eq!(calls.price, 0);
    assert_eq!(calls.execute, 0);
}

#[tokio::test]
async fn test_missing_params_skips_rest_of_cycle() {
    let chain = MockChain::new();
    chain.remove_params();
    let orch = orchestrator(&chain, ScriptedRandom::default());

    let err = orch.run_cycle().await.unwrap_err();

    assert!(matches!(err, CycleError::ParamsMissing { height: HEIGHT, .. }));
    assert_eq!(chain.calls().balance, 0);
}

#[tokio::test]
async fn test_position_failure_never_creates() {
    let chain = MockChain::new();
    chain.fail_at(FailAt::Position);
    let orch = orchestrator(&chain, ScriptedRandom::default());

    let err = orch.run_cycle().await.unwrap_err();

    assert_eq!(err.stage(), "position");
    assert_eq!(chain.calls().price, 0);
    assert_eq!(chain.calls().execute, 0);
}

#[tokio::test]
async fn test_price_failure_aborts() {
    let chain = MockChain::new();
    chain.fail_at(FailAt::Price);
    let orch = orchestrator(&chain, ScriptedRandom::default());

    let err = orch.run_cycle().await.unwrap_err();

    assert!(matches!(err, CycleError::Price { ref market_id, .. } if market_id == "bnb:usd"));
    assert_eq!(chain.calls().execute, 0);
}

#[tokio::test]
async fn test_rejected_submission_is_not_retried() {
    let chain = MockChain::new();
    chain.fail_at(FailAt::Execute);
    let orch = orchestrator(&chain, ScriptedRandom::new(vec![dec!(0.5)], vec![]));

    let err = orch.run_cycle().await.unwrap_err();
    assert_eq!(err.stage(), "submit");
    assert_eq!(chain.calls().execute, 1);
    assert!(chain.executed().is_empty());

    // Next cycle starts from scratch and succeeds.
    chain.clear_failure();
    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.intent.kind, ActionKind::CreatePosition);
    assert_eq!(chain.calls().params, 2);
    assert_eq!(chain.executed().len(), 1);
}

#[tokio::test]
async fn test_dry_run_broadcaster_leaves_chain_untouched() {
    let chain = MockChain::new();
    let key = k256::ecdsa::SigningKey::from_slice(&[9u8; 32]).unwrap();
    let wallet = Arc::new(Wallet::from_signing_key(key, "kava").unwrap());
    let lcd = LcdClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    let broadcaster = TxBroadcaster::new(lcd, wallet, "kava-testnet".into(), TxConfig::default(), true);

    let orch = CycleOrchestrator::new(
        context(),
        Arc::new(chain.clone()),
        Arc::new(broadcaster),
        DecisionEngine::new(DecisionConfig::default()),
        Box::new(ScriptedRandom::new(vec![dec!(0.5)], vec![])),
    );

    let report = orch.run_cycle().await.unwrap();

    assert!(report.receipt.dry_run);
    assert!(report.receipt.tx_hash.starts_with("dry-run-"));
    assert_eq!(chain.calls().execute, 0);
    assert!(chain.position_snapshot().is_none());
}
