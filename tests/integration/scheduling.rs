//! Scheduler behaviour on a paused tokio clock.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use cdp_spammer::engine::decision::{DecisionConfig, DecisionEngine, ScriptedRandom};
use cdp_spammer::engine::orchestrator::{CycleContext, CycleOrchestrator};
use cdp_spammer::engine::scheduler::Scheduler;

use crate::mock_chain::{FailAt, MockChain, DENOM, OWNER};

fn orchestrator(chain: &MockChain) -> Arc<CycleOrchestrator> {
    Arc::new(CycleOrchestrator::new(
        CycleContext {
            address: OWNER.into(),
            collateral_denom: DENOM.into(),
        },
        Arc::new(chain.clone()),
        Arc::new(chain.clone()),
        DecisionEngine::new(DecisionConfig::default()),
        Box::new(ScriptedRandom::new(vec![dec!(0.5)], vec![0])),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_skips_overlapping_ticks() {
    // Ticks every 10s; each submission takes 25s.
    let chain = MockChain::new().with_execute_delay(Duration::from_secs(25));
    let scheduler = Scheduler::new(Duration::from_secs(10));
    let start = tokio::time::Instant::now();

    let shutdown = tokio::time::sleep(Duration::from_secs(45));
    let stats = scheduler.run(orchestrator(&chain), shutdown).await;

    // Ticks at 0, 10, 20, 30, 40: cycles start at 0 and 30.
    assert_eq!(stats.ticks, 5);
    assert_eq!(stats.started, 2);
    assert_eq!(stats.skipped, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(chain.calls().params, 2);

    // Shutdown at 45s waited for the second cycle to finish at 55s.
    assert_eq!(chain.calls().execute, 2);
    assert!(start.elapsed() >= Duration::from_secs(55));
}

#[tokio::test(start_paused = true)]
async fn test_failing_cycles_do_not_stop_scheduler() {
    let chain = MockChain::new();
    chain.fail_at(FailAt::Balance);
    let scheduler = Scheduler::new(Duration::from_secs(60));

    let shutdown = tokio::time::sleep(Duration::from_secs(200));
    let stats = scheduler.run(orchestrator(&chain), shutdown).await;

    // Ticks at 0, 60, 120 and 180.
    assert_eq!(stats.started, 4);
    assert_eq!(stats.failed, 4);
    assert_eq!(chain.calls().balance, 4);
    assert_eq!(chain.calls().position, 0);
    assert_eq!(chain.calls().execute, 0);
}
