//! CDP spammer: autonomous randomized activity generator for a Kava CDP.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! derives the signing wallet, and runs the params→balance→position→submit
//! loop on a fixed interval with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use cdp_spammer::chain::broadcaster::TxBroadcaster;
use cdp_spammer::chain::lcd::LcdClient;
use cdp_spammer::chain::wallet::Wallet;
use cdp_spammer::chain::ActionExecutor;
use cdp_spammer::config::AppConfig;
use cdp_spammer::engine::decision::{DecisionConfig, DecisionEngine, RandomSource, StdRandom};
use cdp_spammer::engine::orchestrator::{CycleContext, CycleOrchestrator};
use cdp_spammer::engine::scheduler::Scheduler;

const BANNER: &str = r#"
  ____ ____  ____    ____
 / ___|  _ \|  _ \  / ___| _ __   __ _ _ __ ___  _ __ ___   ___ _ __
| |   | | | | |_) | \___ \| '_ \ / _` | '_ ` _ \| '_ ` _ \ / _ \ '__|
| |___| |_| |  __/   ___) | |_) | (_| | | | | | | | | | | |  __/ |
 \____|____/|_|     |____/| .__/ \__,_|_| |_| |_|_| |_| |_|\___|_|
                          |_|
  v0.1.0 - randomized CDP activity agent
"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    // Missing required variables end the process here.
    let cfg = AppConfig::load()?;

    println!("{BANNER}");
    info!(
        lcd_url = %cfg.chain.lcd_url,
        chain_id = %cfg.chain.chain_id,
        collateral_denom = %cfg.chain.collateral_denom,
        interval_secs = cfg.tuning.schedule.interval_secs,
        dry_run = cfg.chain.dry_run,
        "CDP spammer starting up"
    );

    // -- Initialise components -------------------------------------------

    let wallet = Arc::new(
        Wallet::from_mnemonic(
            &cfg.chain.mnemonic,
            &cfg.chain.hd_path,
            &cfg.chain.bech32_prefix,
        )
        .context("Failed to load wallet from MNEMONIC")?,
    );
    info!(address = %wallet.address(), hd_path = %cfg.chain.hd_path, "Wallet loaded");

    let lcd = LcdClient::new(&cfg.chain.lcd_url, cfg.tuning.http.timeout())?;

    if cfg.chain.dry_run {
        warn!("DRY_RUN set, transactions will be logged but not broadcast");
    }
    let executor = TxBroadcaster::new(
        lcd.clone(),
        Arc::clone(&wallet),
        cfg.chain.chain_id.clone(),
        cfg.tuning.tx.clone(),
        cfg.chain.dry_run,
    );
    info!(executor = executor.name(), chain_id = %cfg.chain.chain_id, "Executor ready");

    let rng: Box<dyn RandomSource> = match cfg.tuning.decision.seed {
        Some(seed) => {
            info!(seed, "Using seeded random source");
            Box::new(StdRandom::seeded(seed))
        }
        None => Box::new(StdRandom::from_entropy()),
    };

    let orchestrator = Arc::new(CycleOrchestrator::new(
        CycleContext {
            address: wallet.address().to_string(),
            collateral_denom: cfg.chain.collateral_denom.clone(),
        },
        Arc::new(lcd),
        Arc::new(executor),
        DecisionEngine::new(DecisionConfig::from(&cfg.tuning.decision)),
        rng,
    ));

    // -- Main loop -------------------------------------------------------

    let scheduler = Scheduler::new(cfg.tuning.schedule.interval());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let stats = scheduler.run(orchestrator, shutdown).await;
    info!(
        cycles = stats.started,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "CDP spammer shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cdp_spammer=info"));

    let json_logging = std::env::var("SPAMMER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
