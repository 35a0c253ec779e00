//! Copy-trading event pipeline — monitors a configured set of leader
//! accounts, deduplicates their trades, fans them out round-robin to a pool
//! of worker executors, and mirrors each qualifying trade (paper or live).

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use copytrader::config::Config;
use copytrader::pipeline::{
    executor::{Executor, ExecutorConfig},
    external::OrderSubmission,
    monitor::{Monitor, PolymarketActivityFeed},
    paper::PaperTrader,
    registry::{WorkerHandle, WorkerMessage},
    PolymarketBalanceClient, PolymarketPositionsClient,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copytrader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Stand-in for the live CLOB order-submission client named in spec §6.
/// Out of scope: sizing/pricing policy and wallet signing live outside this
/// crate. Only logs what it would have submitted.
struct LoggingOrderSubmitter;

#[async_trait::async_trait]
impl copytrader::pipeline::external::OrderSubmitter for LoggingOrderSubmitter {
    async fn submit_order(&self, ctx: OrderSubmission<'_>) -> Result<()> {
        info!(
            side = ctx.side,
            usdc_size = ctx.usdc_size,
            price = ctx.price,
            leader = ctx.leader_address,
            "would submit order (live submission is out of scope)"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!(workers = config.worker_count, "starting copy-trading pipeline");

    let feed = PolymarketActivityFeed::new()?;
    let positions_client = Some(PolymarketPositionsClient::new()?);

    let mut monitor = Monitor::new(
        feed,
        positions_client,
        config.user_addresses.clone(),
        config.fetch_interval_secs,
        config.too_old_secs,
        config.dedup_cache_ttl_secs,
        config.dedup_cache_max_entries,
    );

    let mut worker_tasks = Vec::new();
    for id in 0..config.worker_count as u64 {
        let (tx, rx) = mpsc::unbounded_channel::<WorkerMessage>();
        monitor.register_worker(WorkerHandle { id, sink: tx });

        let executor_config = ExecutorConfig {
            aggregation_enabled: config.trade_aggregation_enabled,
            aggregation_window_secs: config.trade_aggregation_window_secs,
            paper_trading_enabled: config.paper_trading_enabled,
        };
        let paper_trader = config
            .paper_trading_enabled
            .then(|| PaperTrader::new(config.paper_trading_balance_usd));
        let order_submitter = (!config.paper_trading_enabled).then_some(LoggingOrderSubmitter);
        let executor_positions_client = (!config.paper_trading_enabled)
            .then(PolymarketPositionsClient::new)
            .transpose()?;
        let executor_balance_client = (!config.paper_trading_enabled)
            .then(PolymarketBalanceClient::new)
            .transpose()?;

        let mut executor = Executor::new(
            id,
            executor_config,
            config.proxy_wallet.clone(),
            order_submitter,
            executor_positions_client,
            executor_balance_client,
            paper_trader,
        );
        worker_tasks.push(tokio::spawn(async move {
            executor.run(rx).await;
        }));
    }

    let running = monitor.running_handle();
    let monitor_task = tokio::spawn(async move {
        monitor.run().await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping pipeline");
    running.store(false, std::sync::atomic::Ordering::SeqCst);

    monitor_task.await?;
    for task in worker_tasks {
        let _ = task.await;
    }

    Ok(())
}
