//! Trade executor (spec §4.5/C6) — one per worker. Owns its queue receiver,
//! aggregation buffer, paper trader, and flush timer; shares nothing with
//! other workers or the monitor.
//!
//! The reference pseudocode's idle-nap-then-poll loop and the aggregation
//! flusher's independent tick are rendered as two branches of one
//! `tokio::select!`, following the same pattern as
//! `edge::receiver::EdgeReceiver::run`'s select over socket read and
//! heartbeat interval — equivalent dequeue-or-flush-or-idle behaviour
//! without a literal busy-poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::MIN_TOTAL_USD;

use super::external::{BalanceClient, OrderSubmission, OrderSubmitter, PositionsClient};
use super::paper::PaperTrader;
use super::registry::{WorkerId, WorkerMessage};
use super::types::{AggregatedTrade, QueueActivity, Side};

const AGG_CHECK_INTERVAL_MS: u64 = 500;

pub struct ExecutorConfig {
    pub aggregation_enabled: bool,
    pub aggregation_window_secs: u64,
    pub paper_trading_enabled: bool,
}

/// One worker's execution context. Either a paper trader or the live
/// positions/balance/order-submission collaborators back the order path,
/// never both.
pub struct Executor<S: OrderSubmitter, P: PositionsClient, B: BalanceClient> {
    pub id: WorkerId,
    config: ExecutorConfig,
    /// The operator's own wallet address (`PROXY_WALLET`) — used to look up
    /// our own positions/balance on the live path.
    own_address: String,
    order_submitter: Option<S>,
    positions_client: Option<P>,
    balance_client: Option<B>,
    paper_trader: Option<PaperTrader>,
    aggregation_buffer: HashMap<String, AggregatedTrade>,
    running: Arc<AtomicBool>,
}

impl<S: OrderSubmitter, P: PositionsClient, B: BalanceClient> Executor<S, P, B> {
    pub fn new(
        id: WorkerId,
        config: ExecutorConfig,
        own_address: String,
        order_submitter: Option<S>,
        positions_client: Option<P>,
        balance_client: Option<B>,
        paper_trader: Option<PaperTrader>,
    ) -> Self {
        Self {
            id,
            config,
            own_address,
            order_submitter,
            positions_client,
            balance_client,
            paper_trader,
            aggregation_buffer: HashMap::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// The per-worker dequeue loop. Exits once `Shutdown` is received or the
    /// channel closes, finishing whatever activity is already in hand first.
    pub async fn run(&mut self, mut inbox: mpsc::UnboundedReceiver<WorkerMessage>) {
        let mut flush_tick = interval(Duration::from_millis(AGG_CHECK_INTERVAL_MS));

        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                message = inbox.recv() => {
                    match message {
                        Some(WorkerMessage::Activity(activity)) => self.handle_activity(activity, now_ms()).await,
                        Some(WorkerMessage::Shutdown) => {
                            info!(worker_id = self.id, "shutdown-ack");
                            self.running.store(false, Ordering::SeqCst);
                            break;
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush_ready(now_ms()).await;
                }
            }
        }
    }

    async fn handle_activity(&mut self, activity: QueueActivity, now_ms: i64) {
        if self.config.aggregation_enabled
            && activity.side() == Side::Buy
            && activity.usdc_size() < MIN_TOTAL_USD
        {
            self.add_to_aggregation_buffer(activity, now_ms);
            return;
        }
        self.execute(activity).await;
    }

    fn add_to_aggregation_buffer(&mut self, activity: QueueActivity, now_ms: i64) {
        let key = AggregatedTrade::key(
            &activity.user_address,
            activity.condition_id(),
            activity.asset(),
            activity.side(),
        );
        match self.aggregation_buffer.get_mut(&key) {
            Some(existing) => existing.add(activity, now_ms),
            None => {
                self.aggregation_buffer
                    .insert(key, AggregatedTrade::new(activity, now_ms));
            }
        }
    }

    async fn flush_ready(&mut self, now_ms: i64) {
        let window_ms = (self.config.aggregation_window_secs as i64) * 1000;
        let ready_keys: Vec<String> = self
            .aggregation_buffer
            .iter()
            .filter(|(_, agg)| now_ms - agg.first_trade_time_ms >= window_ms)
            .map(|(k, _)| k.clone())
            .collect();

        for key in ready_keys {
            let Some(agg) = self.aggregation_buffer.remove(&key) else {
                continue;
            };
            if agg.total_usdc_size >= MIN_TOTAL_USD {
                let synthetic = agg.synthetic_activity();
                self.execute(synthetic).await;
            } else {
                info!(
                    key,
                    total_usdc_size = agg.total_usdc_size,
                    "aggregation below minimum at window expiry, dropping"
                );
            }
        }
    }

    async fn execute(&mut self, activity: QueueActivity) {
        let receipt_ms = now_ms();
        info!(
            worker_id = self.id,
            condition_id = activity.condition_id(),
            activity_to_receive_ms = receipt_ms - activity.timestamp_ms,
            detected_to_receive_ms = receipt_ms - activity.detected_at_ms,
            "executing activity"
        );

        if self.config.paper_trading_enabled {
            let Some(trader) = self.paper_trader.as_mut() else {
                warn!(worker_id = self.id, "paper trading enabled but no paper trader configured");
                return;
            };
            if !trader.execute_trade(&activity) {
                info!(
                    worker_id = self.id,
                    condition_id = activity.condition_id(),
                    "paper trader refused trade, skipping"
                );
            }
            return;
        }

        let (Some(submitter), Some(positions_client), Some(balance_client)) = (
            self.order_submitter.as_ref(),
            self.positions_client.as_ref(),
            self.balance_client.as_ref(),
        ) else {
            warn!(worker_id = self.id, "live order path not fully configured, skipping");
            return;
        };

        // Fetch own positions, leader positions, and own balance in
        // parallel (spec §4.5 step 3).
        let fetch = tokio::try_join!(
            positions_client.positions(&self.own_address),
            positions_client.positions(&activity.user_address),
            balance_client.balance(&self.own_address),
        );
        let (own_positions, leader_positions, own_balance) = match fetch {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "positions/balance lookup failed, skipping activity");
                return;
            }
        };

        let own_position = own_positions
            .iter()
            .find(|p| p.condition_id == activity.condition_id());
        let leader_position = leader_positions
            .iter()
            .find(|p| p.condition_id == activity.condition_id());
        let user_balance: f64 = leader_positions
            .iter()
            .filter_map(|p| p.current_value)
            .sum();

        let ctx = OrderSubmission {
            side: activity.side().as_str(),
            own_position,
            leader_position,
            usdc_size: activity.usdc_size(),
            price: activity.price(),
            own_balance,
            user_balance,
            leader_address: &activity.user_address,
        };
        if let Err(e) = submitter.submit_order(ctx).await {
            warn!(worker_id = self.id, error = %e, "order submission failed, continuing");
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Activity, Position, RawTimestamp};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct RecordingSubmitter {
        calls: StdMutex<Vec<f64>>,
    }

    #[async_trait]
    impl OrderSubmitter for RecordingSubmitter {
        async fn submit_order(&self, ctx: OrderSubmission<'_>) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(ctx.usdc_size);
            Ok(())
        }
    }

    struct NoPositions;

    #[async_trait]
    impl PositionsClient for NoPositions {
        async fn positions(&self, _address: &str) -> anyhow::Result<Vec<Position>> {
            Ok(vec![])
        }
    }

    struct ZeroBalance;

    #[async_trait]
    impl BalanceClient for ZeroBalance {
        async fn balance(&self, _address: &str) -> anyhow::Result<f64> {
            Ok(0.0)
        }
    }

    fn buy(tx: &str, usdc: f64, price: f64, ts_ms: i64) -> QueueActivity {
        QueueActivity {
            activity: Activity {
                transaction_hash: Some(tx.to_string()),
                user_address: None,
                condition_id: "cond1".into(),
                asset: "asset1".into(),
                side: Side::Buy,
                price,
                size: usdc / price,
                usdc_size: usdc,
                timestamp: RawTimestamp::Number(ts_ms as f64),
                slug: None,
                event_slug: None,
            },
            user_address: "leader".into(),
            timestamp_ms: ts_ms,
            detected_at_ms: ts_ms,
        }
    }

    fn live_executor(
        config: ExecutorConfig,
        submitter: RecordingSubmitter,
    ) -> Executor<RecordingSubmitter, NoPositions, ZeroBalance> {
        Executor::new(
            1,
            config,
            "0xoperator".to_string(),
            Some(submitter),
            Some(NoPositions),
            Some(ZeroBalance),
            None,
        )
    }

    #[tokio::test]
    async fn aggregation_coalesces_sub_threshold_buys_into_one_order() {
        let config = ExecutorConfig {
            aggregation_enabled: true,
            aggregation_window_secs: 2,
            paper_trading_enabled: false,
        };
        let mut executor = live_executor(
            config,
            RecordingSubmitter {
                calls: StdMutex::new(vec![]),
            },
        );

        executor.handle_activity(buy("0x1", 0.40, 0.5, 0), 0).await;
        executor.handle_activity(buy("0x2", 0.30, 0.6, 500), 500).await;
        executor.handle_activity(buy("0x3", 0.40, 0.5, 1000), 1000).await;

        // not yet at the window boundary
        executor.flush_ready(1999).await;
        assert!(executor
            .order_submitter
            .as_ref()
            .unwrap()
            .calls
            .lock()
            .unwrap()
            .is_empty());

        executor.flush_ready(2000).await;
        let calls = executor.order_submitter.unwrap().calls.into_inner().unwrap();
        assert_eq!(calls.len(), 1);
        assert!((calls[0] - 1.10).abs() < 1e-9);
        assert!(executor.aggregation_buffer.is_empty());
    }

    #[tokio::test]
    async fn aggregation_drops_under_threshold_group_at_window_expiry() {
        let config = ExecutorConfig {
            aggregation_enabled: true,
            aggregation_window_secs: 2,
            paper_trading_enabled: false,
        };
        let mut executor = live_executor(
            config,
            RecordingSubmitter {
                calls: StdMutex::new(vec![]),
            },
        );

        executor.handle_activity(buy("0x1", 0.30, 0.6, 0), 0).await;
        executor.flush_ready(2000).await;

        assert!(executor
            .order_submitter
            .as_ref()
            .unwrap()
            .calls
            .lock()
            .unwrap()
            .is_empty());
        assert!(executor.aggregation_buffer.is_empty());
    }

    #[tokio::test]
    async fn above_threshold_buy_bypasses_aggregation_entirely() {
        let config = ExecutorConfig {
            aggregation_enabled: true,
            aggregation_window_secs: 2,
            paper_trading_enabled: false,
        };
        let mut executor = live_executor(
            config,
            RecordingSubmitter {
                calls: StdMutex::new(vec![]),
            },
        );

        executor.handle_activity(buy("0x1", 5.0, 0.5, 0), 0).await;

        assert!(executor.aggregation_buffer.is_empty());
        let calls = executor.order_submitter.unwrap().calls.into_inner().unwrap();
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn live_path_sizes_the_order_from_fetched_positions_and_balance() {
        struct OnePosition;
        #[async_trait]
        impl PositionsClient for OnePosition {
            async fn positions(&self, _address: &str) -> anyhow::Result<Vec<Position>> {
                Ok(vec![Position {
                    condition_id: "cond1".into(),
                    asset: "asset1".into(),
                    current_value: Some(42.0),
                    initial_value: Some(40.0),
                    percent_pnl: Some(5.0),
                    size: 10.0,
                    avg_price: Some(0.5),
                }])
            }
        }
        struct FixedBalance;
        #[async_trait]
        impl BalanceClient for FixedBalance {
            async fn balance(&self, _address: &str) -> anyhow::Result<f64> {
                Ok(123.0)
            }
        }

        struct CapturingSubmitter {
            own_balance: StdMutex<Option<f64>>,
            user_balance: StdMutex<Option<f64>>,
        }
        #[async_trait]
        impl OrderSubmitter for CapturingSubmitter {
            async fn submit_order(&self, ctx: OrderSubmission<'_>) -> anyhow::Result<()> {
                *self.own_balance.lock().unwrap() = Some(ctx.own_balance);
                *self.user_balance.lock().unwrap() = Some(ctx.user_balance);
                assert!(ctx.own_position.is_some());
                assert!(ctx.leader_position.is_some());
                Ok(())
            }
        }

        let config = ExecutorConfig {
            aggregation_enabled: false,
            aggregation_window_secs: 2,
            paper_trading_enabled: false,
        };
        let mut executor: Executor<CapturingSubmitter, OnePosition, FixedBalance> = Executor::new(
            1,
            config,
            "0xoperator".to_string(),
            Some(CapturingSubmitter {
                own_balance: StdMutex::new(None),
                user_balance: StdMutex::new(None),
            }),
            Some(OnePosition),
            Some(FixedBalance),
            None,
        );

        executor.handle_activity(buy("0x1", 5.0, 0.5, 0), 0).await;

        let submitter = executor.order_submitter.unwrap();
        assert_eq!(submitter.own_balance.into_inner().unwrap(), Some(123.0));
        assert_eq!(submitter.user_balance.into_inner().unwrap(), Some(42.0));
    }

    #[tokio::test]
    async fn paper_trading_path_mutates_the_local_ledger() {
        let config = ExecutorConfig {
            aggregation_enabled: false,
            aggregation_window_secs: 2,
            paper_trading_enabled: true,
        };
        let mut executor: Executor<RecordingSubmitter, NoPositions, ZeroBalance> = Executor::new(
            1,
            config,
            "0xoperator".to_string(),
            None,
            None,
            None,
            Some(PaperTrader::new(100.0)),
        );

        executor.handle_activity(buy("0x1", 20.0, 0.5, 0), 0).await;

        assert_eq!(executor.paper_trader.unwrap().get_balance(), 80.0);
    }

    #[tokio::test]
    async fn shutdown_message_terminates_the_loop() {
        let config = ExecutorConfig {
            aggregation_enabled: false,
            aggregation_window_secs: 2,
            paper_trading_enabled: true,
        };
        let mut executor: Executor<RecordingSubmitter, NoPositions, ZeroBalance> = Executor::new(
            1,
            config,
            "0xoperator".to_string(),
            None,
            None,
            None,
            Some(PaperTrader::new(100.0)),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerMessage::Shutdown).unwrap();

        tokio::time::timeout(Duration::from_secs(1), executor.run(rx))
            .await
            .expect("executor should exit promptly on shutdown");
    }
}
