//! Monitor (spec §4.3/C4) — Tier A's poll loop. Owns the dedup cache and
//! distributor directly (single cooperative task, no `Arc`/`Mutex` needed)
//! and hands accepted activity off to the worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::dedup::DedupCache;
use super::distributor::Distributor;
use super::external::PositionsClient;
use super::registry::WorkerHandle;
use super::types::{dedup_key, Activity, Position, QueueActivity, RawTimestamp};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const FEED_TIMEOUT: Duration = Duration::from_secs(15);
const POSITIONS_CACHE_TTL_MS: i64 = 60_000;

/// The leader-activity feed collaborator. `PolymarketActivityFeed` is the
/// only production implementation; tests supply a canned in-memory one.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    async fn fetch_activity(&self, user: &str) -> anyhow::Result<Vec<Activity>>;
}

/// `GET /activity?user={addr}&type=TRADE`, grounded on
/// `scrapers::polymarket_api::PolymarketScraper`'s single-attempt-per-call
/// HTTP shape and `scrapers::dome_tracker::DomeClient`'s GET-with-query-params
/// pattern. The core performs no retries (spec §5/§7): a failed call is
/// logged and the address is skipped until next cycle.
pub struct PolymarketActivityFeed {
    client: Client,
}

impl PolymarketActivityFeed {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(FEED_TIMEOUT)
            .user_agent("copytrader/1.0")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ActivityFeed for PolymarketActivityFeed {
    async fn fetch_activity(&self, user: &str) -> anyhow::Result<Vec<Activity>> {
        let url = format!("{}/activity", DATA_API_BASE);
        let response = timeout(
            FEED_TIMEOUT,
            self.client
                .get(&url)
                .query(&[("user", user), ("type", "TRADE")])
                .send(),
        )
        .await??;

        if !response.status().is_success() {
            anyhow::bail!("activity feed returned status {}", response.status());
        }

        Ok(response.json::<Vec<Activity>>().await?)
    }
}

/// Best-effort positions cache (spec §4.3 step 6): keyed by
/// `address|asset|conditionId`, 60s TTL, skips the write when the value is
/// unchanged. Failures to refresh never affect publishing.
struct PositionsCache {
    entries: HashMap<String, (Position, i64)>,
}

impl PositionsCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn refresh(&mut self, address: &str, positions: &[Position], now_ms: i64) {
        for position in positions {
            let key = format!("{}|{}|{}", address, position.asset, position.condition_id);
            let stale = self
                .entries
                .get(&key)
                .map(|(_, at)| now_ms - at >= POSITIONS_CACHE_TTL_MS)
                .unwrap_or(true);
            let unchanged = self
                .entries
                .get(&key)
                .map(|(existing, _)| existing == position)
                .unwrap_or(false);
            if unchanged && !stale {
                continue;
            }
            self.entries.insert(key, (position.clone(), now_ms));
        }
    }
}

/// Normalise a raw feed timestamp to epoch milliseconds. Numeric values
/// `> 10^12` are assumed already ms; otherwise seconds. String values are
/// parsed as ISO-8601/RFC-3339. Returns `None` on anything else — the
/// activity is dropped.
fn normalize_timestamp_ms(raw: &RawTimestamp) -> Option<i64> {
    match raw {
        RawTimestamp::Number(n) => {
            if !n.is_finite() {
                return None;
            }
            if *n > 1e12 {
                Some(*n as i64)
            } else {
                Some((*n * 1000.0) as i64)
            }
        }
        RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
    }
}

pub struct Monitor<F: ActivityFeed, P: PositionsClient> {
    feed: F,
    positions_client: Option<P>,
    dedup: DedupCache,
    distributor: Distributor,
    positions_cache: PositionsCache,
    addresses: Vec<String>,
    fetch_interval_secs: u64,
    too_old_secs: u64,
    running: Arc<AtomicBool>,
}

impl<F: ActivityFeed, P: PositionsClient> Monitor<F, P> {
    pub fn new(
        feed: F,
        positions_client: Option<P>,
        addresses: Vec<String>,
        fetch_interval_secs: u64,
        too_old_secs: u64,
        dedup_ttl_secs: u64,
        dedup_max_entries: usize,
    ) -> Self {
        Self {
            feed,
            positions_client,
            dedup: DedupCache::new(dedup_ttl_secs, dedup_max_entries),
            distributor: Distributor::new(),
            positions_cache: PositionsCache::new(),
            addresses,
            fetch_interval_secs,
            too_old_secs,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn register_worker(&mut self, handle: WorkerHandle) {
        self.distributor.register(handle);
    }

    pub fn unregister_worker(&mut self, id: super::registry::WorkerId) {
        self.distributor.unregister(id);
    }

    pub fn broadcast_shutdown(&self) {
        self.distributor.broadcast_shutdown();
    }

    pub fn backlog_len(&self) -> usize {
        self.distributor.backlog_len()
    }

    pub async fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.run_cycle(now_ms()).await;
            sleep(Duration::from_secs(self.fetch_interval_secs)).await;
        }
        self.broadcast_shutdown();
    }

    /// One poll cycle over every configured address, exposed separately from
    /// `run()` so tests can drive deterministic timing.
    pub async fn run_cycle(&mut self, now_ms: i64) {
        for address in self.addresses.clone() {
            let activities = match self.feed.fetch_activity(&address).await {
                Ok(activities) => activities,
                Err(e) => {
                    warn!(address = %address, error = %e, "activity feed fetch failed, skipping this cycle");
                    continue;
                }
            };

            for activity in activities {
                self.process_activity(activity, &address, now_ms);
            }
        }

        self.refresh_positions(now_ms).await;
    }

    fn process_activity(&mut self, activity: Activity, address: &str, now_ms: i64) {
        let Some(timestamp_ms) = normalize_timestamp_ms(&activity.timestamp) else {
            debug!(address, "dropping activity with unparseable timestamp");
            return;
        };

        let too_old_ms = (self.too_old_secs as i64) * 1000;
        if now_ms - timestamp_ms > too_old_ms {
            debug!(address, timestamp_ms, "dropping activity: too old");
            return;
        }

        let key = dedup_key(&activity, address, timestamp_ms);
        if !self.dedup.check_and_remember(&key, now_ms) {
            debug!(address, key, "dropping activity: duplicate");
            return;
        }

        let queued = QueueActivity {
            activity,
            user_address: address.to_string(),
            timestamp_ms,
            detected_at_ms: now_ms,
        };
        info!(
            address,
            condition_id = queued.condition_id(),
            usdc_size = queued.usdc_size(),
            "publishing activity to distributor"
        );
        self.distributor.publish(queued);
    }

    async fn refresh_positions(&mut self, now_ms: i64) {
        let Some(client) = &self.positions_client else {
            return;
        };
        for address in self.addresses.clone() {
            match client.positions(&address).await {
                Ok(positions) => self.positions_cache.refresh(&address, &positions, now_ms),
                Err(e) => {
                    debug!(address, error = %e, "positions cache refresh failed (best-effort)");
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
