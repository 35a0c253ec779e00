//! Shared data model for the copy-trading pipeline: the wire-level `Activity`,
//! the monitor's normalised `QueueActivity`, and the aggregation record.

use serde::{Deserialize, Serialize};

/// Trade side as reported by the leader-activity feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Raw timestamp as the feed may send it: a bare epoch number (seconds or
/// milliseconds, disambiguated by magnitude) or an ISO-8601 string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Number(f64),
    Text(String),
}

/// One trade event emitted by a leader, as deserialized from
/// `GET /activity?user={addr}&type=TRADE`. Immutable once created.
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
    #[serde(rename = "userAddress", default)]
    pub user_address: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub asset: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    #[serde(rename = "usdcSize")]
    pub usdc_size: f64,
    pub timestamp: RawTimestamp,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(rename = "eventSlug", default)]
    pub event_slug: Option<String>,
}

/// An `Activity` augmented with the monitor's detection timestamp and the
/// normalised (milliseconds) trade timestamp. Owned by whichever pipeline
/// component currently holds it.
#[derive(Debug, Clone)]
pub struct QueueActivity {
    pub activity: Activity,
    /// The leader address this activity was fetched for — authoritative
    /// even when the feed omits `userAddress` on the payload itself.
    pub user_address: String,
    pub timestamp_ms: i64,
    pub detected_at_ms: i64,
}

impl QueueActivity {
    pub fn condition_id(&self) -> &str {
        &self.activity.condition_id
    }

    pub fn asset(&self) -> &str {
        &self.activity.asset
    }

    pub fn side(&self) -> Side {
        self.activity.side
    }

    pub fn usdc_size(&self) -> f64 {
        self.activity.usdc_size
    }

    pub fn price(&self) -> f64 {
        self.activity.price
    }
}

/// Compute the canonical dedup key for an activity (spec §3):
/// `lowercase(transactionHash)` when present, else the composite
/// `userAddress|conditionId|timestamp|side|usdcSize|price`.
pub fn dedup_key(activity: &Activity, user_address: &str, timestamp_ms: i64) -> String {
    let key = match &activity.transaction_hash {
        Some(hash) if !hash.is_empty() => hash.clone(),
        _ => format!(
            "{}|{}|{}|{}|{}|{}",
            user_address,
            activity.condition_id,
            timestamp_ms,
            activity.side.as_str(),
            activity.usdc_size,
            activity.price
        ),
    };
    key.to_lowercase()
}

/// A coalescing record for sub-threshold same-side trades on one market,
/// keyed by `userAddress|conditionId|asset|side`.
#[derive(Debug, Clone)]
pub struct AggregatedTrade {
    pub user_address: String,
    pub condition_id: String,
    pub asset: String,
    pub side: Side,
    pub trades: Vec<QueueActivity>,
    pub total_usdc_size: f64,
    pub average_price: f64,
    pub first_trade_time_ms: i64,
    pub last_trade_time_ms: i64,
}

impl AggregatedTrade {
    pub fn new(first: QueueActivity, now_ms: i64) -> Self {
        let user_address = first.user_address.clone();
        let condition_id = first.condition_id().to_string();
        let asset = first.asset().to_string();
        let side = first.side();
        let usdc_size = first.usdc_size();
        let price = first.price();
        Self {
            user_address,
            condition_id,
            asset,
            side,
            trades: vec![first],
            total_usdc_size: usdc_size,
            average_price: price,
            first_trade_time_ms: now_ms,
            last_trade_time_ms: now_ms,
        }
    }

    /// Key used by the aggregation buffer: `userAddress|conditionId|asset|side`.
    pub fn key(user_address: &str, condition_id: &str, asset: &str, side: Side) -> String {
        format!("{}|{}|{}|{}", user_address, condition_id, asset, side.as_str())
    }

    pub fn add(&mut self, activity: QueueActivity, now_ms: i64) {
        self.total_usdc_size += activity.usdc_size();
        self.trades.push(activity);
        let weighted: f64 = self
            .trades
            .iter()
            .map(|t| t.usdc_size() * t.price())
            .sum();
        if self.total_usdc_size > 0.0 {
            self.average_price = weighted / self.total_usdc_size;
        }
        self.last_trade_time_ms = now_ms;
    }

    /// Build the synthetic activity submitted on a successful flush: the
    /// first contributor's fields with `usdcSize`/`price`/`side` replaced by
    /// the aggregated values.
    pub fn synthetic_activity(&self) -> QueueActivity {
        let mut synthetic = self.trades[0].clone();
        synthetic.activity.usdc_size = self.total_usdc_size;
        synthetic.activity.price = self.average_price;
        synthetic.activity.side = self.side;
        synthetic
    }
}

/// A position as reported by `GET /positions?user={addr}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub asset: String,
    #[serde(rename = "currentValue", default)]
    pub current_value: Option<f64>,
    #[serde(rename = "initialValue", default)]
    pub initial_value: Option<f64>,
    #[serde(rename = "percentPnl", default)]
    pub percent_pnl: Option<f64>,
    pub size: f64,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Option<f64>,
}
