//! Paper trading simulator (spec §4.6/C7) — an in-memory balance/position
//! ledger that stands in for the live order path when `PAPER_TRADING_ENABLED`
//! is set. Grounded on `vault::paper_ledger::VaultPaperLedger`, simplified to
//! the position shape the pipeline actually needs (no fee/slippage tracking).

use std::collections::HashMap;

use super::types::{QueueActivity, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct PaperPosition {
    pub asset: String,
    pub size: f64,
    pub invested: f64,
    pub avg_price: f64,
}

/// One worker's simulated account. Owned exclusively by that worker — never
/// shared across execution contexts.
#[derive(Debug, Clone)]
pub struct PaperTrader {
    balance: f64,
    positions: HashMap<String, PaperPosition>,
}

impl PaperTrader {
    pub fn new(initial_balance_usd: f64) -> Self {
        Self {
            balance: initial_balance_usd.max(0.0),
            positions: HashMap::new(),
        }
    }

    pub fn get_balance(&self) -> f64 {
        self.balance
    }

    /// Conservative mark: the sum of cost basis, not current market value.
    pub fn get_user_portfolio_value(&self) -> f64 {
        self.positions.values().map(|p| p.invested).sum()
    }

    pub fn position(&self, condition_id: &str) -> Option<&PaperPosition> {
        self.positions.get(condition_id)
    }

    /// Apply `activity` to this trader's ledger. Returns `false` (no mutation)
    /// when the trade cannot be funded/covered; `true` on success.
    pub fn execute_trade(&mut self, activity: &QueueActivity) -> bool {
        match activity.side() {
            Side::Buy => self.apply_buy(activity),
            Side::Sell => self.apply_sell(activity),
        }
    }

    fn apply_buy(&mut self, activity: &QueueActivity) -> bool {
        let usdc_size = activity.usdc_size();
        if self.balance < usdc_size {
            return false;
        }
        self.balance -= usdc_size;

        let entry = self
            .positions
            .entry(activity.condition_id().to_string())
            .or_insert_with(|| PaperPosition {
                asset: activity.asset().to_string(),
                size: 0.0,
                invested: 0.0,
                avg_price: activity.price(),
            });
        entry.size += activity.activity.size;
        entry.invested += usdc_size;
        entry.avg_price = if entry.size > 0.0 {
            entry.invested / entry.size
        } else {
            activity.price()
        };
        true
    }

    fn apply_sell(&mut self, activity: &QueueActivity) -> bool {
        let condition_id = activity.condition_id().to_string();
        let Some(pos) = self.positions.get_mut(&condition_id) else {
            return false;
        };
        if pos.size < activity.activity.size {
            return false;
        }

        let usdc_size = activity.usdc_size();
        let fraction = if pos.size > 0.0 {
            activity.activity.size / pos.size
        } else {
            0.0
        };
        let invested_reduced = pos.invested * fraction;

        pos.size -= activity.activity.size;
        pos.invested -= invested_reduced;
        self.balance += usdc_size;

        if pos.size <= 1e-9 {
            self.positions.remove(&condition_id);
        } else {
            pos.avg_price = pos.invested / pos.size;
        }
        true
    }
}
