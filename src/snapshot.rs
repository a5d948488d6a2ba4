// ===============================
// src/snapshot.rs
// ===============================
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, DecisionRecord, ExchangeMeta, Fill, LiveStats, OrderBook};

/// Everything the decision service sees for one tick. Built once, then moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub balance: f64,
    pub pnl: f64,
    pub roe: f64,
    pub trades: Vec<Fill>,
    pub decisions: Vec<DecisionRecord>,
    pub mids: BTreeMap<String, f64>,
    pub meta: ExchangeMeta,
    pub order_books: BTreeMap<String, OrderBook>,
    pub candles: BTreeMap<String, Vec<Candle>>,
}

/// Keep only watchlist coins.
pub fn filter_mids(all: BTreeMap<String, f64>, watchlist: &[String]) -> BTreeMap<String, f64> {
    all.into_iter().filter(|(coin, _)| watchlist.iter().any(|w| w == coin)).collect()
}

pub struct SnapshotBuilder {
    snap: Snapshot,
}

impl SnapshotBuilder {
    pub fn new(stats: LiveStats) -> Self {
        Self {
            snap: Snapshot {
                taken_at: Utc::now(),
                balance: stats.balance,
                pnl: stats.pnl,
                roe: stats.roe,
                trades: Vec::new(),
                decisions: Vec::new(),
                mids: BTreeMap::new(),
                meta: ExchangeMeta::default(),
                order_books: BTreeMap::new(),
                candles: BTreeMap::new(),
            },
        }
    }

    pub fn mids(mut self, all: BTreeMap<String, f64>, watchlist: &[String]) -> Self {
        self.snap.mids = filter_mids(all, watchlist);
        self
    }

    pub fn meta(mut self, meta: ExchangeMeta) -> Self {
        self.snap.meta = meta;
        self
    }

    /// An instrument is added whole (book + candles) or not at all.
    pub fn instrument(mut self, coin: &str, book: OrderBook, candles: Vec<Candle>) -> Self {
        self.snap.order_books.insert(coin.to_string(), book);
        self.snap.candles.insert(coin.to_string(), candles);
        self
    }

    pub fn history(mut self, trades: Vec<Fill>, decisions: Vec<DecisionRecord>) -> Self {
        self.snap.trades = trades;
        self.snap.decisions = decisions;
        self
    }

    pub fn build(self) -> Snapshot {
        self.snap
    }
}
