// ===============================
// src/pnl.rs (cost-basis PnL reconciliation)
// ===============================
//
// Rekonstruksi realized PnL per coin dari riwayat fill:
// - Buy  -> Open Long, update average cost (size-weighted)
// - Sell -> Close Long, realize (px - avg) * qty yang benar-benar bisa ditutup
// Posisi short tidak dimodelkan: sell yang melebihi posisi hanya menutup sampai 0.
//
use std::collections::BTreeMap;

use ahash::AHashMap as HashMap;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::domain::{Direction, FeeParams, Fill, Side, TradeSummaryRow};
use crate::fills;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub qty: f64,
    pub avg_cost: f64,
}

/// Per-invocation ledger. Positions live only as long as one reconciliation.
#[derive(Debug)]
pub struct Ledger {
    fee: FeeParams,
    positions: HashMap<String, Position>,
}

impl Ledger {
    pub fn new(fee: FeeParams) -> Self {
        Self { fee, positions: HashMap::new() }
    }

    pub fn position(&self, coin: &str) -> Position {
        self.positions.get(coin).copied().unwrap_or_default()
    }

    pub fn on_fill(&mut self, f: &Fill) -> TradeSummaryRow {
        let notional = f.px * f.qty;
        let fee = notional * self.fee.effective_rate(&f.class);
        let pos = self.positions.entry(f.coin.clone()).or_default();

        let (direction, closed_pnl) = match f.side {
            Side::Buy => {
                let new_qty = (pos.qty + f.qty).max(0.0);
                pos.avg_cost = if new_qty == 0.0 {
                    0.0
                } else {
                    (pos.avg_cost * pos.qty + f.px * f.qty) / new_qty
                };
                pos.qty = new_qty;
                (Direction::OpenLong, 0.0)
            }
            Side::Sell => {
                let qty_closed = f.qty.min(pos.qty);
                let pnl = (f.px - pos.avg_cost) * qty_closed;
                pos.qty -= qty_closed;
                if pos.qty <= 0.0 {
                    pos.qty = 0.0;
                    pos.avg_cost = 0.0;
                }
                (Direction::CloseLong, pnl)
            }
        };

        TradeSummaryRow {
            time: ts_to_utc(f.ts_ms),
            coin: f.coin.clone(),
            direction,
            price: f.px,
            // size stays the reported fill size, even when only part of it closed
            size: f.qty,
            trade_value: notional,
            fee,
            closed_pnl,
        }
    }
}

fn ts_to_utc(ts_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_default()
}

/// Replays already-parsed fills. Sort is stable: equal timestamps keep input order.
pub fn replay(mut fills: Vec<Fill>, fee: FeeParams) -> (Vec<TradeSummaryRow>, Ledger) {
    fills.sort_by_key(|f| f.ts_ms);
    let mut ledger = Ledger::new(fee);
    let rows = fills.iter().map(|f| ledger.on_fill(f)).collect();
    (rows, ledger)
}

/// Raw exchange records in, summary rows out. Pure and total.
pub fn reconcile(records: &[Value], fee: FeeParams) -> Vec<TradeSummaryRow> {
    replay(fills::parse_all(records), fee).0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinTotals {
    pub rows: usize,
    pub volume: f64,
    pub fees: f64,
    pub realized_pnl: f64,
    pub net_pnl: f64,
    pub open_qty: f64,
    pub avg_cost: f64,
}

/// Per-coin aggregates, with whatever position is still open after the replay.
pub fn totals(rows: &[TradeSummaryRow], ledger: &Ledger) -> BTreeMap<String, CoinTotals> {
    let mut out: BTreeMap<String, CoinTotals> = BTreeMap::new();
    for r in rows {
        let t = out.entry(r.coin.clone()).or_default();
        t.rows += 1;
        t.volume += r.trade_value;
        t.fees += r.fee;
        t.realized_pnl += r.closed_pnl;
        t.net_pnl = t.realized_pnl - t.fees;
    }
    for (coin, t) in out.iter_mut() {
        let pos = ledger.position(coin);
        t.open_qty = pos.qty;
        t.avg_cost = pos.avg_cost;
    }
    out
}
