// ===============================
// src/exchange.rs
// ===============================
use std::collections::BTreeMap;
use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::domain::{Candle, ExchangeMeta, LiveStats, OrderBook, Side, UserFees};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("exchange returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode {what}: {source}")]
    Decode { what: &'static str, source: serde_json::Error },
    #[error("wallet address is required")]
    MissingWallet,
    #[error("no usable data in {0} response")]
    NoData(&'static str),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// Perp exchange, read side plus order entry.
/// Futures are `Send` so the bot loop can run on a spawned task.
pub trait Exchange: Send + Sync + 'static {
    fn live_stats(&self) -> impl Future<Output = Result<LiveStats, ExchangeError>> + Send;

    fn mid_prices(&self) -> impl Future<Output = Result<BTreeMap<String, f64>, ExchangeError>> + Send;

    fn meta(&self) -> impl Future<Output = Result<ExchangeMeta, ExchangeError>> + Send;

    fn order_book(&self, coin: &str) -> impl Future<Output = Result<OrderBook, ExchangeError>> + Send;

    fn candles(
        &self,
        coin: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> impl Future<Output = Result<Vec<Candle>, ExchangeError>> + Send;

    /// Raw, loosely-typed order history. Parse with `fills::parse`.
    fn historical_fills(&self, limit: usize) -> impl Future<Output = Result<Vec<Value>, ExchangeError>> + Send;

    fn user_fees(&self) -> impl Future<Output = Result<UserFees, ExchangeError>> + Send;

    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        px: f64,
    ) -> impl Future<Output = Result<String, ExchangeError>> + Send;

    fn set_active_wallet(&self, address: &str);
}

/// "btcusdt " -> "BTC"
pub fn normalize_symbol(sym: &str) -> String {
    let s = sym.trim().to_ascii_uppercase();
    s.strip_suffix("USDT").map(str::to_string).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_symbols() {
        assert_eq!(normalize_symbol(" btcusdt "), "BTC");
        assert_eq!(normalize_symbol("ETH"), "ETH");
        assert_eq!(normalize_symbol("usdt"), "");
    }

    #[test]
    fn status_error_message() {
        let e = ExchangeError::Status { status: 429, body: "slow down".into() };
        assert_eq!(e.to_string(), "exchange returned 429: slow down");
    }
}
