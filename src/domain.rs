// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }

impl Side {
    /// Hyperliquid menulis side sebagai "B" (bid/buy) dan "A" (ask/sell).
    pub fn from_exchange(s: &str) -> Option<Side> {
        match s.trim() {
            "B" | "b" => Some(Side::Buy),
            "A" | "a" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Side::Buy => "buy", Side::Sell => "sell" }
    }
}

// ---------- Fills & PnL ----------

/// How the originating order was classified by the venue. Decides maker vs taker fee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClass {
    pub is_market: bool,
    pub is_trigger: bool,
    pub tif: Option<String>,
}

impl OrderClass {
    pub fn is_taker(&self) -> bool {
        self.is_market || self.is_trigger || self.tif.as_deref() == Some("FrontendMarket")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub ts_ms: i64,
    pub coin: String,
    pub side: Side,
    pub px: f64,
    pub qty: f64,
    pub class: OrderClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "Open Long")]
    OpenLong,
    #[serde(rename = "Close Long")]
    CloseLong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSummaryRow {
    pub time: DateTime<Utc>,
    pub coin: String,
    pub direction: Direction,
    pub price: f64,
    pub size: f64,
    pub trade_value: f64,
    pub fee: f64,
    pub closed_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeParams {
    pub maker: f64,
    pub taker: f64,
    /// Referral + staking, 0..1
    pub discount: f64,
}

impl FeeParams {
    /// Combined discount is clamped to [0, 0.9], matching what the venue will actually grant.
    pub fn from_user_fees(fees: &UserFees) -> Self {
        let discount = (fees.referral_discount + fees.staking_discount).clamp(0.0, 0.9);
        Self { maker: fees.add_rate, taker: fees.cross_rate, discount }
    }

    pub fn effective_rate(&self, class: &OrderClass) -> f64 {
        let base = if class.is_taker() { self.taker } else { self.maker };
        (base * (1.0 - self.discount)).max(0.0)
    }
}

/// Fee schedule as reported by the exchange (`userFees`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFees {
    pub cross_rate: f64,
    pub add_rate: f64,
    pub referral_discount: f64,
    pub staking_discount: f64,
}

// ---------- Decisions ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action { Buy, Sell, None }

impl Action {
    pub fn parse(s: &str) -> Option<Action> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Some(Action::Buy),
            "sell" | "short" => Some(Action::Sell),
            "none" | "hold" => Some(Action::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Action::Buy => "buy", Action::Sell => "sell", Action::None => "none" }
    }

    pub fn side(&self) -> Option<Side> {
        match self { Action::Buy => Some(Side::Buy), Action::Sell => Some(Side::Sell), Action::None => None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind { Market, Limit }

impl OrderKind {
    pub fn parse(s: &str) -> Option<OrderKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Some(OrderKind::Market),
            "limit" => Some(OrderKind::Limit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(default)] pub tp1: f64,
    #[serde(default)] pub tp2: f64,
    #[serde(default)] pub tp3: f64,
    #[serde(default)] pub sl: f64,
}

/// Decision exactly as the decision service returned it. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDraft {
    #[serde(default)] pub action: Option<String>,
    #[serde(default)] pub symbol: Option<String>,
    #[serde(default)] pub size: Option<f64>,
    #[serde(default)] pub order: Option<String>,
    #[serde(default)] pub limit_price: Option<f64>,
    #[serde(default)] pub targets: Option<Targets>,
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl DecisionDraft {
    /// Default resolution:
    /// - action missing/blank/unknown -> None
    /// - symbol missing/blank         -> `default_symbol`
    /// - order missing/blank/unknown  -> Market
    pub fn normalize(self, default_symbol: &str) -> Decision {
        let action = non_blank(&self.action).and_then(Action::parse).unwrap_or(Action::None);
        let symbol = non_blank(&self.symbol).unwrap_or(default_symbol).to_string();
        let order = non_blank(&self.order).and_then(OrderKind::parse).unwrap_or(OrderKind::Market);
        Decision {
            action,
            symbol,
            size: self.size.unwrap_or(0.0),
            order,
            limit_price: self.limit_price.unwrap_or(0.0),
            targets: self.targets.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: Action,
    pub symbol: String,
    pub size: f64,
    pub order: OrderKind,
    pub limit_price: f64,
    pub targets: Targets,
}

impl Decision {
    pub fn none(default_symbol: &str) -> Self {
        DecisionDraft::default().normalize(default_symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub pnl: f64,
    pub created_at: DateTime<Utc>,
}

// ---------- Market data ----------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStats { pub balance: f64, pub pnl: f64, pub roe: f64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel { pub px: String, pub sz: String, pub n: u32 }

/// `levels[0]` = bids, `levels[1]` = asks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub coin: String,
    pub time: i64,
    pub levels: Vec<Vec<BookLevel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "t")] pub open_time: i64,
    #[serde(rename = "T")] pub close_time: i64,
    #[serde(rename = "s")] pub symbol: String,
    #[serde(rename = "i")] pub interval: String,
    #[serde(rename = "o")] pub open: String,
    #[serde(rename = "c")] pub close: String,
    #[serde(rename = "h")] pub high: String,
    #[serde(rename = "l")] pub low: String,
    #[serde(rename = "v")] pub volume: String,
    #[serde(rename = "n")] pub trades: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeMeta {
    pub universe: Vec<Instrument>,
    /// Wire shape: `[[id, {table}], ...]`
    #[serde(default)]
    pub margin_tables: Vec<(u32, MarginTable)>,
    #[serde(default)]
    pub collateral_token: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub name: String,
    pub sz_decimals: u32,
    pub max_leverage: u32,
    #[serde(default)] pub margin_table_id: u32,
    #[serde(default)] pub is_delisted: bool,
    #[serde(default)] pub only_isolated: bool,
    #[serde(default)] pub margin_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginTable {
    pub description: String,
    pub margin_tiers: Vec<MarginTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginTier { pub lower_bound: String, pub max_leverage: u32 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_with_blank_fields_resolves_defaults() {
        let d = DecisionDraft { action: Some("  ".into()), symbol: Some(String::new()), ..Default::default() }
            .normalize("BTC");
        assert_eq!(d.action, Action::None);
        assert_eq!(d.symbol, "BTC");
        assert_eq!(d.order, OrderKind::Market);
    }

    #[test]
    fn draft_keeps_explicit_fields() {
        let raw = r#"{"action":"BUY","symbol":"ETH","size":0.5,"order":"limit","limitPrice":3000.5,
                      "targets":{"tp1":3100,"tp2":3200,"tp3":3300,"sl":2900}}"#;
        let d = serde_json::from_str::<DecisionDraft>(raw).unwrap().normalize("BTC");
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.symbol, "ETH");
        assert_eq!(d.order, OrderKind::Limit);
        assert_eq!(d.limit_price, 3000.5);
        assert_eq!(d.targets.sl, 2900.0);
    }

    #[test]
    fn unknown_action_is_none() {
        let d = DecisionDraft { action: Some("moon".into()), ..Default::default() }.normalize("SOL");
        assert_eq!(d.action, Action::None);
        assert_eq!(d.symbol, "SOL");
    }

    #[test]
    fn fee_discount_is_clamped() {
        let fees = UserFees { cross_rate: 0.00045, add_rate: 0.00015, referral_discount: 0.6, staking_discount: 0.5 };
        let p = FeeParams::from_user_fees(&fees);
        assert_eq!(p.discount, 0.9);
        assert_eq!(p.taker, 0.00045);
        assert_eq!(p.maker, 0.00015);
    }

    #[test]
    fn effective_rate_never_negative() {
        let p = FeeParams { maker: 0.0002, taker: 0.0005, discount: 1.5 };
        assert_eq!(p.effective_rate(&OrderClass::default()), 0.0);
    }

    #[test]
    fn frontend_market_tif_is_taker() {
        let c = OrderClass { is_market: false, is_trigger: false, tif: Some("FrontendMarket".into()) };
        assert!(c.is_taker());
        assert!(!OrderClass { tif: Some("Gtc".into()), ..Default::default() }.is_taker());
    }

    #[test]
    fn meta_decodes_margin_table_pairs() {
        let raw = r#"{"universe":[{"name":"BTC","szDecimals":5,"maxLeverage":40,"marginTableId":56}],
                      "marginTables":[[56,{"description":"tiered","marginTiers":[{"lowerBound":"0.0","maxLeverage":40}]}]],
                      "collateralToken":0}"#;
        let m: ExchangeMeta = serde_json::from_str(raw).unwrap();
        assert_eq!(m.universe[0].name, "BTC");
        assert_eq!(m.margin_tables[0].0, 56);
        assert_eq!(m.margin_tables[0].1.margin_tiers[0].max_leverage, 40);
    }
}
