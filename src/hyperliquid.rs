// ===============================
// src/hyperliquid.rs
// ===============================
//
// Adapter REST untuk Hyperliquid info API (POST {base}/info).
// Semua query read-only; order entry butuh signer EIP-712 yang tidak dibawa di sini.
//
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::domain::{Candle, ExchangeMeta, LiveStats, OrderBook, Side, UserFees};
use crate::exchange::{normalize_symbol, Exchange, ExchangeError};

pub struct HyperliquidClient {
    http: reqwest::Client,
    info_url: Url,
    wallet: RwLock<String>,
}

impl HyperliquidClient {
    pub fn new(base_url: &str, wallet: &str, timeout: Duration) -> Result<Self, ExchangeError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            info_url: base.join("info")?,
            wallet: RwLock::new(wallet.trim().to_string()),
        })
    }

    fn wallet(&self) -> Result<String, ExchangeError> {
        let w = self.wallet.read().unwrap_or_else(|e| e.into_inner()).clone();
        if w.is_empty() { Err(ExchangeError::MissingWallet) } else { Ok(w) }
    }

    async fn info<T: DeserializeOwned>(&self, what: &'static str, body: Value) -> Result<T, ExchangeError> {
        debug!(%what, "info request");
        let rsp = self.http.post(self.info_url.clone()).json(&body).send().await?;
        let status = rsp.status();
        let bytes = rsp.bytes().await?;
        if !status.is_success() {
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        serde_json::from_slice(&bytes).map_err(|source| ExchangeError::Decode { what, source })
    }
}

// ---------- portfolio -> live stats ----------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PortfolioPeriod {
    #[serde(default)]
    account_value_history: Vec<(i64, Value)>,
    #[serde(default)]
    pnl_history: Vec<(i64, Value)>,
}

const PERIOD_PRIORITY: [&str; 8] =
    ["perpDay", "day", "perpWeek", "week", "perpMonth", "month", "perpAllTime", "allTime"];

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn last_point(series: &[(i64, Value)]) -> Option<f64> {
    series.last().and_then(|(_, v)| as_f64(v))
}

pub(crate) fn stats_from_portfolio(periods: &[(String, PortfolioPeriod)]) -> Option<LiveStats> {
    let pick = PERIOD_PRIORITY
        .iter()
        .find_map(|label| periods.iter().find(|(l, _)| l == label))
        .or_else(|| periods.first())
        .map(|(_, p)| p)?;

    let balance = last_point(&pick.account_value_history)?;
    let pnl = last_point(&pick.pnl_history);
    let roe = match pnl {
        Some(p) if balance != 0.0 => p / balance * 100.0,
        _ => 0.0,
    };
    Some(LiveStats { balance, pnl: pnl.unwrap_or(0.0), roe })
}

// ---------- fees ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserFeesRsp {
    #[serde(default)]
    user_cross_rate: String,
    #[serde(default)]
    user_add_rate: String,
    #[serde(default)]
    active_referral_discount: String,
    #[serde(default)]
    active_staking_discount: Option<StakingDiscount>,
}

#[derive(Debug, Deserialize)]
struct StakingDiscount {
    #[serde(default)]
    discount: String,
}

fn parse_or_zero(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

impl From<UserFeesRsp> for UserFees {
    fn from(r: UserFeesRsp) -> Self {
        UserFees {
            cross_rate: parse_or_zero(&r.user_cross_rate),
            add_rate: parse_or_zero(&r.user_add_rate),
            referral_discount: parse_or_zero(&r.active_referral_discount),
            staking_discount: r.active_staking_discount.map_or(0.0, |d| parse_or_zero(&d.discount)),
        }
    }
}

impl Exchange for HyperliquidClient {
    async fn live_stats(&self) -> Result<LiveStats, ExchangeError> {
        let user = self.wallet()?;
        let periods: Vec<(String, PortfolioPeriod)> =
            self.info("portfolio", json!({ "type": "portfolio", "user": user })).await?;
        stats_from_portfolio(&periods).ok_or(ExchangeError::NoData("portfolio"))
    }

    async fn mid_prices(&self) -> Result<BTreeMap<String, f64>, ExchangeError> {
        let raw: BTreeMap<String, String> = self.info("allMids", json!({ "type": "allMids" })).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(coin, px)| px.parse::<f64>().ok().map(|p| (coin, p)))
            .collect())
    }

    async fn meta(&self) -> Result<ExchangeMeta, ExchangeError> {
        self.info("meta", json!({ "type": "meta" })).await
    }

    async fn order_book(&self, coin: &str) -> Result<OrderBook, ExchangeError> {
        self.info("l2Book", json!({ "type": "l2Book", "coin": coin })).await
    }

    async fn candles(
        &self,
        coin: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let body = json!({
            "type": "candleSnapshot",
            "req": { "coin": coin, "interval": interval, "startTime": start_ms, "endTime": end_ms }
        });
        self.info("candleSnapshot", body).await
    }

    async fn historical_fills(&self, limit: usize) -> Result<Vec<Value>, ExchangeError> {
        let user = self.wallet()?;
        let mut rows: Vec<Value> =
            self.info("historicalOrders", json!({ "type": "historicalOrders", "user": user })).await?;
        rows.truncate(limit);
        Ok(rows)
    }

    async fn user_fees(&self) -> Result<UserFees, ExchangeError> {
        let user = self.wallet()?;
        let rsp: UserFeesRsp = self.info("userFees", json!({ "type": "userFees", "user": user })).await?;
        Ok(rsp.into())
    }

    async fn place_order(&self, symbol: &str, side: Side, qty: f64, px: f64) -> Result<String, ExchangeError> {
        debug!(coin = %normalize_symbol(symbol), side = side.as_str(), qty, px, "place_order requested");
        Err(ExchangeError::Unsupported("order signing is not configured"))
    }

    fn set_active_wallet(&self, address: &str) {
        let mut w = self.wallet.write().unwrap_or_else(|e| e.into_inner());
        *w = address.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periods(raw: &str) -> Vec<(String, PortfolioPeriod)> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn picks_perp_day_first() {
        let p = periods(
            r#"[["allTime",{"accountValueHistory":[[1,"999"]],"pnlHistory":[[1,"1"]]}],
                ["perpDay",{"accountValueHistory":[[1,"50"],[2,"200"]],"pnlHistory":[[2,"20"]]}]]"#,
        );
        let s = stats_from_portfolio(&p).unwrap();
        assert_eq!(s.balance, 200.0);
        assert_eq!(s.pnl, 20.0);
        assert_eq!(s.roe, 10.0);
    }

    #[test]
    fn unknown_labels_fall_back_to_first() {
        let p = periods(r#"[["custom",{"accountValueHistory":[[1,0]],"pnlHistory":[[1,"5"]]}]]"#);
        let s = stats_from_portfolio(&p).unwrap();
        assert_eq!(s.balance, 0.0);
        assert_eq!(s.roe, 0.0);
    }

    #[test]
    fn empty_history_is_no_data() {
        assert!(stats_from_portfolio(&periods(r#"[["day",{"accountValueHistory":[]}]]"#)).is_none());
        assert!(stats_from_portfolio(&[]).is_none());
    }

    #[test]
    fn user_fees_decode() {
        let r: UserFeesRsp = serde_json::from_str(
            r#"{"userCrossRate":"0.00045","userAddRate":"0.00015","activeReferralDiscount":"0.04",
                "activeStakingDiscount":{"discount":"0.05"}}"#,
        )
        .unwrap();
        let f: UserFees = r.into();
        assert_eq!(f.cross_rate, 0.00045);
        assert_eq!(f.staking_discount, 0.05);

        let r: UserFeesRsp = serde_json::from_str(r#"{"userCrossRate":"0.0005","activeStakingDiscount":null}"#).unwrap();
        assert_eq!(UserFees::from(r).staking_discount, 0.0);
    }

    #[test]
    fn wallet_is_required_and_swappable() {
        let c = HyperliquidClient::new("https://api.hyperliquid.xyz/", "", Duration::from_secs(1)).unwrap();
        assert!(matches!(c.wallet(), Err(ExchangeError::MissingWallet)));
        c.set_active_wallet(" 0xabc ");
        assert_eq!(c.wallet().unwrap(), "0xabc");
        assert_eq!(c.info_url.as_str(), "https://api.hyperliquid.xyz/info");
    }
}
