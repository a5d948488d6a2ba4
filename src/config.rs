// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : perp_agent_bot — async perp trading loop with an external decision
          service, plus fill-history PnL reconciliation
Module  : config.rs
Version : 0.1.0

Summary : Reads .env + process environment into Settings: exchange endpoint
          and wallet, decision service credentials, loop timing and
          watchlist, journal path, metrics port, and fallback fee rates.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::agent::DeepseekCfg;
use crate::bot::BotCfg;
use crate::domain::FeeParams;

pub const DEFAULT_WATCHLIST: [&str; 9] = ["BTC", "ETH", "SOL", "XRP", "DOGE", "ADA", "DOT", "LINK", "WLD"];

#[derive(Clone, Debug)]
pub struct Settings {
    // exchange
    pub hl_base_url: String,
    pub hl_wallet: String,
    pub hl_timeout: Duration,

    // decision service
    pub deepseek: DeepseekCfg,

    // loop
    pub bot: BotCfg,

    // files/metrics
    pub store_file: Option<String>,
    pub metrics_port: u16,

    // fallback fee kalau query userFees gagal
    pub fallback_fee: FeeParams,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// "btc, eth,,sol" -> ["BTC", "ETH", "SOL"]
pub fn parse_watchlist(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for coin in raw.split(',').map(|x| x.trim().to_ascii_uppercase()).filter(|x| !x.is_empty()) {
        if !out.contains(&coin) {
            out.push(coin);
        }
    }
    out
}

pub fn load() -> Settings {
    // Pastikan .env dibaca (HL_WALLET, DEEPSEEK_API_KEY, dll)
    let _ = dotenv();

    // ===== Exchange =====
    let hl_base_url = var_or("HL_BASE_URL", "https://api.hyperliquid.xyz");
    let hl_wallet = var_or("HL_WALLET", "");
    let hl_timeout = Duration::from_secs(parse_or("HL_HTTP_TIMEOUT_SECS", 10));

    // ===== Decision service =====
    let deepseek = DeepseekCfg {
        api_key: var_or("DEEPSEEK_API_KEY", ""),
        base_url: var_or("DEEPSEEK_BASE_URL", "https://api.deepseek.com"),
        model: var_or("DEEPSEEK_MODEL", "deepseek-chat"),
    };

    // ===== Loop =====
    // WATCHLIST=BTC,ETH,SOL
    let watchlist = env::var("WATCHLIST")
        .ok()
        .map(|s| parse_watchlist(&s))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect());

    let bot = BotCfg {
        default_symbol: var_or("DEFAULT_SYMBOL", "BTC").to_ascii_uppercase(),
        watchlist,
        tick_interval: Duration::from_secs(parse_or::<u64>("TICK_INTERVAL_SECS", 900).max(1)),
        decision_timeout: Duration::from_secs(parse_or("DECISION_TIMEOUT_SECS", 120)),
        candle_interval: var_or("CANDLE_INTERVAL", "15m"),
        candle_lookback: Duration::from_secs(parse_or::<u64>("CANDLE_LOOKBACK_MINS", 180).saturating_mul(60)),
        history_limit: parse_or("HISTORY_LIMIT", 50),
        decision_limit: parse_or("DECISION_LIMIT", 10),
        place_orders: parse_or("PLACE_ORDERS", false),
    };

    // STORE_FILE= (kosong) -> journal hanya di memori
    let store_file = match env::var("STORE_FILE") {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().to_string()),
        Err(_) => Some("data/journal.jsonl".to_string()),
    };
    let metrics_port = parse_or("METRICS_PORT", 9898);

    let fallback_fee = FeeParams {
        maker: parse_or("FEE_MAKER", 0.00015),
        taker: parse_or("FEE_TAKER", 0.00045),
        discount: 0.0,
    };

    Settings { hl_base_url, hl_wallet, hl_timeout, deepseek, bot, store_file, metrics_port, fallback_fee }
}
