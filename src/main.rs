// ===============================
// src/main.rs
// ===============================
/*
 # jalankan loop bot (default)
 cargo run --release -- run

 # satu tick saja (debug pipeline)
 cargo run --release -- tick

 # laporan PnL dari historicalOrders
 cargo run --release -- summary --wallet 0xabc... --limit 200
 cargo run --release -- summary --totals

 # cek metrics
 curl -s localhost:9898/metrics | egrep '^bot_(ticks|tick_skips|decisions)'
*/
/*
=============================================================================
Project : perp_agent_bot — async perp trading loop with an external decision
          service, plus fill-history PnL reconciliation
Module  : main.rs
Version : 0.1.0

Summary : Polls Hyperliquid on a fixed interval, builds a market snapshot for
          the watchlist, asks a decision service for buy/sell/none, journals
          every outcome, and rebuilds realized PnL from historical fills.
=============================================================================
*/
mod agent;
mod bot;
mod config;
mod domain;
mod exchange;
mod fills;
mod hyperliquid;
mod metrics;
mod pnl;
mod snapshot;
mod store;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::{
    select,
    time::{interval, Duration},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::DeepseekAgent;
use crate::bot::{BotService, TickOutcome};
use crate::domain::FeeParams;
use crate::exchange::Exchange;
use crate::hyperliquid::HyperliquidClient;
use crate::store::{JsonlStore, Store};

#[derive(Debug, Parser)]
#[command(name = "perp_agent_bot", version, about = "Perp trading loop + PnL reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduling loop until Ctrl-C
    Run,
    /// Run exactly one tick and print the outcome
    Tick,
    /// Rebuild realized PnL from historical fills and print JSON
    Summary {
        #[arg(long, default_value_t = 200)]
        limit: usize,
        /// Wallet to report on (defaults to HL_WALLET)
        #[arg(long)]
        wallet: Option<String>,
        /// Print per-coin totals instead of rows
        #[arg(long)]
        totals: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = config::load();

    let exchange = HyperliquidClient::new(&settings.hl_base_url, &settings.hl_wallet, settings.hl_timeout)
        .context("build exchange client")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(settings, exchange).await,
        Command::Tick => tick(settings, exchange).await,
        Command::Summary { limit, wallet, totals } => summary(settings, exchange, limit, wallet, totals).await,
    }
}

async fn build_bot(
    settings: &config::Settings,
    exchange: HyperliquidClient,
) -> anyhow::Result<BotService<HyperliquidClient, DeepseekAgent, JsonlStore>> {
    let store = match &settings.store_file {
        Some(path) => JsonlStore::open(path).await.with_context(|| format!("open journal {path}"))?,
        None => JsonlStore::in_memory(),
    };
    if let Some(last) = store.recent_trades(1).await?.first() {
        info!(symbol = %last.symbol, side = last.side.as_str(), at = %last.created_at, "last journaled trade");
    }
    let agent = DeepseekAgent::new(settings.deepseek.clone(), settings.bot.decision_timeout)
        .context("build decision client")?;
    Ok(BotService::new(exchange, agent, store, settings.bot.clone()))
}

async fn tick(settings: config::Settings, exchange: HyperliquidClient) -> anyhow::Result<()> {
    metrics::init();
    let bot = build_bot(&settings, exchange).await?;
    match bot.tick_once().await {
        TickOutcome::Completed(d) => println!("{}", serde_json::to_string_pretty(&d)?),
        TickOutcome::Skipped(step) => anyhow::bail!("tick skipped at {step}"),
        TickOutcome::Cancelled => anyhow::bail!("tick cancelled"),
    }
    Ok(())
}

async fn run(settings: config::Settings, exchange: HyperliquidClient) -> anyhow::Result<()> {
    info!(
        hl_base = %settings.hl_base_url,
        wallet_set = !settings.hl_wallet.is_empty(),
        model = %settings.deepseek.model,
        agent_enabled = !settings.deepseek.api_key.is_empty(),
        watchlist = ?settings.bot.watchlist,
        store = ?settings.store_file,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if settings.metrics_port != 0 {
        metrics::serve_metrics(settings.metrics_port);
    }

    let bot = build_bot(&settings, exchange).await?;
    bot.start().await;

    // ---- Heartbeat sampai Ctrl-C ----
    let mut heartbeat = interval(Duration::from_secs(60));
    loop {
        select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(?e, "ctrl_c listener failed");
                }
                break;
            }
            _ = heartbeat.tick() => {
                info!(running = bot.is_running().await, "heartbeat");
            }
        }
    }

    bot.stop().await;
    Ok(())
}

async fn summary(
    settings: config::Settings,
    exchange: HyperliquidClient,
    limit: usize,
    wallet: Option<String>,
    totals: bool,
) -> anyhow::Result<()> {
    if let Some(w) = wallet {
        exchange.set_active_wallet(&w);
    }

    let raw = exchange.historical_fills(limit).await.context("fetch historical fills")?;

    let fee = match exchange.user_fees().await {
        Ok(f) => FeeParams::from_user_fees(&f),
        Err(e) => {
            warn!(?e, "user fees unavailable, using fallback rates");
            settings.fallback_fee
        }
    };

    let out = if totals {
        let (rows, ledger) = pnl::replay(fills::parse_all(&raw), fee);
        info!(records = raw.len(), rows = rows.len(), "trade totals built");
        serde_json::to_string_pretty(&pnl::totals(&rows, &ledger))?
    } else {
        let rows = pnl::reconcile(&raw, fee);
        info!(records = raw.len(), rows = rows.len(), "trade summary built");
        serde_json::to_string_pretty(&rows)?
    };
    println!("{out}");
    Ok(())
}
