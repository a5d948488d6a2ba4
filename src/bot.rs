// ===============================
// src/bot.rs (scheduling loop)
// ===============================
//
// State machine: Stopped -> Running -> Stopped.
// Per tick (tidak overlap, tick berikutnya menunggu tick sekarang selesai):
//   1) live stats   2) mids (filter watchlist)   3) meta
//   4) per coin: order book + candles (gagal satu coin -> coin itu saja dilewati)
//   5) recent fills + recent decisions
//   6) snapshot -> decision service (timeout, gagal -> "none")
//   7) normalize -> simpan decision; kalau sudah di-stop berhenti di sini
//   8) order (opsional) + simpan trade kalau action != none
// Kegagalan di langkah 1,2,3,5 membatalkan tick ini saja; loop jalan terus.
//
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::{
    select,
    sync::RwLock,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{AgentError, DecisionAgent};
use crate::domain::{Candle, Decision, OrderBook};
use crate::exchange::{Exchange, ExchangeError};
use crate::fills;
use crate::metrics::{
    DECISIONS, DECISION_LATENCY, INSTRUMENT_FAILURES, LAST_TICK_TS, PERSIST_ERRORS, RUNNING, TICKS, TICK_SKIPS,
};
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct BotCfg {
    pub watchlist: Vec<String>,
    pub default_symbol: String,
    pub tick_interval: Duration,
    pub decision_timeout: Duration,
    pub candle_interval: String,
    pub candle_lookback: Duration,
    pub history_limit: usize,
    pub decision_limit: usize,
    /// Send non-none decisions to the exchange before journaling the trade.
    pub place_orders: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStep {
    LiveStats,
    MidPrices,
    Meta,
    RecentFills,
    RecentDecisions,
}

impl TickStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickStep::LiveStats => "live_stats",
            TickStep::MidPrices => "mid_prices",
            TickStep::Meta => "meta",
            TickStep::RecentFills => "recent_fills",
            TickStep::RecentDecisions => "recent_decisions",
        }
    }
}

impl fmt::Display for TickStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(Decision),
    Skipped(TickStep),
    Cancelled,
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            TickOutcome::Completed(_) => "completed",
            TickOutcome::Skipped(_) => "skipped",
            TickOutcome::Cancelled => "cancelled",
        }
    }
}

enum RunState {
    Stopped,
    Running { cancel: CancellationToken, _task: JoinHandle<()> },
}

struct Pipeline<E, A, S> {
    exchange: E,
    agent: A,
    store: S,
    cfg: BotCfg,
}

/// Public surface: `start`, `stop`, `is_running`. Everything else runs on the loop task.
pub struct BotService<E, A, S> {
    pipeline: Arc<Pipeline<E, A, S>>,
    state: RwLock<RunState>,
}

impl<E: Exchange, A: DecisionAgent, S: Store> BotService<E, A, S> {
    pub fn new(exchange: E, agent: A, store: S, cfg: BotCfg) -> Self {
        Self {
            pipeline: Arc::new(Pipeline { exchange, agent, store, cfg }),
            state: RwLock::new(RunState::Stopped),
        }
    }

    /// No-op when already running.
    pub async fn start(&self) {
        let mut state = self.state.write().await;
        if matches!(*state, RunState::Running { .. }) {
            return;
        }
        let cancel = CancellationToken::new();
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(run_loop(pipeline, cancel.clone()));
        *state = RunState::Running { cancel, _task: task };
        RUNNING.set(1);
        info!(
            interval_secs = self.pipeline.cfg.tick_interval.as_secs(),
            watchlist = ?self.pipeline.cfg.watchlist,
            "bot started"
        );
    }

    /// Signals the loop and returns; an in-flight step finishes on its own. No-op when stopped.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if let RunState::Running { cancel, .. } = std::mem::replace(&mut *state, RunState::Stopped) {
            cancel.cancel();
            RUNNING.set(0);
            info!("bot stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.read().await, RunState::Running { .. })
    }

    /// One tick, outside the timer. Used by tests and one-shot runs.
    pub async fn tick_once(&self) -> TickOutcome {
        self.pipeline.tick(&CancellationToken::new()).await
    }
}

async fn run_loop<E: Exchange, A: DecisionAgent, S: Store>(
    pipeline: Arc<Pipeline<E, A, S>>,
    cancel: CancellationToken,
) {
    // tick pertama langsung jalan, berikutnya tiap interval
    let mut ticker = interval(pipeline.cfg.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let outcome = pipeline.tick(&cancel).await;
        TICKS.with_label_values(&[outcome.label()]).inc();
        if outcome == TickOutcome::Cancelled {
            break;
        }
    }
    info!("bot loop exited");
}

impl<E: Exchange, A: DecisionAgent, S: Store> Pipeline<E, A, S> {
    fn skip(&self, step: TickStep, err: &dyn fmt::Display) -> TickOutcome {
        warn!(%step, error = %err, "tick skipped");
        TICK_SKIPS.with_label_values(&[step.as_str()]).inc();
        TickOutcome::Skipped(step)
    }

    async fn tick(&self, cancel: &CancellationToken) -> TickOutcome {
        let snapshot = match self.snapshot(cancel).await {
            Ok(Some(s)) => s,
            Ok(None) => return TickOutcome::Cancelled,
            Err(outcome) => return outcome,
        };
        if cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        let decision = self.decide(snapshot).await;
        self.record_decision(&decision).await;
        // stop() datang saat decision call berjalan: simpan decision saja, jangan order/trade
        if cancel.is_cancelled() {
            info!(action = decision.action.as_str(), symbol = %decision.symbol, "stopped during decision, order dropped");
            return TickOutcome::Cancelled;
        }
        self.execute(&decision).await;

        LAST_TICK_TS.set(Utc::now().timestamp());
        info!(
            action = decision.action.as_str(),
            symbol = %decision.symbol,
            size = decision.size,
            "tick completed"
        );
        TickOutcome::Completed(decision)
    }

    /// `Ok(None)` = cancelled between steps.
    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Option<Snapshot>, TickOutcome> {
        let cfg = &self.cfg;

        let stats = self.exchange.live_stats().await.map_err(|e| self.skip(TickStep::LiveStats, &e))?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mids = self.exchange.mid_prices().await.map_err(|e| self.skip(TickStep::MidPrices, &e))?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let meta = self.exchange.meta().await.map_err(|e| self.skip(TickStep::Meta, &e))?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut builder = SnapshotBuilder::new(stats).mids(mids, &cfg.watchlist).meta(meta);

        // per coin independen; gagal satu coin tidak menghapus coin lain
        let end_ms = Utc::now().timestamp_millis();
        let lookback_ms = i64::try_from(cfg.candle_lookback.as_millis()).unwrap_or(i64::MAX);
        let start_ms = end_ms.saturating_sub(lookback_ms);
        let jobs: Vec<_> = cfg.watchlist.iter().map(|coin| self.instrument(coin, start_ms, end_ms)).collect();
        let fetched = join_all(jobs).await;
        for (coin, res) in cfg.watchlist.iter().zip(fetched) {
            match res {
                Ok((book, candles)) => builder = builder.instrument(coin, book, candles),
                Err(e) => {
                    warn!(symbol = %coin, error = %e, "instrument fetch failed, omitted from snapshot");
                    INSTRUMENT_FAILURES.with_label_values(&[coin]).inc();
                }
            }
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let raw_fills = self
            .exchange
            .historical_fills(cfg.history_limit)
            .await
            .map_err(|e| self.skip(TickStep::RecentFills, &e))?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let decisions = self
            .store
            .recent_decisions(cfg.decision_limit)
            .await
            .map_err(|e| self.skip(TickStep::RecentDecisions, &e))?;

        Ok(Some(builder.history(fills::parse_all(&raw_fills), decisions).build()))
    }

    async fn instrument(&self, coin: &str, start_ms: i64, end_ms: i64) -> Result<(OrderBook, Vec<Candle>), ExchangeError> {
        let book = self.exchange.order_book(coin).await?;
        let candles = self.exchange.candles(coin, &self.cfg.candle_interval, start_ms, end_ms).await?;
        Ok((book, candles))
    }

    async fn decide(&self, snapshot: Snapshot) -> Decision {
        let started = Instant::now();
        let res = match tokio::time::timeout(self.cfg.decision_timeout, self.agent.decide(snapshot)).await {
            Ok(r) => r,
            Err(_) => Err(AgentError::Timeout(self.cfg.decision_timeout)),
        };
        DECISION_LATENCY.observe(started.elapsed().as_secs_f64());

        match res {
            Ok(draft) => {
                let d = draft.normalize(&self.cfg.default_symbol);
                DECISIONS.with_label_values(&[d.action.as_str(), "agent"]).inc();
                d
            }
            Err(e) => {
                warn!(error = %e, "decision service failed, falling back to none");
                DECISIONS.with_label_values(&["none", "fallback"]).inc();
                Decision::none(&self.cfg.default_symbol)
            }
        }
    }

    async fn record_decision(&self, d: &Decision) {
        if let Err(e) = self.store.record_decision(d).await {
            error!(error = %e, "record decision failed");
            PERSIST_ERRORS.with_label_values(&["decision"]).inc();
        }
    }

    /// Order (opsional) + trade journal untuk action buy/sell.
    async fn execute(&self, d: &Decision) {
        let Some(side) = d.action.side() else { return };
        if self.cfg.place_orders {
            match self.exchange.place_order(&d.symbol, side, d.size, d.limit_price).await {
                Ok(oid) => info!(%oid, symbol = %d.symbol, side = side.as_str(), "order placed"),
                Err(e) => warn!(error = %e, symbol = %d.symbol, "place order failed"),
            }
        }
        if let Err(e) = self.store.record_trade(&d.symbol, side, d.size, d.limit_price).await {
            error!(error = %e, symbol = %d.symbol, "record trade failed");
            PERSIST_ERRORS.with_label_values(&["trade"]).inc();
        }
    }
}
