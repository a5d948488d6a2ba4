// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{debug, error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Bot loop --------
pub static TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bot_ticks_total", "bot ticks by outcome (completed, skipped, cancelled)"),
        &["outcome"],
    )
    .expect("metric bot_ticks_total")
});

pub static TICK_SKIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bot_tick_skips_total", "ticks abandoned, by failed step"),
        &["step"],
    )
    .expect("metric bot_tick_skips_total")
});

pub static INSTRUMENT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bot_instrument_fetch_failures_total", "book/candle fetch failures per coin"),
        &["symbol"],
    )
    .expect("metric bot_instrument_fetch_failures_total")
});

pub static DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bot_decisions_total", "decisions by action and source (agent, fallback)"),
        &["action", "source"],
    )
    .expect("metric bot_decisions_total")
});

pub static PERSIST_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bot_persist_errors_total", "journal write failures"),
        &["kind"],
    )
    .expect("metric bot_persist_errors_total")
});

// Latency of one decision call (seconds)
pub static DECISION_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("bot_decision_latency_seconds", "decision service round-trip")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric bot_decision_latency_seconds")
});

pub static RUNNING: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("bot_running", "1 while the loop is running").expect("metric bot_running"));

pub static LAST_TICK_TS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("bot_last_completed_tick_ts", "unix seconds of the last completed tick")
        .expect("metric bot_last_completed_tick_ts")
});

pub fn init() {
    let regs = [
        REGISTRY.register(Box::new(TICKS.clone())),
        REGISTRY.register(Box::new(TICK_SKIPS.clone())),
        REGISTRY.register(Box::new(INSTRUMENT_FAILURES.clone())),
        REGISTRY.register(Box::new(DECISIONS.clone())),
        REGISTRY.register(Box::new(PERSIST_ERRORS.clone())),
        REGISTRY.register(Box::new(DECISION_LATENCY.clone())),
        REGISTRY.register(Box::new(RUNNING.clone())),
        REGISTRY.register(Box::new(LAST_TICK_TS.clone())),
    ];
    for r in regs {
        if let Err(e) = r {
            error!(?e, "metric register failed");
        }
    }
}

// Prometheus text format dari registry bot
fn encode_metrics() -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
        error!(?e, "metrics encode failed");
        buf.clear();
    }
    if buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// "GET /metrics HTTP/1.1" -> Some("/metrics"); query string dibuang.
fn request_path(req: &str) -> Option<&str> {
    let mut parts = req.lines().next()?.split_whitespace();
    let _method = parts.next()?;
    parts.next().map(|target| target.split('?').next().unwrap_or(target))
}

// Hanya "/" dan "/metrics" yang dilayani; sisanya 404
fn response_for(req: &str) -> Vec<u8> {
    let (status, body) = match request_path(req) {
        Some("/") | Some("/metrics") => ("200 OK", encode_metrics()),
        _ => ("404 Not Found", b"not found\n".to_vec()),
    };
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(&body);
    out
}

fn handle_client(mut stream: TcpStream) {
    let mut req_buf = [0u8; 1024];
    let n = stream.read(&mut req_buf).unwrap_or(0);
    let resp = response_for(&String::from_utf8_lossy(&req_buf[..n]));
    if let Err(e) = stream.write_all(&resp).and_then(|_| stream.flush()) {
        debug!(?e, "metrics client write failed");
    }
}

// Server metrics di OS thread sendiri, di luar runtime Tokio
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(?e, %addr, "metrics bind failed");
                return;
            }
        };
        info!("metrics listening on http://{addr}/metrics");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
