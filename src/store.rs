// ===============================
// src/store.rs
// ===============================
//
// Journal JSONL append-only untuk decision & trade:
// - Setiap record ditulis sebagai satu baris JSON lalu di-flush (audit trail per tick).
// - Saat start, file lama dibaca ulang supaya "recent decisions" tetap ada setelah restart.
// - Jika tulis gagal, coba reopen file sekali; kalau tetap gagal, record dibuang (error ke caller).
//
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    sync::Mutex,
};
use tracing::{error, info, warn};

use crate::domain::{Decision, DecisionRecord, Side, TradeRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait Store: Send + Sync + 'static {
    fn record_decision(&self, d: &Decision) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn record_trade(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Newest first.
    fn recent_decisions(&self, limit: usize) -> impl Future<Output = Result<Vec<DecisionRecord>, StoreError>> + Send;

    /// Newest first.
    fn recent_trades(&self, limit: usize) -> impl Future<Output = Result<Vec<TradeRecord>, StoreError>> + Send;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entry {
    Decision(DecisionRecord),
    Trade(TradeRecord),
}

impl Entry {
    fn id(&self) -> i64 {
        match self { Entry::Decision(d) => d.id, Entry::Trade(t) => t.id }
    }
}

struct Journal {
    decisions: Vec<DecisionRecord>,
    trades: Vec<TradeRecord>,
    next_id: i64,
    writer: Option<BufWriter<File>>,
}

pub struct JsonlStore {
    path: Option<PathBuf>,
    inner: Mutex<Journal>,
}

async fn open_writer(path: &Path) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(w: &mut BufWriter<File>, line: &str) -> std::io::Result<()> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}

fn newest<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().rev().take(limit).cloned().collect()
}

impl JsonlStore {
    /// Memory only; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Journal { decisions: Vec::new(), trades: Vec::new(), next_id: 1, writer: None }),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut journal = Journal { decisions: Vec::new(), trades: Vec::new(), next_id: 1, writer: None };

        if fs::try_exists(&path).await? {
            let mut lines = BufReader::new(File::open(&path).await?).lines();
            let mut lineno = 0usize;
            while let Some(line) = lines.next_line().await? {
                lineno += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Entry>(&line) {
                    Ok(entry) => {
                        journal.next_id = journal.next_id.max(entry.id() + 1);
                        match entry {
                            Entry::Decision(d) => journal.decisions.push(d),
                            Entry::Trade(t) => journal.trades.push(t),
                        }
                    }
                    Err(e) => warn!(?e, lineno, path = %path.display(), "journal: skip unreadable line"),
                }
            }
        }

        journal.writer = Some(open_writer(&path).await?);
        info!(
            path = %path.display(),
            decisions = journal.decisions.len(),
            trades = journal.trades.len(),
            "journal opened"
        );
        Ok(Self { path: Some(path), inner: Mutex::new(journal) })
    }

    async fn append(&self, journal: &mut Journal, entry: &Entry) -> Result<(), StoreError> {
        let (Some(path), Some(writer)) = (self.path.as_deref(), journal.writer.as_mut()) else {
            return Ok(());
        };
        let line = serde_json::to_string(entry)?;
        if let Err(e) = write_line(writer, &line).await {
            error!(?e, "journal: write failed, attempting reopen");
            let mut fresh = open_writer(path).await?;
            write_line(&mut fresh, &line).await?;
            journal.writer = Some(fresh);
        }
        Ok(())
    }
}

impl Store for JsonlStore {
    async fn record_decision(&self, d: &Decision) -> Result<i64, StoreError> {
        let mut j = self.inner.lock().await;
        let rec = DecisionRecord { id: j.next_id, decision: d.clone(), created_at: Utc::now() };
        let entry = Entry::Decision(rec.clone());
        self.append(&mut j, &entry).await?;
        j.next_id += 1;
        j.decisions.push(rec);
        Ok(entry.id())
    }

    async fn record_trade(&self, symbol: &str, side: Side, qty: f64, price: f64) -> Result<i64, StoreError> {
        let mut j = self.inner.lock().await;
        let rec = TradeRecord {
            id: j.next_id,
            symbol: symbol.to_string(),
            side,
            qty,
            price,
            pnl: 0.0,
            created_at: Utc::now(),
        };
        let entry = Entry::Trade(rec.clone());
        self.append(&mut j, &entry).await?;
        j.next_id += 1;
        j.trades.push(rec);
        Ok(entry.id())
    }

    async fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(newest(&self.inner.lock().await.decisions, limit))
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(newest(&self.inner.lock().await.trades, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(symbol: &str) -> Decision {
        Decision::none(symbol)
    }

    fn temp_journal(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("perp_agent_bot_{}_{}", std::process::id(), name))
            .join("journal.jsonl")
    }

    #[tokio::test]
    async fn ids_are_shared_and_recent_is_newest_first() {
        let store = JsonlStore::in_memory();
        assert_eq!(store.record_decision(&decision("BTC")).await.unwrap(), 1);
        assert_eq!(store.record_trade("BTC", Side::Buy, 1.0, 100.0).await.unwrap(), 2);
        assert_eq!(store.record_decision(&decision("ETH")).await.unwrap(), 3);

        let recent = store.recent_decisions(10).await.unwrap();
        assert_eq!(recent.iter().map(|d| d.decision.symbol.as_str()).collect::<Vec<_>>(), vec!["ETH", "BTC"]);
        assert_eq!(store.recent_decisions(1).await.unwrap().len(), 1);
        assert_eq!(store.recent_trades(5).await.unwrap()[0].side, Side::Buy);
    }

    #[tokio::test]
    async fn journal_survives_reopen() {
        let path = temp_journal("reopen");
        let _ = std::fs::remove_file(&path);
        {
            let store = JsonlStore::open(&path).await.unwrap();
            store.record_decision(&decision("SOL")).await.unwrap();
            store.record_trade("SOL", Side::Sell, 2.0, 150.0).await.unwrap();
        }
        // baris rusak harus dilewati, bukan gagal
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"{not json}\n"))
            .unwrap();

        let store = JsonlStore::open(&path).await.unwrap();
        assert_eq!(store.recent_decisions(10).await.unwrap()[0].decision.symbol, "SOL");
        assert_eq!(store.recent_trades(10).await.unwrap()[0].qty, 2.0);
        assert_eq!(store.record_decision(&decision("BTC")).await.unwrap(), 3);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
