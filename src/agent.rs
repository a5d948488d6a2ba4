// ===============================
// src/agent.rs
// ===============================
//
// Decision service: snapshot masuk, keputusan keluar.
// Adapter HTTP memakai endpoint chat-completions yang kompatibel OpenAI (DeepSeek),
// dengan response_format json_object. Isi prompt sengaja ringkas.
//
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DecisionDraft;
use crate::snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decision service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed decision payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("decision service timed out after {0:?}")]
    Timeout(Duration),
}

pub trait DecisionAgent: Send + Sync + 'static {
    fn decide(&self, snapshot: Snapshot) -> impl Future<Output = Result<DecisionDraft, AgentError>> + Send;
}

#[derive(Debug, Clone)]
pub struct DeepseekCfg {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

pub struct DeepseekAgent {
    http: reqwest::Client,
    cfg: DeepseekCfg,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

const SYSTEM_PROMPT: &str = "You trade USDC-margined perpetuals, long only. \
Reply with one JSON object: {\"action\":\"buy|sell|none\",\"symbol\":\"COIN\",\"size\":number,\
\"order\":\"market|limit\",\"limitPrice\":number,\"targets\":{\"tp1\":n,\"tp2\":n,\"tp3\":n,\"sl\":n}}.";

fn user_prompt(s: &Snapshot) -> Result<String, serde_json::Error> {
    let mut out = format!(
        "Balance: {:.2}\nPnL: {:.2}\nROE: {:.2}%\n",
        s.balance, s.pnl, s.roe
    );
    out.push_str(&format!(
        "Recent fills: {}, previous decisions: {}, order books: {}, candle series: {}\n\n",
        s.trades.len(),
        s.decisions.len(),
        s.order_books.len(),
        s.candles.len()
    ));
    out.push_str(&serde_json::to_string(s)?);
    Ok(out)
}

/// Content of the first choice, parsed as a decision. No choices = empty draft.
fn draft_from_response(rsp: ChatResponse) -> Result<DecisionDraft, AgentError> {
    match rsp.choices.into_iter().next() {
        Some(c) => Ok(serde_json::from_str(&c.message.content)?),
        None => Ok(DecisionDraft::default()),
    }
}

impl DeepseekAgent {
    pub fn new(cfg: DeepseekCfg, timeout: Duration) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, cfg })
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }
}

impl DecisionAgent for DeepseekAgent {
    async fn decide(&self, snapshot: Snapshot) -> Result<DecisionDraft, AgentError> {
        // tanpa API key: selalu "none"
        if self.cfg.api_key.is_empty() {
            return Ok(DecisionDraft::default());
        }

        let req = ChatRequest {
            model: &self.cfg.model,
            messages: vec![
                ChatMessage { role: "system".into(), content: SYSTEM_PROMPT.into() },
                ChatMessage { role: "user".into(), content: user_prompt(&snapshot)? },
            ],
            temperature: 0.2,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let rsp = self
            .http
            .post(self.url())
            .bearer_auth(&self.cfg.api_key)
            .json(&req)
            .send()
            .await?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(AgentError::Status { status: status.as_u16(), body });
        }

        let body = rsp.bytes().await?;
        draft_from_response(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LiveStats;
    use crate::snapshot::SnapshotBuilder;

    #[test]
    fn first_choice_content_is_the_decision() {
        let rsp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"action\":\"sell\",\"symbol\":\"ETH\",\"size\":1}"}}]}"#,
        )
        .unwrap();
        let d = draft_from_response(rsp).unwrap();
        assert_eq!(d.action.as_deref(), Some("sell"));
        assert_eq!(d.size, Some(1.0));
    }

    #[test]
    fn no_choices_is_empty_draft() {
        let rsp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(draft_from_response(rsp).unwrap(), DecisionDraft::default());
    }

    #[test]
    fn non_json_content_is_malformed() {
        let rsp: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"buy BTC now"}}]}"#).unwrap();
        assert!(matches!(draft_from_response(rsp), Err(AgentError::Malformed(_))));
    }

    #[tokio::test]
    async fn missing_api_key_yields_empty_draft() {
        let agent = DeepseekAgent::new(
            DeepseekCfg { api_key: String::new(), base_url: "http://127.0.0.1:1".into(), model: "m".into() },
            Duration::from_secs(1),
        )
        .unwrap();
        let snap = SnapshotBuilder::new(LiveStats::default()).build();
        assert_eq!(agent.decide(snap).await.unwrap(), DecisionDraft::default());
    }

    #[test]
    fn prompt_carries_snapshot_json() {
        let snap = SnapshotBuilder::new(LiveStats { balance: 1000.0, pnl: 25.0, roe: 2.5 }).build();
        let p = user_prompt(&snap).unwrap();
        assert!(p.starts_with("Balance: 1000.00"));
        assert!(p.contains("\"balance\":1000.0"));
    }
}
