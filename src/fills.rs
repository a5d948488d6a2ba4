// ===============================
// src/fills.rs
// ===============================
//
// Parser untuk record historicalOrders mentah dari exchange:
//   { "order": { coin, side, limitPx, origSz | sz, orderType, tif, isTrigger, timestamp },
//     "statusTimestamp": ... }
// Record yang tidak lengkap bukan error; hasilnya `FillParse::Skip`.
//
use serde_json::Value;

use crate::domain::{Fill, OrderClass, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAnOrder,
    UnknownSide,
    MissingPrice,
    ZeroQuantity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillParse {
    Fill(Fill),
    Skip(SkipReason),
}

/// Exchange sends numbers either as JSON strings ("101.5") or JSON numbers.
/// Anything else, or unparsable text, reads as 0.
fn num(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text<'a>(v: Option<&'a Value>) -> Option<&'a str> {
    v.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

fn timestamp(record: &Value, order: &Value) -> i64 {
    record
        .get("statusTimestamp")
        .and_then(Value::as_f64)
        .or_else(|| order.get("timestamp").and_then(Value::as_f64))
        .map(|t| t as i64)
        .unwrap_or(0)
}

pub fn parse(record: &Value) -> FillParse {
    let Some(order) = record.get("order").filter(|o| o.is_object()) else {
        return FillParse::Skip(SkipReason::NotAnOrder);
    };

    let Some(side) = text(order.get("side")).and_then(Side::from_exchange) else {
        return FillParse::Skip(SkipReason::UnknownSide);
    };

    // origSz diutamakan, fallback ke sz kalau kosong
    let qty_field = order
        .get("origSz")
        .filter(|v| v.is_number() || text(Some(v)).is_some())
        .or_else(|| order.get("sz"));
    let qty = num(qty_field);
    if !(qty > 0.0) {
        return FillParse::Skip(SkipReason::ZeroQuantity);
    }

    let px = num(order.get("limitPx"));
    if !(px > 0.0) {
        return FillParse::Skip(SkipReason::MissingPrice);
    }

    let class = OrderClass {
        is_market: text(order.get("orderType")) == Some("Market"),
        is_trigger: order.get("isTrigger").and_then(Value::as_bool).unwrap_or(false),
        tif: text(order.get("tif")).map(str::to_string),
    };

    FillParse::Fill(Fill {
        ts_ms: timestamp(record, order),
        coin: text(order.get("coin")).unwrap_or_default().to_string(),
        side,
        px,
        qty,
        class,
    })
}

/// Parse every record, keeping input order and dropping skips.
pub fn parse_all(records: &[Value]) -> Vec<Fill> {
    records
        .iter()
        .filter_map(|r| match parse(r) {
            FillParse::Fill(f) => Some(f),
            FillParse::Skip(reason) => {
                tracing::trace!(?reason, "fill skipped");
                None
            }
        })
        .collect()
}
