use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::{SlipFields, join_date_time, non_empty, parse_amount, positive};

pub(super) fn fields(raw: &str, _now: DateTime<FixedOffset>) -> Option<SlipFields> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "payload is not JSON");
            return None;
        }
    };
    let Value::Object(obj) = value else {
        debug!("JSON payload is not an object");
        return None;
    };

    let text = |key: &str| obj.get(key).and_then(scalar_text);
    Some(SlipFields {
        amount: positive(obj.get("amount").and_then(json_amount)),
        date_time: join_date_time(text("date"), text("time")),
        account_name: text("account"),
        transaction_id: text("transactionId"),
        reference: text("ref"),
    })
}

fn json_amount(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Strings and numbers as text. Empty strings count as absent.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
