//! Slip data extraction from a decoded QR payload.
//!
//! Bank slips carry their details in whatever format the issuing app chose:
//! EMVCo TLV, a JSON blob, a few lines of text or a URL. Each format has a
//! strategy below. Strategies run in a fixed order; each one returns the
//! fields it found and a merge policy decides how they combine with what
//! earlier strategies produced.
//!
//! Extraction never fails. A slip whose amount is still zero at the end is
//! reported by the reconciler as `PARSE_FAILED`.

pub mod calendar;
mod emvco;
mod json;
mod query;
mod text;

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::qr_decode::is_emvco_shaped;

/// Normalized slip details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipData {
    /// Transferred amount. Zero means none was found.
    pub amount: Decimal,
    pub date_time: String,
    pub account_name: String,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
}

/// Partial result of one strategy. `None` means "not found here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlipFields {
    pub amount: Option<Decimal>,
    pub date_time: Option<String>,
    pub account_name: Option<String>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
}

impl SlipFields {
    /// Take fields from `other` only where `self` has none.
    pub fn fill_unset(&mut self, other: SlipFields) {
        self.amount = self.amount.or(other.amount);
        self.date_time = self.date_time.take().or(other.date_time);
        self.account_name = self.account_name.take().or(other.account_name);
        self.transaction_id = self.transaction_id.take().or(other.transaction_id);
        self.reference = self.reference.take().or(other.reference);
    }

    /// Every field present in `other` replaces the current value.
    pub fn overwrite(&mut self, other: SlipFields) {
        self.amount = other.amount.or(self.amount);
        self.date_time = other.date_time.or(self.date_time.take());
        self.account_name = other.account_name.or(self.account_name.take());
        self.transaction_id = other.transaction_id.or(self.transaction_id.take());
        self.reference = other.reference.or(self.reference.take());
    }

    pub fn into_slip(self) -> SlipData {
        SlipData {
            amount: self.amount.unwrap_or_default(),
            date_time: self.date_time.unwrap_or_default(),
            account_name: self.account_name.unwrap_or_default(),
            transaction_id: self.transaction_id,
            reference: self.reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    FillUnset,
    Overwrite,
}

struct Strategy {
    name: &'static str,
    engages: fn(&str, &SlipFields) -> bool,
    run: fn(&str, DateTime<FixedOffset>) -> Option<SlipFields>,
    merge: Merge,
}

const STRATEGIES: [Strategy; 4] = [
    Strategy {
        name: "emvco",
        engages: |raw, _| is_emvco_shaped(raw),
        run: emvco::fields,
        merge: Merge::FillUnset,
    },
    Strategy {
        name: "json",
        engages: |_, found| found.amount.is_none(),
        run: json::fields,
        merge: Merge::Overwrite,
    },
    Strategy {
        name: "text",
        engages: |_, found| found.amount.is_none(),
        run: text::fields,
        merge: Merge::FillUnset,
    },
    // Engages even after an amount was found and overwrites it.
    // Kept as the storefront has always behaved, though a payload that merely
    // mentions "promptpay" can clobber EMVCo fields this way.
    Strategy {
        name: "url",
        engages: |raw, _| raw.starts_with("http") || raw.contains("promptpay"),
        run: query::fields,
        merge: Merge::Overwrite,
    },
];

/// Extract slip data, defaulting timestamps to the current Bangkok time.
pub fn extract(raw: &str) -> SlipData {
    extract_at(raw, calendar::now_bangkok())
}

/// Extract slip data with `now` as the fallback timestamp.
pub fn extract_at(raw: &str, now: DateTime<FixedOffset>) -> SlipData {
    let mut found = SlipFields::default();
    for strategy in &STRATEGIES {
        if !(strategy.engages)(raw, &found) {
            continue;
        }
        match (strategy.run)(raw, now) {
            Some(fields) => {
                debug!(strategy = strategy.name, ?fields, "strategy matched");
                match strategy.merge {
                    Merge::FillUnset => found.fill_unset(fields),
                    Merge::Overwrite => found.overwrite(fields),
                }
            }
            None => debug!(strategy = strategy.name, "strategy found nothing"),
        }
    }

    if found.amount.is_none() {
        warn!("failed to extract amount from QR data");
    }
    let slip = found.into_slip();
    debug!(?slip, "final slip data");
    slip
}

static LEADING_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?[0-9]+(?:\.[0-9]*)?)").ok());

/// Lenient decimal parse: reads the leading number and ignores the rest,
/// so `"100.00 THB"` is 100.00.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let caps = LEADING_NUMBER.as_ref()?.captures(s)?;
    let number = caps[1].trim_end_matches('.');
    Decimal::from_str(number).ok()
}

/// Amounts only count when positive.
fn positive(amount: Option<Decimal>) -> Option<Decimal> {
    amount.filter(|a| *a > Decimal::ZERO)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// `date` and `time` joined with a space; either alone stands in.
fn join_date_time(date: Option<String>, time: Option<String>) -> Option<String> {
    match (date, time) {
        (Some(d), Some(t)) => Some(format!("{} {}", d, t)),
        (d, t) => d.or(t),
    }
}
