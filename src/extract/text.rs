//! Free-text slips, read line by line with ordered pattern lists.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use super::calendar::buddhist_to_gregorian;
use super::{SlipFields, join_date_time, non_empty, parse_amount, positive};

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static AMOUNT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)amount[:\s]*([0-9]+(?:\.[0-9]{2})?)",
        r"(?i)จำนวน[:\s]*([0-9]+(?:\.[0-9]{2})?)",
        r"(?i)amt[:\s]*([0-9]+(?:\.[0-9]{2})?)",
        r"([0-9]+\.[0-9]{2})",
    ])
});

static DATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)date[:\s]*(\S+\s+\S+)",
        r"(?i)วันที่[:\s]*(\S+)",
        r"([0-9]{1,2}/[0-9]{1,2}/25[0-9]{2})",
        r"([0-9]{4}-[0-9]{2}-[0-9]{2})",
    ])
});

static TIME: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&[r"([0-9]{1,2}:[0-9]{2}(?::[0-9]{2})?)"]));

static ACCOUNT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)account[:\s]*(.+)",
        r"(?i)receiver[:\s]*(.+)",
        r"(?i)ผู้รับ[:\s]*(.+)",
        r"(?i)to[:\s]*(.+)",
    ])
});

static TRANSACTION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)ref[:\s]*(\S+)",
        r"(?i)transaction[:\s]*(\S+)",
        r"(?i)txn[:\s]*(\S+)",
        r"(?i)id[:\s]*(\S+)",
    ])
});

/// Capture group 1 of the first pattern that matches `line`.
fn first_capture<'a>(patterns: &[Regex], line: &'a str) -> Option<&'a str> {
    patterns
        .iter()
        .find_map(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub(super) fn fields(raw: &str, _now: DateTime<FixedOffset>) -> Option<SlipFields> {
    let mut found = SlipFields::default();
    let mut date: Option<String> = None;
    let mut time: Option<String> = None;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if found.amount.is_none() {
            found.amount = first_capture(&AMOUNT, line).and_then(|m| positive(parse_amount(m)));
        }
        if date.is_none() {
            date = first_capture(&DATE, line).map(buddhist_to_gregorian);
        }
        if time.is_none() {
            time = first_capture(&TIME, line).map(str::to_string);
        }
        if found.account_name.is_none() {
            found.account_name = first_capture(&ACCOUNT, line).and_then(non_empty);
        }
        if found.transaction_id.is_none() {
            found.transaction_id = first_capture(&TRANSACTION, line).map(str::to_string);
        }
    }

    // A date that already carries a time of day keeps it.
    found.date_time = match date {
        Some(d) if d.contains(':') => Some(d),
        d => join_date_time(d, time),
    };

    (found != SlipFields::default()).then_some(found)
}
