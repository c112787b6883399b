use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use tracing::debug;

use super::calendar::{normalize_slip_date, thai_locale};
use super::{SlipFields, non_empty, parse_amount, positive};
use crate::emvco::tlv::{self, TagMap, is_merchant_account_tag};
use crate::qr_decode::is_emvco_shaped;

const REFERENCE_SUB_TAGS: &[&str] = &["01", "05", "07"];
const TRANSACTION_SUB_TAGS: &[&str] = &["08", "09"];

pub(super) fn fields(raw: &str, now: DateTime<FixedOffset>) -> Option<SlipFields> {
    if !is_emvco_shaped(raw) {
        return None;
    }
    let map = tlv::parse(raw);
    let mut found = SlipFields::default();

    if let Some(raw_amount) = map.get("54") {
        found.amount = positive(tag_amount(raw_amount));
        debug!(raw = raw_amount, amount = ?found.amount, "amount from tag 54");
    }

    // Tag 62 is not a merchant template, so its sub-fields need a second parse.
    let additional = map.get("62").map(tlv::parse_flat).unwrap_or_default();
    found.reference = first_in(&additional, REFERENCE_SUB_TAGS);
    found.transaction_id = first_in(&additional, TRANSACTION_SUB_TAGS);

    found.account_name = account_name(&map);

    let date = additional
        .get("07")
        .and_then(non_empty)
        .or_else(|| map.get("58").and_then(non_empty));
    found.date_time = Some(match date {
        Some(d) => normalize_slip_date(&d),
        None => thai_locale(now),
    });

    Some(found)
}

/// All digits means minor units ("10000" is 100.00), else a decimal literal.
fn tag_amount(raw: &str) -> Option<Decimal> {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        Decimal::from_str(raw).ok().map(|minor| minor / Decimal::ONE_HUNDRED)
    } else {
        parse_amount(raw)
    }
}

/// First non-empty value among `sub_tags`, in payload order.
fn first_in(map: &TagMap, sub_tags: &[&str]) -> Option<String> {
    map.iter()
        .filter(|(tag, _)| sub_tags.contains(tag))
        .find_map(|(_, entry)| non_empty(entry.raw()))
}

/// First merchant template child that looks like a name: longer than two
/// characters and not purely numeric. This can be a scheme GUID.
fn account_name(map: &TagMap) -> Option<String> {
    map.iter()
        .filter(|(tag, _)| is_merchant_account_tag(tag))
        .filter_map(|(_, entry)| entry.children())
        .flat_map(|children| children.iter())
        .map(|(_, child)| child.raw())
        .find(|v| v.chars().count() > 2 && !v.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}
