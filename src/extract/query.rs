use chrono::{DateTime, FixedOffset};
use tracing::debug;
use url::Url;

use super::{SlipFields, join_date_time, non_empty, parse_amount, positive};

/// Query parameters of a payment URL (`?amount=..&date=..&ref=..`).
pub(super) fn fields(raw: &str, _now: DateTime<FixedOffset>) -> Option<SlipFields> {
    let url = match Url::parse(raw.trim()) {
        Ok(u) => u,
        Err(e) => {
            debug!(error = %e, "payload is not a valid URL");
            return None;
        }
    };

    // First occurrence wins for repeated keys.
    let param = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| non_empty(&v))
    };

    Some(SlipFields {
        amount: positive(param("amount").as_deref().and_then(parse_amount)),
        date_time: join_date_time(param("date"), param("time")),
        account_name: param("account"),
        transaction_id: None,
        reference: param("ref"),
    })
}
