//! Slip timestamps: the Asia/Bangkok zone and the Thai Buddhist calendar.
//!
//! Thai banks print slip dates in the Buddhist era (Gregorian + 543), e.g.
//! `15/03/2568`. Everything stored on a top-up is Gregorian.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use regex::{Captures, Regex};

/// Years between the Buddhist and Gregorian eras.
pub const BUDDHIST_ERA_OFFSET: i32 = 543;

static BUDDHIST_YEAR: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b25[0-9]{2}\b").ok());
static BUDDHIST_SLASH_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[0-9]{1,2}/[0-9]{1,2}/25[0-9]{2}").ok());

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y, %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Asia/Bangkok. Thailand has no daylight saving, so a fixed UTC+7 offset.
pub fn bangkok() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix())
}

pub fn now_bangkok() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&bangkok())
}

/// Thai locale rendering, `d/m/yyyy HH:MM:SS` with a Buddhist year.
pub fn thai_locale(at: DateTime<FixedOffset>) -> String {
    format!(
        "{}/{}/{} {}",
        at.day(),
        at.month(),
        at.year() + BUDDHIST_ERA_OFFSET,
        at.format("%H:%M:%S")
    )
}

/// Rewrite the first standalone `25xx` year token to its Gregorian year.
pub fn buddhist_to_gregorian(s: &str) -> String {
    let Some(re) = BUDDHIST_YEAR.as_ref() else {
        return s.to_string();
    };
    re.replacen(s, 1, |caps: &Captures| {
        match caps[0].parse::<i32>() {
            Ok(year) => (year - BUDDHIST_ERA_OFFSET).to_string(),
            Err(_) => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Convert a slip date only when it carries a Buddhist `d/m/25yy` date.
pub fn normalize_slip_date(s: &str) -> String {
    match BUDDHIST_SLASH_DATE.as_ref() {
        Some(re) if re.is_match(s) => buddhist_to_gregorian(s),
        _ => s.to_string(),
    }
}

/// Parse a normalized slip timestamp as Bangkok local time.
///
/// Accepts RFC 3339, ISO and day-first slash forms, with or without a time
/// of day. Returns `None` for anything else.
pub fn parse_slip_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    let tz = bangkok();
    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    tz.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn buddhist_slash_date() {
        assert_eq!(buddhist_to_gregorian("15/03/2568"), "15/03/2025");
        assert_eq!(normalize_slip_date("15/03/2568"), "15/03/2025");
        assert_eq!(normalize_slip_date("15/3/2568 14:05:09"), "15/3/2025 14:05:09");
    }

    #[test]
    fn only_first_year_is_rewritten() {
        assert_eq!(buddhist_to_gregorian("2568-01-02 ref 2599"), "2025-01-02 ref 2599");
    }

    #[test]
    fn gregorian_dates_untouched() {
        assert_eq!(normalize_slip_date("2025-01-01"), "2025-01-01");
        assert_eq!(normalize_slip_date("15/03/2025"), "15/03/2025");
        // Not a slash date, so the gate leaves it alone
        assert_eq!(normalize_slip_date("TH"), "TH");
        assert_eq!(buddhist_to_gregorian("125689"), "125689");
    }

    #[test]
    fn early_buddhist_years_subtract_the_era() {
        // 2500..=2542 map below 2000, not onto 20xx
        assert_eq!(normalize_slip_date("1/1/2530"), "1/1/1987");
        assert_eq!(buddhist_to_gregorian("31/12/2542"), "31/12/1999");
        assert_eq!(buddhist_to_gregorian("1/1/2543"), "1/1/2000");
    }

    #[test]
    fn thai_numeral_years_untouched() {
        assert_eq!(normalize_slip_date("15/03/25๖๘"), "15/03/25๖๘");
        assert_eq!(buddhist_to_gregorian("25๖๘"), "25๖๘");
    }

    #[test]
    fn thai_locale_uses_buddhist_year() {
        let at = bangkok().with_ymd_and_hms(2025, 3, 5, 8, 7, 6).unwrap();
        assert_eq!(thai_locale(at), "5/3/2568 08:07:06");
        assert_eq!(normalize_slip_date(&thai_locale(at)), "5/3/2025 08:07:06");
    }

    #[test]
    fn parses_common_forms_in_bangkok_time() {
        let iso = parse_slip_datetime("2025-01-01").unwrap();
        assert_eq!(iso.offset().local_minus_utc(), 7 * 3600);
        assert_eq!(iso.date_naive().to_string(), "2025-01-01");

        let slash = parse_slip_datetime("15/03/2025 14:30").unwrap();
        assert_eq!((slash.day(), slash.month(), slash.hour(), slash.minute()), (15, 3, 14, 30));

        let rfc = parse_slip_datetime("2025-01-01T10:00:00Z").unwrap();
        assert_eq!(rfc.hour(), 10);
    }

    #[test]
    fn unparseable_is_none() {
        assert!(parse_slip_datetime("").is_none());
        assert!(parse_slip_datetime("TH").is_none());
        assert!(parse_slip_datetime("32/13/2025").is_none());
    }

    #[test]
    fn patterns_compile() {
        assert!(BUDDHIST_YEAR.is_some());
        assert!(BUDDHIST_SLASH_DATE.is_some());
    }
}
