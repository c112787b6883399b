//! EMVCo Merchant-Presented QR tag-length-value decoding.
//!
//! A payload is a run of fields: 2-digit tag, 2-digit decimal length, then
//! `length` characters of value. Tags 26..=51 (merchant account information)
//! hold a nested run of fields of the same shape, which is expanded one level
//! deep into [`Entry::Template`].
//!
//! Malformed input never errors. Parsing stops at the first field that does
//! not fit and returns everything read up to that point.

use tracing::{debug, warn};

use crate::qr_decode::is_emvco_shaped;

/// Value of one top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Scalar(String),
    /// A merchant account template: the raw value and its decoded sub-fields.
    Template { raw: String, children: TagMap },
}

impl Entry {
    /// The raw value as it appeared in the payload.
    pub fn raw(&self) -> &str {
        match self {
            Entry::Scalar(v) => v,
            Entry::Template { raw, .. } => raw,
        }
    }

    pub fn children(&self) -> Option<&TagMap> {
        match self {
            Entry::Template { children, .. } => Some(children),
            Entry::Scalar(_) => None,
        }
    }
}

/// Decoded fields in payload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<(String, Entry)>,
}

impl TagMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, tag: &str) -> Option<&Entry> {
        self.entries.iter().find(|(t, _)| t == tag).map(|(_, e)| e)
    }

    /// Raw value of a top-level tag.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entry(tag).map(Entry::raw)
    }

    /// Look up `"29"` or a compound `"29.01"` key.
    pub fn get_path(&self, path: &str) -> Option<&str> {
        match path.split_once('.') {
            None => self.get(path),
            Some((tag, sub)) => self.entry(tag)?.children()?.get(sub),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(t, e)| (t.as_str(), e))
    }

    /// Flat `(key, value)` view with compound keys for template children,
    /// each child listed right after its parent.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (tag, entry) in &self.entries {
            out.push((tag.clone(), entry.raw().to_string()));
            if let Some(children) = entry.children() {
                for (sub, child) in children.iter() {
                    out.push((format!("{}.{}", tag, sub), child.raw().to_string()));
                }
            }
        }
        out
    }

    /// A repeated tag replaces the earlier value but keeps its position.
    fn insert(&mut self, tag: String, entry: Entry) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((tag, entry)),
        }
    }
}

/// Tags 26..=51 carry merchant account information templates.
pub fn is_merchant_account_tag(tag: &str) -> bool {
    matches!(tag.parse::<u8>(), Ok(26..=51))
}

/// Parse a payload, expanding merchant account templates (tags 26..=51).
pub fn parse(payload: &str) -> TagMap {
    parse_with(payload, is_merchant_account_tag)
}

/// Parse without expanding any template. Used for tag 62 sub-fields.
pub fn parse_flat(payload: &str) -> TagMap {
    parse_with(payload, |_| false)
}

/// Parse a payload, expanding tags for which `is_template` holds.
///
/// Expansion goes one level deep: children are parsed with [`parse_flat`].
pub fn parse_with<F>(payload: &str, is_template: F) -> TagMap
where
    F: Fn(&str) -> bool,
{
    let mut map = TagMap::default();
    if !is_emvco_shaped(payload) {
        debug!("payload is not EMVCo-shaped, skipping TLV parse");
        return map;
    }

    // Lengths count characters, so merchant names in Thai stay aligned.
    let chars: Vec<char> = payload.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if i + 4 > chars.len() {
            warn!(index = i, "incomplete EMVCo field at end of payload");
            break;
        }
        let tag: String = chars[i..i + 2].iter().collect();
        let len_str: String = chars[i + 2..i + 4].iter().collect();
        i += 4;

        let Some(length) = parse_length(&len_str) else {
            warn!(%tag, length = %len_str, "invalid EMVCo length");
            break;
        };
        if i + length > chars.len() {
            warn!(%tag, length, remaining = chars.len() - i, "EMVCo length overruns payload");
            break;
        }

        let value: String = chars[i..i + length].iter().collect();
        i += length;

        let entry = if is_template(&tag) && value.chars().count() >= 4 {
            let children = parse_flat(&value);
            if children.is_empty() {
                Entry::Scalar(value)
            } else {
                Entry::Template { raw: value, children }
            }
        } else {
            Entry::Scalar(value)
        };
        map.insert(tag, entry);
    }

    debug!(fields = map.len(), "parsed EMVCo payload");
    map
}

fn parse_length(s: &str) -> Option<usize> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PROMPTPAY: &str = "00020101021229370016A000000677010111011300668123456785802TH53037645406100.0062240520REF1234567890ABCDEFG6304ABCD";

    #[test]
    fn parses_top_level_fields_in_order() {
        let map = parse(PROMPTPAY);
        let tags: Vec<&str> = map.iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["00", "01", "29", "58", "53", "54", "62", "63"]);
        assert_eq!(map.get("00"), Some("01"));
        assert_eq!(map.get("54"), Some("100.00"));
        assert_eq!(map.get("58"), Some("TH"));
    }

    #[test]
    fn expands_merchant_template() {
        let map = parse(PROMPTPAY);
        let children = map.entry("29").and_then(Entry::children).unwrap();
        assert_eq!(children.get("00"), Some("A000000677010111"));
        assert_eq!(map.get_path("29.01"), Some("0066812345678"));
        assert_eq!(map.get("29").map(str::len), Some(37));
    }

    #[test]
    fn tag_62_is_not_expanded() {
        let map = parse(PROMPTPAY);
        assert!(matches!(map.entry("62"), Some(Entry::Scalar(_))));
        assert_eq!(map.get_path("62.05"), None);
        // Second call on the raw value recovers the sub-fields
        let sub = parse_flat(map.get("62").unwrap());
        assert_eq!(sub.get("05"), Some("REF1234567890ABCDEFG"));
    }

    #[test]
    fn flatten_uses_compound_keys() {
        let flat = parse("000201290800040001");
        assert_eq!(
            flat.flatten(),
            vec![
                ("00".to_string(), "01".to_string()),
                ("29".to_string(), "00040001".to_string()),
                ("29.00".to_string(), "0001".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_non_emvco_payload() {
        assert!(parse("https://promptpay.io/0812345678").is_empty());
        assert!(parse("12").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn overrunning_length_truncates() {
        // 54 declares 10 chars but only 6 remain
        let map = parse("0002015802TH5410100.00");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("58"), Some("TH"));
        assert_eq!(map.get("54"), None);
    }

    #[test]
    fn non_numeric_length_truncates() {
        let map = parse("0002015xAB");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn short_tail_truncates() {
        let map = parse("000201630");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("00"), Some("01"));
    }

    #[test]
    fn short_template_stays_scalar() {
        let map = parse("000201260300A");
        assert!(matches!(map.entry("26"), Some(Entry::Scalar(v)) if v == "00A"));
    }

    #[test]
    fn template_with_garbage_stays_scalar() {
        let map = parse("0002013006ABCDEF");
        assert!(matches!(map.entry("30"), Some(Entry::Scalar(_))));
    }

    #[test]
    fn counts_thai_characters_not_bytes() {
        let map = parse("0002015905สมชาย6002BK");
        assert_eq!(map.get("59"), Some("สมชาย"));
        assert_eq!(map.get("60"), Some("BK"));
    }

    #[test]
    fn repeated_tag_keeps_first_position() {
        let map = parse("0002015802TH0002AB");
        let tags: Vec<&str> = map.iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["00", "58"]);
        assert_eq!(map.get("00"), Some("AB"));
    }

    #[test]
    fn custom_template_predicate() {
        let map = parse_with("00020162080504ABCD", |t| t == "62");
        assert_eq!(map.get_path("62.05"), Some("ABCD"));
    }

    #[test]
    fn merchant_account_range() {
        assert!(is_merchant_account_tag("26"));
        assert!(is_merchant_account_tag("51"));
        assert!(!is_merchant_account_tag("25"));
        assert!(!is_merchant_account_tag("52"));
        assert!(!is_merchant_account_tag("62"));
        assert!(!is_merchant_account_tag("2A"));
    }

    proptest! {
        #[test]
        fn never_panics_on_digit_prefixed_input(tail in "\\PC{0,80}") {
            let payload = format!("0002{}", tail);
            let map = parse(&payload);
            prop_assert!(map.len() <= payload.chars().count() / 4);
        }

        #[test]
        fn truncation_keeps_earlier_fields(value in "[A-Z0-9]{1,20}", extra in 1usize..50) {
            let head = format!("000201{:02}{:02}{}", 59, value.len(), value);
            let payload = format!("{}54{:02}1", head, value.len() + extra);
            let map = parse(&payload);
            prop_assert_eq!(map.get("00"), Some("01"));
            prop_assert_eq!(map.get("59"), Some(value.as_str()));
            prop_assert_eq!(map.get("54"), None);
        }
    }
}
