//! PromptPay payment payload builder.
//!
//! Produces the EMVCo string the storefront renders as the "pay me" QR code
//! when a top-up is created. The payer's banking app reads it and the bank
//! echoes the same fields back on the transfer slip.

use rust_decimal::Decimal;

use crate::error::{Result, VerifyError};

const GUID_PROMPTPAY: &str = "A000000677010111";
const POI_STATIC: &str = "11";
const POI_DYNAMIC: &str = "12";
const CURRENCY_THB: &str = "764";
const COUNTRY_TH: &str = "TH";

/// Kind of PromptPay proxy id, chosen from its digit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Mobile number (sub-tag 01).
    Phone,
    /// 13-digit national or tax id (sub-tag 02).
    NationalId,
    /// 15-digit e-wallet id (sub-tag 03).
    EWallet,
}

impl TargetKind {
    fn of(digits: &str) -> Self {
        match digits.len() {
            n if n >= 15 => TargetKind::EWallet,
            n if n >= 13 => TargetKind::NationalId,
            _ => TargetKind::Phone,
        }
    }

    fn sub_tag(self) -> &'static str {
        match self {
            TargetKind::Phone => "01",
            TargetKind::NationalId => "02",
            TargetKind::EWallet => "03",
        }
    }
}

/// Build a PromptPay payload for `target` (phone, national id or e-wallet
/// id; separators are ignored). With an amount the payload is dynamic
/// (single use) and carries tag 54; a zero amount builds a static payload.
///
/// # Errors
/// `InvalidPromptPayTarget` if `target` has no digits, `InvalidAmount` if the
/// amount is negative.
pub fn payload(target: &str, amount: Option<Decimal>) -> Result<String> {
    let digits: String = target.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(VerifyError::InvalidPromptPayTarget(target.to_string()));
    }
    let amount = match amount {
        Some(a) if a.is_sign_negative() => return Err(VerifyError::InvalidAmount(a.to_string())),
        Some(a) if a.is_zero() => None,
        other => other,
    };

    let kind = TargetKind::of(&digits);
    let merchant = field("00", GUID_PROMPTPAY) + &field(kind.sub_tag(), &format_target(&digits));

    let mut out = String::new();
    out += &field("00", "01");
    out += &field("01", if amount.is_some() { POI_DYNAMIC } else { POI_STATIC });
    out += &field("29", &merchant);
    out += &field("58", COUNTRY_TH);
    out += &field("53", CURRENCY_THB);
    if let Some(a) = amount {
        out += &field("54", &format_amount(a));
    }
    out += "6304";
    let crc = crc16_ccitt(out.as_bytes());
    out += &format!("{:04X}", crc);
    Ok(out)
}

/// Check the trailing `6304XXXX` checksum of a payload.
pub fn verify_crc(payload: &str) -> bool {
    let Some(body_len) = payload.len().checked_sub(4) else {
        return false;
    };
    if !payload.is_char_boundary(body_len) || !payload[..body_len].ends_with("6304") {
        return false;
    }
    let (body, crc) = payload.split_at(body_len);
    u16::from_str_radix(crc, 16).is_ok_and(|c| c == crc16_ccitt(body.as_bytes()))
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

fn field(tag: &str, value: &str) -> String {
    format!("{}{:02}{}", tag, value.chars().count(), value)
}

/// Phone numbers become `0066` + national number, 13 digits wide.
fn format_target(digits: &str) -> String {
    if digits.len() >= 13 {
        return digits.to_string();
    }
    let intl = match digits.strip_prefix('0') {
        Some(rest) => format!("66{}", rest),
        None => digits.to_string(),
    };
    format!("{:0>13}", intl)
}

fn format_amount(amount: Decimal) -> String {
    let mut a = amount.round_dp(2);
    a.rescale(2);
    a.to_string()
}
