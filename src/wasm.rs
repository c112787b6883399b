/// Browser bindings. The functions are plain Rust; `--features wasm` exports
/// them through wasm-bindgen.
///
/// The storefront's upload page calls these from a Web Worker to give the
/// payer instant feedback before the slip is submitted.
use rust_decimal::Decimal;
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

use crate::emvco::promptpay;
use crate::extract::calendar::normalize_slip_date;
use crate::extract::extract;
use crate::qr_decode::{QrDecoder, RqrrDecoder, rgba_to_greyscale};

/// Extract slip fields from a decoded payload. Returns `SlipData` as JSON.
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn parse_slip_payload(payload: &str) -> String {
    let mut slip = extract(payload);
    slip.date_time = normalize_slip_date(&slip.date_time);
    serde_json::to_string(&slip).unwrap_or_else(|_| "{}".to_string())
}

/// Decode a QR code from an RGBA camera frame.
/// Returns the payload, or an empty string when nothing decodes.
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn decode_slip_frame(rgba: &[u8], width: usize, height: usize) -> String {
    if width == 0 || height == 0 || rgba.len() < width * height * 4 {
        return String::new();
    }
    let grey = rgba_to_greyscale(rgba, width, height);
    RqrrDecoder.decode(&grey, width, height).unwrap_or_default()
}

/// PromptPay payload for `target`. A non-positive `amount` gives a static
/// payload. Returns an empty string for an unusable target.
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn promptpay_payload(target: &str, amount: f64) -> String {
    let amount = Decimal::try_from(amount).ok().filter(|a| *a > Decimal::ZERO);
    promptpay::payload(target, amount).unwrap_or_default()
}
