//! PromptPay transfer slip verification.
//!
//! Reads the QR code printed on a bank transfer slip, extracts the amount
//! and transaction details, and reconciles them against a pending wallet
//! top-up. Stages, in order:
//!
//! - [`qr_decode`]: image enhancement, resize variants, rqrr decoding
//! - [`emvco`]: EMVCo TLV parsing and PromptPay payload generation
//! - [`extract`]: EMVCo / JSON / text / URL strategies into [`SlipData`]
//! - [`reconcile`]: amount comparison within a tolerance
//! - [`pipeline`]: the above wired to a [`TopupStore`], with a time budget
//! - [`api`]: response bodies and slip path handling for an HTTP layer

pub mod api;
pub mod config;
pub mod emvco;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod qr_decode;
pub mod reconcile;
pub mod topup;

pub mod wasm;

use rust_decimal::Decimal;

pub use api::SlipResponse;
pub use config::VerifierConfig;
pub use error::{Result, VerifyError};
pub use extract::{SlipData, extract};
pub use pipeline::{Checkpoint, SlipVerifier};
pub use qr_decode::{QrDecoder, RqrrDecoder};
pub use reconcile::{Outcome, VerificationResult, reconcile};
pub use topup::store::{MemoryTopupStore, TopupStore};
pub use topup::{TopupRequest, TopupStatus};

/// Extract and reconcile a decoded payload without any store.
///
/// The slip date is normalized to the Gregorian calendar.
pub fn verify_slip_payload(payload: &str, expected: Decimal) -> VerificationResult {
    let mut slip = extract(payload);
    slip.date_time = extract::calendar::normalize_slip_date(&slip.date_time);
    let result = reconcile::reconcile_default(&slip, expected);
    match result.outcome {
        Outcome::ParseFailed => result.with_payload_excerpt(qr_decode::excerpt(payload, 200)),
        _ => result,
    }
}
