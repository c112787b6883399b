//! Amount reconciliation between an extracted slip and a top-up.
//!
//! Pure: no I/O, no clock. The pipeline decides what to persist.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::extract::SlipData;

/// Default absolute tolerance, one satang.
pub const DEFAULT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Verified,
    AmountMismatch,
    NoQrFound,
    ParseFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub outcome: Outcome,
    pub slip: Option<SlipData>,
    pub expected: Decimal,
    pub transaction_ref: Option<String>,
    /// Leading part of the raw payload, kept for `ParseFailed` diagnostics.
    pub payload_excerpt: Option<String>,
}

impl VerificationResult {
    pub fn no_qr_found(expected: Decimal) -> Self {
        Self {
            outcome: Outcome::NoQrFound,
            slip: None,
            expected,
            transaction_ref: None,
            payload_excerpt: None,
        }
    }

    pub fn with_payload_excerpt(mut self, excerpt: String) -> Self {
        self.payload_excerpt = Some(excerpt);
        self
    }

    pub fn is_verified(&self) -> bool {
        self.outcome == Outcome::Verified
    }

    /// Amount read from the slip, zero when none.
    pub fn found(&self) -> Decimal {
        self.slip.as_ref().map(|s| s.amount).unwrap_or_default()
    }
}

/// Compare the slip amount with `expected`.
///
/// A non-positive slip amount is `ParseFailed`. Otherwise the amounts match
/// when they differ by at most `tolerance`, and the transaction reference is
/// the slip's transaction id, falling back to its reference.
pub fn reconcile(slip: &SlipData, expected: Decimal, tolerance: Decimal) -> VerificationResult {
    let mut result = VerificationResult {
        outcome: Outcome::ParseFailed,
        slip: Some(slip.clone()),
        expected,
        transaction_ref: None,
        payload_excerpt: None,
    };
    if slip.amount <= Decimal::ZERO {
        return result;
    }
    if (slip.amount - expected).abs() <= tolerance {
        result.outcome = Outcome::Verified;
        result.transaction_ref = slip
            .transaction_id
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| slip.reference.clone().filter(|r| !r.is_empty()));
    } else {
        result.outcome = Outcome::AmountMismatch;
    }
    result
}

pub fn reconcile_default(slip: &SlipData, expected: Decimal) -> VerificationResult {
    reconcile(slip, expected, DEFAULT_TOLERANCE)
}
