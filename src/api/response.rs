//! JSON bodies for the slip verification endpoint.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::VerifyError;
use crate::extract::SlipData;
use crate::reconcile::{Outcome, VerificationResult};

pub const METHOD_QR_CODE: &str = "QR_CODE";

const MSG_VERIFIED: &str = "Slip verified successfully via QR code, top-up status updated to SUCCESS";
const ERR_MISMATCH: &str = "Amount mismatch";
const ERR_PARSE_FAILED: &str = "Unable to extract valid amount from QR code";
const ERR_NO_QR: &str = "No QR code found in slip image";
const HINT_MISMATCH: &str = "Ensure the QR code amount matches the expected top-up amount";
const HINT_PARSE_FAILED: &str = "Ensure the QR code contains a valid amount (e.g., EMVCo tag 54)";
const HINT_NO_QR: &str = "Please ensure the slip image contains a clear, readable QR code";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SlipResponse {
    #[serde(rename_all = "camelCase")]
    Verified {
        message: &'static str,
        slip_data: SlipData,
        method: &'static str,
        transaction_ref: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Mismatch {
        error: &'static str,
        expected: Decimal,
        found: Decimal,
        slip_data: SlipData,
        method: &'static str,
        suggestion: &'static str,
    },
    #[serde(rename_all = "camelCase")]
    ParseFailed {
        error: &'static str,
        slip_data: SlipData,
        qr_data: String,
        suggestion: &'static str,
    },
    NoQrFound {
        error: &'static str,
        suggestion: &'static str,
    },
    /// A request that failed before reconciliation.
    Failure {
        #[serde(skip)]
        status: u16,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl SlipResponse {
    pub fn from_result(result: &VerificationResult) -> Self {
        let slip_data = result.slip.clone().unwrap_or_default();
        match result.outcome {
            Outcome::Verified => SlipResponse::Verified {
                message: MSG_VERIFIED,
                slip_data,
                method: METHOD_QR_CODE,
                transaction_ref: result.transaction_ref.clone(),
            },
            Outcome::AmountMismatch => SlipResponse::Mismatch {
                error: ERR_MISMATCH,
                expected: result.expected,
                found: result.found(),
                slip_data,
                method: METHOD_QR_CODE,
                suggestion: HINT_MISMATCH,
            },
            Outcome::ParseFailed => SlipResponse::ParseFailed {
                error: ERR_PARSE_FAILED,
                slip_data,
                qr_data: result.payload_excerpt.clone().unwrap_or_default(),
                suggestion: HINT_PARSE_FAILED,
            },
            Outcome::NoQrFound => SlipResponse::NoQrFound {
                error: ERR_NO_QR,
                suggestion: HINT_NO_QR,
            },
        }
    }

    pub fn from_error(err: &VerifyError) -> Self {
        let (status, error, details) = match err {
            VerifyError::TopupNotFound(_) => (404, "Top-up request not found".to_string(), None),
            VerifyError::NotPending { .. } => (409, err.to_string(), None),
            VerifyError::InvalidSlipPath(_) => (400, "Invalid slip image path".to_string(), None),
            VerifyError::Io(e) => (400, "Slip image file not found".to_string(), Some(e.to_string())),
            VerifyError::ImageLoad(e) => (
                500,
                "Failed to read QR code from slip image".to_string(),
                Some(e.clone()),
            ),
            VerifyError::TimedOut(_) => (504, err.to_string(), None),
            VerifyError::InvalidAmount(_) | VerifyError::InvalidPromptPayTarget(_) => {
                (400, err.to_string(), None)
            }
            VerifyError::Cancelled | VerifyError::Config(_) | VerifyError::Store(_) => {
                (500, "Internal server error".to_string(), Some(err.to_string()))
            }
        };
        SlipResponse::Failure { status, error, details }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            SlipResponse::Verified { .. } => 200,
            SlipResponse::Failure { status, .. } => *status,
            _ => 400,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<&VerificationResult> for SlipResponse {
    fn from(result: &VerificationResult) -> Self {
        Self::from_result(result)
    }
}
