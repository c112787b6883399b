//! Crate-wide error type.
//!
//! Only conditions that abort a verification attempt live here. A slip that
//! decodes to nothing, parses to nothing, or carries the wrong amount is a
//! normal [`crate::reconcile::Outcome`], not an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot load slip image: {0}")]
    ImageLoad(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("top-up {0} not found")]
    TopupNotFound(u64),

    #[error("top-up {id} is {status}, expected PENDING")]
    NotPending { id: u64, status: &'static str },

    #[error("invalid top-up amount: {0}")]
    InvalidAmount(String),

    #[error("invalid slip image path: {0}")]
    InvalidSlipPath(String),

    #[error("invalid PromptPay target: {0}")]
    InvalidPromptPayTarget(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("verification exceeded its {0} ms time budget")]
    TimedOut(u64),

    #[error("verification cancelled")]
    Cancelled,

    #[error("top-up store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, VerifyError>;

impl From<image::ImageError> for VerifyError {
    fn from(e: image::ImageError) -> Self {
        VerifyError::ImageLoad(e.to_string())
    }
}
