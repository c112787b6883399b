//! Top-up requests: a user's pending wallet credit awaiting slip proof.

pub mod store;

use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{Result, VerifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopupStatus {
    Pending,
    Success,
    Failed,
}

impl TopupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TopupStatus::Pending => "PENDING",
            TopupStatus::Success => "SUCCESS",
            TopupStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopupRequest {
    /// Assigned by the store on insert.
    pub id: u64,
    pub user_id: u64,
    pub amount: Decimal,
    pub status: TopupStatus,
    pub payment_method: String,
    /// Stored slip reference, usually `/slips/<file name>`.
    pub slip_image: Option<String>,
    pub transaction_ref: Option<String>,
    pub confirmed_at: Option<DateTime<FixedOffset>>,
}

impl TopupRequest {
    /// A new pending request with a generated `TXN-...` reference.
    pub fn pending(user_id: u64, amount: Decimal, payment_method: &str) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(VerifyError::InvalidAmount(amount.to_string()));
        }
        Ok(Self {
            id: 0,
            user_id,
            amount,
            status: TopupStatus::Pending,
            payment_method: payment_method.to_string(),
            slip_image: None,
            transaction_ref: Some(transaction_ref()),
            confirmed_at: None,
        })
    }

    pub fn with_slip_image(mut self, slip_image: impl Into<String>) -> Self {
        self.slip_image = Some(slip_image.into());
        self
    }

    /// Mark as paid. A settlement without a transaction ref clears it.
    pub fn apply(&mut self, settlement: &Settlement) {
        self.status = TopupStatus::Success;
        self.confirmed_at = Some(settlement.confirmed_at);
        self.transaction_ref = settlement.transaction_ref.clone();
        self.payment_method = settlement.payment_method.clone();
    }
}

/// What a verified slip writes back to its top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub confirmed_at: DateTime<FixedOffset>,
    pub transaction_ref: Option<String>,
    pub payment_method: String,
}

/// `TXN-{unix millis}-{7 lowercase base36 chars}`.
fn transaction_ref() -> String {
    let suffix = base36_suffix(&mut rand::thread_rng(), 7);
    format!("TXN-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// `len` symbols drawn uniformly from `0-9a-z`.
fn base36_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .filter_map(|_| char::from_digit(rng.gen_range(0..36), 36))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::calendar::now_bangkok;

    #[test]
    fn pending_generates_reference() {
        let t = TopupRequest::pending(7, Decimal::new(100, 0), "PROMPTPAY").unwrap();
        assert_eq!(t.status, TopupStatus::Pending);
        let r = t.transaction_ref.unwrap();
        let parts: Vec<&str> = r.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TXN");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn suffix_draws_every_base36_symbol() {
        use rand::SeedableRng;
        use rand::rngs::StdRng;
        use std::collections::BTreeSet;

        let mut rng = StdRng::seed_from_u64(7);
        let drawn: BTreeSet<char> = (0..500)
            .flat_map(|_| base36_suffix(&mut rng, 7).chars().collect::<Vec<_>>())
            .collect();
        assert_eq!(drawn.len(), 36);
        assert!(drawn.iter().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn pending_rejects_non_positive_amount() {
        assert!(matches!(
            TopupRequest::pending(1, Decimal::ZERO, "PROMPTPAY"),
            Err(VerifyError::InvalidAmount(_))
        ));
    }

    #[test]
    fn apply_settlement() {
        let mut t = TopupRequest::pending(1, Decimal::ONE, "PROMPTPAY").unwrap();
        let at = now_bangkok();
        t.apply(&Settlement {
            confirmed_at: at,
            transaction_ref: None,
            payment_method: "QR_SLIP_VERIFICATION".into(),
        });
        assert_eq!(t.status, TopupStatus::Success);
        assert_eq!(t.confirmed_at, Some(at));
        assert!(t.transaction_ref.is_none());
        assert_eq!(t.payment_method, "QR_SLIP_VERIFICATION");
    }

    #[test]
    fn status_strings() {
        assert_eq!(TopupStatus::Success.as_str(), "SUCCESS");
        assert_eq!(serde_json::to_string(&TopupStatus::Pending).unwrap(), "\"PENDING\"");
    }
}
