//! Slip verification pipeline.
//!
//! Wires the stages together for one top-up:
//! store lookup → image prep → QR scan → extraction → reconciliation →
//! settlement. The decoder and the store are injected, so the same verifier
//! runs against rqrr + a database in production and against stubs in tests.
//!
//! Nothing is written to the store until reconciliation has finished and
//! returned `Verified`.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::api::slip::decode_data_uri;
use crate::config::VerifierConfig;
use crate::error::{Result, VerifyError};
use crate::extract::calendar::{normalize_slip_date, now_bangkok, parse_slip_datetime};
use crate::extract::extract_at;
use crate::qr_decode::{QrDecoder, excerpt, read_qr};
use crate::reconcile::{Outcome, VerificationResult, reconcile};
use crate::topup::store::TopupStore;
use crate::topup::{Settlement, TopupRequest, TopupStatus};

/// Raw payload characters kept in a `ParseFailed` result for support.
const PAYLOAD_EXCERPT_CHARS: usize = 200;

// ── Checkpoint ─────────────────────────────────────────────────────

/// Time budget and cancellation flag, checked between resize variants.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    deadline: Option<(Instant, Duration)>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Checkpoint {
    /// No deadline, not cancellable.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_budget(budget: Option<Duration>) -> Self {
        Self {
            deadline: budget.map(|b| (Instant::now() + b, b)),
            cancel: None,
        }
    }

    /// Abort at the next check once `flag` is set.
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(VerifyError::Cancelled);
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(VerifyError::TimedOut(budget.as_millis() as u64));
            }
        }
        Ok(())
    }
}

// ── Verifier ───────────────────────────────────────────────────────

pub struct SlipVerifier<D, S> {
    decoder: D,
    store: S,
    config: VerifierConfig,
}

impl<D: QrDecoder, S: TopupStore> SlipVerifier<D, S> {
    pub fn new(decoder: D, store: S, config: VerifierConfig) -> Self {
        Self { decoder, store, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A checkpoint carrying the configured time budget.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::with_budget(self.config.time_budget())
    }

    pub fn verify_file(&self, topup_id: u64, path: &Path, checkpoint: &Checkpoint) -> Result<VerificationResult> {
        let topup = self.pending_topup(topup_id)?;
        let bytes = std::fs::read(path)?;
        self.verify_image(&topup, &bytes, checkpoint)
    }

    /// `source` is a `data:image/...;base64,` URI or a file path.
    pub fn verify_source(&self, topup_id: u64, source: &str, checkpoint: &Checkpoint) -> Result<VerificationResult> {
        let topup = self.pending_topup(topup_id)?;
        let bytes = if source.starts_with("data:") {
            decode_data_uri(source)?
        } else {
            std::fs::read(source)?
        };
        self.verify_image(&topup, &bytes, checkpoint)
    }

    pub fn verify_bytes(&self, topup_id: u64, bytes: &[u8], checkpoint: &Checkpoint) -> Result<VerificationResult> {
        let topup = self.pending_topup(topup_id)?;
        self.verify_image(&topup, bytes, checkpoint)
    }

    /// Verify an already-decoded QR payload, skipping the image stages.
    pub fn verify_payload(&self, topup_id: u64, payload: &str) -> Result<VerificationResult> {
        let topup = self.pending_topup(topup_id)?;
        self.finish(&topup, payload, now_bangkok(), &Checkpoint::none())
    }

    fn verify_image(&self, topup: &TopupRequest, bytes: &[u8], checkpoint: &Checkpoint) -> Result<VerificationResult> {
        let hit = read_qr(
            bytes,
            &self.config.resize_variants,
            &self.decoder,
            self.config.emvco_only,
            checkpoint,
        )?;
        match hit {
            Some(hit) => self.finish(topup, &hit.payload, now_bangkok(), checkpoint),
            None => {
                warn!(topup_id = topup.id, "no QR code found in slip image");
                Ok(VerificationResult::no_qr_found(topup.amount))
            }
        }
    }

    fn finish(
        &self,
        topup: &TopupRequest,
        payload: &str,
        now: DateTime<FixedOffset>,
        checkpoint: &Checkpoint,
    ) -> Result<VerificationResult> {
        let mut slip = extract_at(payload, now);
        slip.date_time = normalize_slip_date(&slip.date_time);

        let result = reconcile(&slip, topup.amount, self.config.tolerance);
        match result.outcome {
            Outcome::Verified => {
                checkpoint.check()?;
                let settlement = settlement_for(&result, &slip.date_time, now, &self.config.payment_method);
                self.store.settle(topup.id, &settlement)?;
                info!(
                    topup_id = topup.id,
                    amount = %slip.amount,
                    transaction_ref = ?settlement.transaction_ref,
                    "slip verified, top-up settled"
                );
                Ok(result)
            }
            Outcome::AmountMismatch => {
                warn!(topup_id = topup.id, expected = %topup.amount, found = %slip.amount, "amount mismatch");
                Ok(result)
            }
            Outcome::ParseFailed => {
                warn!(topup_id = topup.id, "unable to extract a valid amount from QR data");
                Ok(result.with_payload_excerpt(excerpt(payload, PAYLOAD_EXCERPT_CHARS)))
            }
            Outcome::NoQrFound => Ok(result),
        }
    }

    fn pending_topup(&self, topup_id: u64) -> Result<TopupRequest> {
        let topup = self
            .store
            .find(topup_id)?
            .ok_or(VerifyError::TopupNotFound(topup_id))?;
        if topup.status != TopupStatus::Pending {
            return Err(VerifyError::NotPending {
                id: topup_id,
                status: topup.status.as_str(),
            });
        }
        Ok(topup)
    }
}

/// What a verified slip writes back to its top-up.
///
/// `confirmed_at` is the slip's own timestamp when it parses, else `now`.
pub fn settlement_for(
    result: &VerificationResult,
    date_time: &str,
    now: DateTime<FixedOffset>,
    payment_method: &str,
) -> Settlement {
    if result.transaction_ref.is_none() {
        warn!("no transaction id or reference found in QR data");
    }
    Settlement {
        confirmed_at: parse_slip_datetime(date_time).unwrap_or(now),
        transaction_ref: result.transaction_ref.clone(),
        payment_method: payment_method.to_string(),
    }
}
