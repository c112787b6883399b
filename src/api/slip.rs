//! Slip sources: stored slip references and inline `data:` URIs.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::error::{Result, VerifyError};
use crate::pipeline::{Checkpoint, SlipVerifier};
use crate::qr_decode::QrDecoder;
use crate::reconcile::VerificationResult;
use crate::topup::store::TopupStore;

/// Map a stored slip reference (e.g. `/slips/1699999-slip.png`) to a file
/// inside `slips_dir`. Only the final path component is kept.
pub fn resolve_slip_path(slips_dir: &Path, stored_ref: &str) -> Result<PathBuf> {
    let name = Path::new(stored_ref.trim())
        .file_name()
        .ok_or_else(|| VerifyError::InvalidSlipPath(stored_ref.to_string()))?;
    let path = slips_dir.join(name);
    if path.parent() != Some(slips_dir) {
        warn!(stored_ref, "slip path escapes slips directory");
        return Err(VerifyError::InvalidSlipPath(stored_ref.to_string()));
    }
    Ok(path)
}

/// Decode `data:<mime>;base64,<payload>` into raw bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| VerifyError::ImageLoad("not a data URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| VerifyError::ImageLoad("data URI has no payload".into()))?;
    if !meta.ends_with(";base64") {
        return Err(VerifyError::ImageLoad(format!("data URI is not base64 ({meta})")));
    }
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| VerifyError::ImageLoad(format!("base64 decode error: {}", e)))
}

/// Verify the slip already attached to a top-up.
pub fn verify_stored_slip<D, S>(
    verifier: &SlipVerifier<D, S>,
    topup_id: u64,
    slips_dir: &Path,
    checkpoint: &Checkpoint,
) -> Result<VerificationResult>
where
    D: QrDecoder,
    S: TopupStore,
{
    let topup = verifier
        .store()
        .find(topup_id)?
        .ok_or(VerifyError::TopupNotFound(topup_id))?;
    let stored = topup
        .slip_image
        .ok_or_else(|| VerifyError::InvalidSlipPath(format!("top-up {topup_id} has no slip image")))?;
    let path = resolve_slip_path(slips_dir, &stored)?;
    verifier.verify_file(topup_id, &path, checkpoint)
}
