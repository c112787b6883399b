//! Verifier configuration.
//!
//! Defaults reproduce the storefront's behavior. A TOML file can override
//! them, and a handful of environment variables override the file:
//!
//! | variable              | field            |
//! |-----------------------|------------------|
//! | `SLIP_TOLERANCE`      | `tolerance`      |
//! | `SLIP_TIME_BUDGET_MS` | `time_budget_ms` |
//! | `SLIP_EMVCO_ONLY`     | `emvco_only`     |
//! | `SELLER_PROMPTPAY_ID` | `promptpay_id`   |

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Result, VerifyError};
use crate::qr_decode::ResizeVariant;

/// Payment-method marker stamped on top-ups settled by slip reading.
pub const QR_SLIP_METHOD: &str = "QR_SLIP_VERIFICATION";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Absolute amount tolerance for reconciliation.
    pub tolerance: Decimal,
    pub payment_method: String,
    /// Wall-clock cap per verification. 0 disables the cap.
    pub time_budget_ms: u64,
    /// Reject decoded payloads that are not EMVCo-shaped and keep scanning.
    pub emvco_only: bool,
    pub resize_variants: Vec<ResizeVariant>,
    /// Seller PromptPay id used when generating payment payloads.
    pub promptpay_id: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 2),
            payment_method: QR_SLIP_METHOD.to_string(),
            time_budget_ms: 5_000,
            emvco_only: false,
            resize_variants: ResizeVariant::defaults(),
            promptpay_id: None,
        }
    }
}

impl VerifierConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: VerifierConfig = toml::from_str(s).map_err(|e| VerifyError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        base.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SLIP_TOLERANCE") {
            self.tolerance = parse_var("SLIP_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("SLIP_TIME_BUDGET_MS") {
            self.time_budget_ms = parse_var("SLIP_TIME_BUDGET_MS", &v)?;
        }
        if let Some(v) = lookup("SLIP_EMVCO_ONLY") {
            self.emvco_only = parse_var("SLIP_EMVCO_ONLY", &v)?;
        }
        if let Some(v) = lookup("SELLER_PROMPTPAY_ID") {
            if !v.trim().is_empty() {
                self.promptpay_id = Some(v.trim().to_string());
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        (self.time_budget_ms > 0).then(|| Duration::from_millis(self.time_budget_ms))
    }

    fn validate(&self) -> Result<()> {
        if self.tolerance.is_sign_negative() {
            return Err(VerifyError::Config(format!(
                "tolerance must not be negative, got {}",
                self.tolerance
            )));
        }
        if self.resize_variants.is_empty() {
            return Err(VerifyError::Config("resize_variants must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VerifyError::Config(format!("{key}={value:?}: {e}")))
}
