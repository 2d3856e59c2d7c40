//! Shared types for the ZATCA invoice signing pipeline: the error taxonomy,
//! the `SignedResult` output tuple, and a `Clock` abstraction that lets the
//! orchestrator's `SigningTime` be pinned for deterministic tests.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the signing pipeline. Every failure mode is tagged and
/// returned; the pipeline never panics or retries on a caller's behalf.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The invoice XML was not well-formed, or a required element/attribute was absent.
    #[error("invoice parse error: {0}")]
    InvoiceParse(String),

    /// The input bytes were not valid UTF-8, or a base64 payload failed to decode.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The ECDSA primitive refused the key material (wrong curve, corrupt key, etc).
    #[error("crypto signing error: {0}")]
    CryptoSign(String),

    /// The certificate is present but a required projection could not be extracted.
    #[error("certificate data missing: {0}")]
    CertificateDataMissing(String),

    /// The XAdES signature builder was invoked before all required inputs were set.
    #[error("signature builder missing field: {0}")]
    BuilderState(String),

    /// A required string argument was empty or absent.
    #[error("null argument: {0}")]
    NullArgument(String),
}

/// Convenience alias used throughout the pipeline crates.
pub type SignResult<T> = Result<T, SignError>;

/// The tuple produced by a single `sign` call. The core holds no state across
/// calls; callers own these bytes once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedResult {
    /// The original invoice XML with the UBL extension, QR reference, and
    /// (if absent) a minimal `cac:Signature` stub inserted at their anchor points.
    pub signed_xml: String,
    /// base64(SHA-256(stripped+canonicalized invoice)).
    pub invoice_hash_b64: String,
    /// base64 of the concatenated TLV tag stream (8 tags for standard, 9 for simplified).
    pub qr_b64: String,
    /// base64(ECDSA-P256-SHA256(C14N11(ds:SignedInfo))).
    pub signature_b64: String,
    /// `cbc:UUID` text from the invoice, or empty string if absent.
    pub invoice_uuid: String,
}

/// Source of the wall-clock time stamped into `xades:SigningTime`. Production
/// code uses [`SystemClock`]; tests pin a [`FixedClock`] so that repeated
/// `sign()` calls on identical input are byte-identical (see P2/S3 in the
/// signing pipeline's test plan).
pub trait Clock: Send + Sync {
    /// Current time, used once per `sign()` call.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time via `chrono::Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for deterministic signing in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared handle to a `Clock`, cheaply cloneable into orchestrator state.
pub type SharedClock = Arc<dyn Clock>;

/// Format a `DateTime<Utc>` as the `xades:SigningTime` / tag-3 style string:
/// `YYYY-MM-DDTHH:MM:SSZ` (no fractional seconds).
pub fn format_signing_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_is_stable() {
        let ts = Utc.with_ymd_and_hms(2024, 9, 7, 17, 41, 8).unwrap();
        let clock = FixedClock(ts);
        assert_eq!(clock.now_utc(), ts);
        assert_eq!(clock.now_utc(), ts);
    }

    #[test]
    fn signing_time_format() {
        let ts = Utc.with_ymd_and_hms(2024, 9, 7, 17, 41, 8).unwrap();
        assert_eq!(format_signing_time(&ts), "2024-09-07T17:41:08Z");
    }

    #[test]
    fn error_display_carries_detail() {
        let e = SignError::CertificateDataMissing("issuer".into());
        assert_eq!(e.to_string(), "certificate data missing: issuer");
    }
}
