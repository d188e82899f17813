//! Error types for the attestation kernel.

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Kernel-wide error categories.
///
/// Variants map onto the error taxonomy every service reports through:
/// validation failures, missing records, cryptographic faults, lifecycle
/// states (expired/revoked), policy gates, storage faults, and the network/
/// ledger boundary. Verification methods never propagate these — they
/// flatten failures into a `{valid: false, checks: {..}}` result instead.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A required field was empty, malformed, or outside its allowed enum.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested entity does not exist in its collection.
    #[error("not found: {0}")]
    NotFound(String),

    /// A signature, DID, or key encoding failed to verify or decode.
    #[error("cryptographic error: {0}")]
    Cryptographic(String),

    /// The entity's `expires_at` is in the past.
    #[error("expired: {0}")]
    Expired(String),

    /// The entity has been revoked.
    #[error("revoked: {0}")]
    Revoked(String),

    /// A policy gate rejected the operation (e.g. high-risk self-assessment).
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A per-file lock could not be acquired within the configured timeout.
    #[error("storage busy: {0}")]
    StorageBusy(String),

    /// A collection file was corrupted and has been quarantined.
    #[error("storage corrupted: {0}")]
    StorageCorrupted(String),

    /// An outbound network call (DNS, HTTPS) failed or timed out.
    #[error("network error: {0}")]
    Network(String),

    /// A hostname/IP was rejected by SSRF validation.
    #[error("SSRF blocked: {0}")]
    SsrfBlocked(String),

    /// A ledger operation was attempted with no ledger credential configured.
    #[error("ledger not configured: {0}")]
    LedgerUnconfigured(String),

    /// A configured ledger call failed (broadcast, receipt, or read).
    #[error("ledger failure: {0}")]
    LedgerFailure(String),

    /// An invariant violation that should never surface to a caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KernelError {
    /// The §7 error category name, for use by an embedding transport layer.
    /// Not an HTTP status — the transport is out of scope for this crate.
    pub fn category(&self) -> &'static str {
        match self {
            KernelError::Validation(_) => "Validation",
            KernelError::NotFound(_) => "NotFound",
            KernelError::Cryptographic(_) => "Cryptographic",
            KernelError::Expired(_) => "Expired",
            KernelError::Revoked(_) => "Revoked",
            KernelError::PolicyViolation(_) => "PolicyViolation",
            KernelError::StorageBusy(_) => "StorageBusy",
            KernelError::StorageCorrupted(_) => "StorageCorrupted",
            KernelError::Network(_) => "Network",
            KernelError::SsrfBlocked(_) => "SSRFBlocked",
            KernelError::LedgerUnconfigured(_) => "LedgerUnconfigured",
            KernelError::LedgerFailure(_) => "LedgerFailure",
            KernelError::Internal(_) => "Internal",
        }
    }

    /// Whether retrying the same operation might succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KernelError::StorageBusy(_) | KernelError::Network(_) | KernelError::LedgerFailure(_)
        )
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Internal(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::StorageCorrupted(err.to_string())
    }
}

impl From<reqwest::Error> for KernelError {
    fn from(err: reqwest::Error) -> Self {
        KernelError::Network(err.to_string())
    }
}
