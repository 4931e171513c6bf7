// ── Core error types ──
//
// Engine-facing errors. Callers never see raw HTTP status codes or process
// exit statuses; the `From<netwarden_api::Error>` impl folds router
// transport failures into the same taxonomy as OS tooling failures.

use thiserror::Error;

use crate::model::{AlertId, DeviceId, MacAddress};

/// Unified error type for the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Device not found: {id}")]
    DeviceNotFound { id: DeviceId },

    #[error("Alert not found: {id}")]
    AlertNotFound { id: AlertId },

    #[error("A device with hardware address {mac} already exists (id {existing})")]
    DuplicateMac { mac: MacAddress, existing: DeviceId },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Actuation errors ─────────────────────────────────────────────
    #[error("Actuation failed ({operation}): {reason}")]
    ActuationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported {
        operation: &'static str,
        required: String,
    },

    // ── Engine state ─────────────────────────────────────────────────
    #[error("A discovery pass is already running")]
    DiscoveryInProgress,

    #[error("Engine is not running")]
    EngineStopped,

    // ── External collaborators ───────────────────────────────────────
    /// An external command failed, exited non-zero, or timed out.
    #[error("{tool} failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("Router error: {message}")]
    Router {
        message: String,
        /// Worth retrying (timeouts, 5xx, connection failures).
        transient: bool,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Probe timeouts, failing tools, unreachable router. Degrade and carry on.
    Transient,
    NotFound,
    /// Actuator reported failure; dependent transition skipped.
    Actuation,
    /// Rejected before touching the registry.
    Validation,
    Internal,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotFound { .. } | Self::AlertNotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateMac { .. } | Self::ValidationFailed { .. } | Self::Config { .. } => {
                ErrorKind::Validation
            }
            Self::ActuationFailed { .. } | Self::Unsupported { .. } => ErrorKind::Actuation,
            Self::Tool { .. } | Self::DiscoveryInProgress => ErrorKind::Transient,
            Self::Router { transient, .. } => {
                if *transient {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Actuation
                }
            }
            Self::EngineStopped | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    pub(crate) fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Re-label a backend failure as an actuation failure for `operation`.
    /// `Unsupported` passes through untouched.
    pub(crate) fn into_actuation(self, operation: &'static str) -> Self {
        match self {
            Self::Unsupported { .. } => self,
            Self::ActuationFailed { reason, .. } => Self::ActuationFailed { operation, reason },
            other => Self::ActuationFailed {
                operation,
                reason: other.to_string(),
            },
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<netwarden_api::Error> for CoreError {
    fn from(err: netwarden_api::Error) -> Self {
        let transient = err.is_transient();
        match err {
            netwarden_api::Error::UnsupportedCapability(cap) => CoreError::Unsupported {
                operation: "router directive",
                required: format!("router capability `{cap}`"),
            },
            netwarden_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid router URL: {e}"),
            },
            netwarden_api::Error::Tls(msg) => CoreError::Config {
                message: format!("Router TLS setup failed: {msg}"),
            },
            netwarden_api::Error::Deserialization { message, body: _ } => CoreError::Router {
                message: format!("unexpected response: {message}"),
                transient: false,
            },
            other => CoreError::Router {
                message: other.to_string(),
                transient,
            },
        }
    }
}
