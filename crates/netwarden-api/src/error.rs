use thiserror::Error;

/// Everything that can go wrong talking to a router's control plane.
/// `netwarden-core` folds these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login refused: bad credentials or the admin account is locked out.
    #[error("Router login failed: {message}")]
    Authentication { message: String },

    /// The router dropped our session (cookie expired or revoked).
    #[error("Router session expired")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    #[error("Cannot reach router: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid router URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Router did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Certificate bundle or client construction failure.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    // ── Router ──────────────────────────────────────────────────────
    /// The router answered but refused the directive (`success: false`).
    #[error("Router rejected request: {message}")]
    Rejected { message: String },

    /// Non-success HTTP status without a structured body.
    #[error("Router returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The router does not advertise the capability required for this call.
    #[error("Router does not support {0}")]
    UnsupportedCapability(&'static str),

    // ── Data ────────────────────────────────────────────────────────
    /// Body did not match the expected envelope. `body` is kept for logs.
    #[error("Unexpected router response: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// A fresh login might fix this.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Timeouts, refused connections and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_report_expired() {
        assert!(Error::SessionExpired.is_auth_expired());
        assert!(
            Error::Authentication {
                message: "bad password".into()
            }
            .is_auth_expired()
        );
        assert!(
            !Error::Rejected {
                message: "nope".into()
            }
            .is_auth_expired()
        );
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            message: "busy".into(),
        };
        assert!(err.is_transient());

        let err = Error::Http {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.is_transient());
    }
}
