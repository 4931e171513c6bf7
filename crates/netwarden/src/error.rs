//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use netwarden_config::ConfigError;
use netwarden_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(netwarden::not_found))]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(netwarden::conflict), help("{hint}"))]
    Conflict {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(netwarden::validation))]
    Validation { field: String, reason: String },

    // ── Actuation ────────────────────────────────────────────────────
    #[error("Could not {operation}: {reason}")]
    #[diagnostic(
        code(netwarden::actuation),
        help(
            "ARP blocking needs CAP_NET_RAW/CAP_NET_ADMIN and arpspoof on PATH.\n\
             Try running as root, or switch engine.block_backend to \"router\"."
        )
    )]
    Actuation { operation: String, reason: String },

    #[error("Operation '{operation}' is not supported")]
    #[diagnostic(
        code(netwarden::unsupported),
        help("This needs {required}. Configure a [router] section with that capability.")
    )]
    Unsupported { operation: String, required: String },

    #[error("{tool} failed: {reason}")]
    #[diagnostic(
        code(netwarden::tool),
        help("Check that {tool} is installed and the interface name is correct.")
    )]
    Tool { tool: String, reason: String },

    // ── Router ───────────────────────────────────────────────────────
    #[error("Router error: {message}")]
    #[diagnostic(
        code(netwarden::router),
        help("Verify router.url and credentials with: netwarden config show")
    )]
    Router { message: String },

    // ── Engine ───────────────────────────────────────────────────────
    #[error("Engine is busy: {reason}")]
    #[diagnostic(code(netwarden::busy), help("Retry once the current pass finishes."))]
    Busy { reason: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(netwarden::internal))]
    Internal { message: String },

    // ── Server ───────────────────────────────────────────────────────
    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(netwarden::bind),
        help("Pick a free address with --listen or server.listen in the config file.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(netwarden::config),
        help("Inspect the effective settings with: netwarden config show")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(netwarden::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Config(ConfigError::Validation { .. }) => {
                exit_code::USAGE
            }
            Self::Actuation { .. } | Self::Unsupported { .. } => exit_code::PERMISSION,
            Self::Router { .. } | Self::Bind { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: id.to_string(),
            },
            CoreError::AlertNotFound { id } => CliError::NotFound {
                resource_type: "alert".into(),
                identifier: id.to_string(),
            },
            CoreError::DuplicateMac { mac, existing } => CliError::Conflict {
                resource_type: "device".into(),
                identifier: mac.to_string(),
                hint: format!("Device {existing} already uses this hardware address."),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "request".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::ActuationFailed { operation, reason } => CliError::Actuation {
                operation: operation.into(),
                reason,
            },
            CoreError::Unsupported {
                operation,
                required,
            } => CliError::Unsupported {
                operation: operation.into(),
                required,
            },
            CoreError::Tool { tool, reason } => CliError::Tool { tool, reason },
            CoreError::Router { message, .. } => CliError::Router { message },
            CoreError::DiscoveryInProgress => CliError::Busy {
                reason: "a discovery pass is already running".into(),
            },
            CoreError::EngineStopped => CliError::Internal {
                message: "engine is not running".into(),
            },
            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}
