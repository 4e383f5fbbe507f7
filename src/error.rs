//! Error taxonomy for configuration-time and control-plane-time failures.
//!
//! The audio hot path (`SyncCore::push_audio`, `SyncCore::fill_buffer`) never
//! returns `CoreError` — per the propagation policy it surfaces only byte
//! counts and booleans. `CoreError` is reserved for `open()`, the
//! control-plane bridge, and the CLI.

use std::fmt;

/// Abstract error kinds from the error handling design.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Sink capability inquiry returned no format this core can emit.
    #[error("sink rejected all offered formats")]
    SinkRejected,

    /// Transport negotiation failed after exhausting the retry table.
    #[error("connect failed after {attempts} attempt(s): {reason}")]
    ConnectFailed { attempts: u32, reason: String },

    /// No target found at startup (device discovery).
    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Real-time scheduling could not be obtained for the consumer thread.
    /// Never fatal — logged once, playback continues at default priority.
    #[error("could not obtain real-time scheduling priority: {0}")]
    PriorityDenied(String),

    /// A bounded wait (online, drain-silence, callback shutdown) expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Malformed configuration (CLI argument, control-plane URI, format
    /// negotiation input).
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias for configuration-time / control-plane-time operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Outcome of a control-plane call that must report success/failure to a
/// UPnP-style caller without propagating a typed error across the boundary,
/// per §7's "Configuration-time errors propagate up to the control plane as
/// boolean success, with a diagnostic log."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Accepted,
    Rejected,
}

impl ControlOutcome {
    pub fn from_result<T>(result: &CoreResult<T>) -> Self {
        match result {
            Ok(_) => ControlOutcome::Accepted,
            Err(_) => ControlOutcome::Rejected,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, ControlOutcome::Accepted)
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOutcome::Accepted => write!(f, "accepted"),
            ControlOutcome::Rejected => write!(f, "rejected"),
        }
    }
}
