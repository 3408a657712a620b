//! Tagged hardware backends.
//!
//! A domain is either bound to a real driver or running on a simulation model
//! for a recorded reason. Callers match on the tag; there is no separate
//! "sim" boolean to keep in sync with the handle.

use serde::Serialize;
use std::fmt;

/// Why a domain is simulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "cause", rename_all = "snake_case")]
pub enum SimReason {
    /// Simulation requested by configuration or environment.
    Forced,
    /// Binding real hardware failed; carries the original cause.
    Fallback(String),
    /// Real drivers were handed back at shutdown; calls are no-ops.
    Released,
}

impl fmt::Display for SimReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimReason::Forced => f.write_str("forced by environment"),
            SimReason::Fallback(cause) => write!(f, "fallback to simulator: {cause}"),
            SimReason::Released => f.write_str("hardware released at shutdown"),
        }
    }
}

pub enum Backend<H> {
    Real(H),
    Simulated(SimReason),
}

impl<H> Backend<H> {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Backend::Simulated(_))
    }

    pub fn mode(&self) -> DomainMode {
        match self {
            Backend::Real(_) => DomainMode::Real,
            Backend::Simulated(reason) => DomainMode::Simulated {
                reason: reason.clone(),
            },
        }
    }
}

impl<H> fmt::Debug for Backend<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Real(_) => f.write_str("Real"),
            Backend::Simulated(reason) => f.debug_tuple("Simulated").field(reason).finish(),
        }
    }
}

/// Serializable view of a backend tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DomainMode {
    Real,
    Simulated { reason: SimReason },
}

impl DomainMode {
    pub fn is_simulated(&self) -> bool {
        matches!(self, DomainMode::Simulated { .. })
    }
}

impl fmt::Display for DomainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainMode::Real => f.write_str("HARDWARE"),
            DomainMode::Simulated { reason } => write!(f, "SIMULATOR ({reason})"),
        }
    }
}
