//! Errors raised by the allocation protocol.
//!
//! Only contract violations live here. An untracked resource kind, a failed
//! transmutation probe or an unmet request are ordinary outcomes and never
//! produce an error.

use crate::request::ResourceKind;

/// A request (or request list) that breaks the activity-side contract.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// `required` was negative, NaN or infinite.
    InvalidAmount { kind: ResourceKind, amount: f64 },
    /// The same kind was requested twice with different transmutation flags.
    ConflictingDuplicate { activity: String, kind: ResourceKind },
    /// A resource kind string could not be parsed as `group.item`.
    InvalidKind(String),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::InvalidAmount { kind, amount } => {
                write!(f, "invalid amount {} requested for {}", amount, kind)
            }
            RequestError::ConflictingDuplicate { activity, kind } => write!(
                f,
                "activity '{}' requested {} twice with conflicting transmutation settings",
                activity, kind
            ),
            RequestError::InvalidKind(raw) => {
                write!(f, "invalid resource kind '{}' (expected group.item)", raw)
            }
        }
    }
}

impl std::error::Error for RequestError {}

/// Failure of a single resolution. Aborts the traversal that hit it.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationError {
    Request(RequestError),
    /// The registry debited more than it was asked for, or a negative amount.
    LedgerInconsistent {
        activity: String,
        kind: ResourceKind,
        asked: f64,
        debited: f64,
    },
}

impl From<RequestError> for AllocationError {
    fn from(e: RequestError) -> Self {
        AllocationError::Request(e)
    }
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationError::Request(e) => write!(f, "request error: {}", e),
            AllocationError::LedgerInconsistent {
                activity,
                kind,
                asked,
                debited,
            } => write!(
                f,
                "ledger inconsistent for '{}': asked to debit {} of {}, registry debited {}",
                activity, asked, kind, debited
            ),
        }
    }
}

impl std::error::Error for AllocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocationError::Request(e) => Some(e),
            _ => None,
        }
    }
}
