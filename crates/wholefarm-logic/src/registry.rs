//! Ledger contract consumed by the allocation engine.
//!
//! The registry owns the live resource amounts. The engine only ever mutates
//! it through [`ResourceRegistry::perform_transmutation`] and
//! [`ResourceRegistry::debit`], both called from inside a resolution.

use crate::request::{ResourceKind, ResourceRequest};

/// Result of looking a resource kind up in the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    /// The kind is part of the simulated economy and holds this amount (may be 0).
    Tracked(f64),
    /// The category is simulated but has no item of this kind.
    Missing,
    /// The kind's category is not simulated at all; treat it as unlimited.
    Untracked,
}

impl Lookup {
    /// Probe-phase availability: capped by the held amount, or the full
    /// requirement when untracked.
    pub fn available_for(self, required: f64) -> f64 {
        match self {
            Lookup::Tracked(held) => held.min(required),
            Lookup::Missing => 0.0,
            Lookup::Untracked => required,
        }
    }

    /// Availability recomputed after transmutation has topped the ledger up.
    ///
    /// Only an existing item counts here: it reports the larger of held and
    /// required, so `available` can exceed `required`. Missing items and
    /// untracked kinds drop to 0.
    pub fn available_after_transmutation(self, required: f64) -> f64 {
        match self {
            Lookup::Tracked(held) => held.max(required),
            Lookup::Missing | Lookup::Untracked => 0.0,
        }
    }

    /// Whether the registry's category exists, i.e. removal goes through
    /// [`ResourceRegistry::debit`].
    pub fn is_tracked(self) -> bool {
        !matches!(self, Lookup::Untracked)
    }
}

/// A ledger of typed resources.
pub trait ResourceRegistry {
    fn lookup(&self, kind: &ResourceKind) -> Lookup;

    /// Feasibility-only probe: set `transmutation` on every request in the
    /// batch without touching the ledger.
    fn check_transmutation(&self, requests: &mut [ResourceRequest]);

    /// Convert other resources into the kinds these requests are short of.
    fn perform_transmutation(&mut self, requests: &mut [ResourceRequest]);

    /// Remove up to `amount` of the request's kind. Returns what was removed.
    fn debit(&mut self, request: &ResourceRequest, amount: f64) -> f64;
}
