//! Allocation engine: resolves one activity's requests against the registry.
//!
//! A resolution runs, in order:
//! 1. ask the activity for its requests (none → not gated at all)
//! 2. stamp them with a fresh pass id
//! 3. probe the registry for what is obtainable
//! 4. probe, then maybe perform, transmutation for the shortfall set
//! 5. emit one shortfall event per unmet request
//! 6. gate: all met, or the activity accepts partial resources
//! 7. debit the registry and perform the activity
//!
//! Removal is immediate, so whichever activity resolves first wins any
//! contention for a shared resource.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityNode;
use crate::error::AllocationError;
use crate::registry::ResourceRegistry;
use crate::request::{validate_requests, AllocationPassId, ResourceRequest};
use crate::shortfall::ShortfallEvent;

/// Tolerance when checking what a registry reports it debited.
const DEBIT_EPSILON: f64 = 1e-9;

/// What happened to an activity in one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Asked for nothing; the protocol did not gate it.
    NoDemand,
    /// Gate passed: resources removed and the activity performed.
    Performed,
    /// Gate failed: nothing removed, activity not performed.
    Skipped,
}

/// Record of one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub activity_label: String,
    pub pass_id: Option<AllocationPassId>,
    pub outcome: Outcome,
    pub transmuted: bool,
    pub shortfalls: usize,
    pub requests: Vec<ResourceRequest>,
}

impl Resolution {
    fn no_demand(label: &str) -> Self {
        Self {
            activity_label: label.to_string(),
            pass_id: None,
            outcome: Outcome::NoDemand,
            transmuted: false,
            shortfalls: 0,
            requests: Vec::new(),
        }
    }
}

/// Whether transmutation should be applied to a shortfall set.
///
/// `shortfall` is the size of the set, `usable` the number of its requests
/// that both allow transmutation and were found convertible. The two arms are
/// combined with XOR, so a fully convertible shortfall on an activity that also
/// accepts partial resources does not transmute.
pub fn should_transmute(shortfall: usize, usable: usize, perform_with_partial: bool) -> bool {
    let all_convertible = shortfall > 0 && shortfall == usable;
    let partial_convertible = usable > 0 && perform_with_partial;
    all_convertible ^ partial_convertible
}

/// Runs resolutions and mints their pass ids.
#[derive(Debug, Default)]
pub struct AllocationEngine {
    next_pass: u64,
}

impl AllocationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_pass_id(&mut self) -> AllocationPassId {
        self.next_pass += 1;
        AllocationPassId(self.next_pass)
    }

    /// Number of passes minted so far.
    pub fn passes(&self) -> u64 {
        self.next_pass
    }

    /// Resolve one activity for the current step.
    pub fn resolve<R: ResourceRegistry>(
        &mut self,
        node: &mut ActivityNode<R>,
        registry: &mut R,
    ) -> Result<Resolution, AllocationError> {
        let perform_with_partial = node.perform_with_partial;
        let label = node.label().to_string();
        let (activity, requests, notifier) = node.resolution_parts();

        requests.clear();
        let needed = activity.determine_resources_needed(registry)?;
        let mut needed = match needed {
            Some(list) if !list.is_empty() => list,
            _ => return Ok(Resolution::no_demand(&label)),
        };
        validate_requests(&needed)?;

        let pass_id = self.next_pass_id();
        for request in &mut needed {
            request.begin_pass(pass_id);
            request.available = registry.lookup(&request.kind).available_for(request.required);
        }

        let mut shortfall: Vec<usize> = unmet_indices(&needed);
        let mut transmuted = false;
        if !shortfall.is_empty() {
            let mut batch: Vec<ResourceRequest> =
                shortfall.iter().map(|&i| needed[i].clone()).collect();
            registry.check_transmutation(&mut batch);
            let usable = batch.iter().filter(|r| r.transmutation_usable()).count();

            if should_transmute(batch.len(), usable, perform_with_partial) {
                log::info!(
                    "{}: transmuting {} shortfall request(s) for '{}'",
                    pass_id,
                    batch.len(),
                    label
                );
                registry.perform_transmutation(&mut batch);
                transmuted = true;
            }
            for (slot, updated) in shortfall.iter().zip(batch) {
                needed[*slot].transmutation = updated.transmutation;
            }

            if transmuted {
                for request in &mut needed {
                    request.available = registry
                        .lookup(&request.kind)
                        .available_after_transmutation(request.required);
                }
                shortfall = unmet_indices(&needed);
            }
        }

        for &i in &shortfall {
            notifier.notify(&ShortfallEvent::from_request(pass_id, &needed[i]));
        }

        let gate_open = shortfall.is_empty() || perform_with_partial;
        let outcome = if gate_open {
            for request in &mut needed {
                let asked = request.available.min(request.required);
                if !registry.lookup(&request.kind).is_tracked() {
                    // Outside the simulated economy: nothing to debit.
                    request.provided = asked;
                    continue;
                }
                let debited = registry.debit(request, asked);
                if debited < -DEBIT_EPSILON || debited > asked + DEBIT_EPSILON {
                    return Err(AllocationError::LedgerInconsistent {
                        activity: label,
                        kind: request.kind.clone(),
                        asked,
                        debited,
                    });
                }
                request.provided = debited;
            }
            activity.perform_activity(&needed, registry);
            Outcome::Performed
        } else {
            log::warn!(
                "{}: '{}' skipped with {} unmet request(s)",
                pass_id,
                label,
                shortfall.len()
            );
            Outcome::Skipped
        };

        log::debug!(
            "{}: '{}' resolved {:?} ({} request(s), {} shortfall(s))",
            pass_id,
            label,
            outcome,
            needed.len(),
            shortfall.len()
        );

        *requests = needed;
        Ok(Resolution {
            activity_label: label,
            pass_id: Some(pass_id),
            outcome,
            transmuted,
            shortfalls: shortfall.len(),
            requests: requests.clone(),
        })
    }
}

fn unmet_indices(requests: &[ResourceRequest]) -> Vec<usize> {
    requests
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_unmet())
        .map(|(i, _)| i)
        .collect()
}
