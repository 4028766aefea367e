//! Transmutation: converting one resource into another to cover a shortfall.
//!
//! Each store may list rules of the form "one unit of me costs `cost_per_unit`
//! of `source`", e.g. hay bought from the bank account. Rules are tried in the
//! order they are listed; the first source that can cover the whole deficit is
//! used. Within one batch, what earlier requests would consume is reserved so
//! two requests cannot both count on the same money.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wholefarm_logic::{ResourceKind, ResourceRequest, TransmutationStatus};

use crate::resources::FarmResources;

pub const TRANSMUTATION_REASON: &str = "Transmutation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmutationRule {
    pub source: ResourceKind,
    /// Units of `source` consumed per unit produced.
    pub cost_per_unit: f64,
}

/// Index of the first rule whose source covers `deficit`, given what is
/// already reserved from each source.
fn pick_rule(
    resources: &FarmResources,
    target: &ResourceKind,
    deficit: f64,
    reserved: &BTreeMap<ResourceKind, f64>,
) -> Option<(ResourceKind, f64)> {
    let item = resources.item(target)?;
    item.transmutations.iter().find_map(|rule| {
        let cost = deficit * rule.cost_per_unit;
        let held = resources.item(&rule.source)?.withdrawable();
        let claimed = reserved.get(&rule.source).copied().unwrap_or(0.0);
        (held - claimed >= cost).then(|| (rule.source.clone(), cost))
    })
}

/// Feasibility only: marks each request, leaves the ledger alone.
pub fn check(resources: &FarmResources, requests: &mut [ResourceRequest]) {
    let mut reserved = BTreeMap::new();
    for request in requests.iter_mut() {
        let deficit = request.shortfall();
        request.transmutation = match pick_rule(resources, &request.kind, deficit, &reserved) {
            Some((source, cost)) => {
                if request.allow_transmutation {
                    *reserved.entry(source).or_insert(0.0) += cost;
                }
                TransmutationStatus::Possible
            }
            None => TransmutationStatus::NotPossible,
        };
    }
}

/// Convert for every request that allows it and was found possible.
pub fn perform(resources: &mut FarmResources, requests: &mut [ResourceRequest]) {
    let empty = BTreeMap::new();
    for request in requests.iter_mut().filter(|r| r.transmutation_usable()) {
        let deficit = request.shortfall();
        let Some((source, cost)) = pick_rule(resources, &request.kind, deficit, &empty) else {
            log::warn!(
                "{} no longer convertible for '{}'",
                request.kind,
                request.activity_label
            );
            request.transmutation = TransmutationStatus::NotPossible;
            continue;
        };
        let paid = resources.remove(&source, cost, &request.activity_label, TRANSMUTATION_REASON);
        let gained = if cost > 0.0 { deficit * paid / cost } else { deficit };
        resources.add(&request.kind, gained, &request.activity_label, TRANSMUTATION_REASON);
        log::debug!(
            "transmuted {:.2} {} into {:.2} {} for '{}'",
            paid,
            source,
            gained,
            request.kind,
            request.activity_label
        );
    }
}
