//! Whole-tree resolution in pre-order.
//!
//! Visit order is part of the simulation's semantics: a node resolves before
//! any of its children, dynamically created children resolve before declared
//! ones, and siblings resolve in the order they were attached. Changing it
//! changes who wins contention for a shared resource.

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ActivityNode};
use crate::allocation::{AllocationEngine, Outcome, Resolution};
use crate::error::AllocationError;
use crate::registry::ResourceRegistry;
use crate::request::ResourceKind;

/// Every resolution of one traversal, in visit order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalReport {
    pub resolutions: Vec<Resolution>,
}

impl TraversalReport {
    pub fn performed(&self) -> impl Iterator<Item = &Resolution> {
        self.with_outcome(Outcome::Performed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Resolution> {
        self.with_outcome(Outcome::Skipped)
    }

    fn with_outcome(&self, outcome: Outcome) -> impl Iterator<Item = &Resolution> {
        self.resolutions.iter().filter(move |r| r.outcome == outcome)
    }

    pub fn shortfall_count(&self) -> usize {
        self.resolutions.iter().map(|r| r.shortfalls).sum()
    }

    /// Total debited from `kind` across the traversal.
    pub fn provided_for(&self, kind: &ResourceKind) -> f64 {
        self.resolutions
            .iter()
            .flat_map(|r| r.requests.iter())
            .filter(|req| &req.kind == kind)
            .map(|req| req.provided)
            .sum()
    }

    pub fn get(&self, label: &str) -> Option<&Resolution> {
        self.resolutions.iter().find(|r| r.activity_label == label)
    }

    /// Labels in the order they were visited.
    pub fn visit_order(&self) -> Vec<&str> {
        self.resolutions
            .iter()
            .map(|r| r.activity_label.as_str())
            .collect()
    }
}

/// Resolve `root` and every activity beneath it.
///
/// Stops at the first contract violation; resolutions that already ran keep
/// their effect on the registry.
pub fn resolve_all<R: ResourceRegistry>(
    engine: &mut AllocationEngine,
    root: &mut ActivityNode<R>,
    registry: &mut R,
) -> Result<TraversalReport, AllocationError> {
    let mut report = TraversalReport::default();
    visit(engine, root, registry, &mut report)?;
    Ok(report)
}

fn visit<R: ResourceRegistry>(
    engine: &mut AllocationEngine,
    node: &mut ActivityNode<R>,
    registry: &mut R,
    report: &mut TraversalReport,
) -> Result<(), AllocationError> {
    report.resolutions.push(engine.resolve(node, registry)?);
    for child in node.ordered_children_mut() {
        visit(engine, child, registry, report)?;
    }
    Ok(())
}

/// Call `f` on every activity in traversal order.
pub fn for_each_activity_mut<R, F>(root: &mut ActivityNode<R>, f: &mut F)
where
    R: ResourceRegistry,
    F: FnMut(&str, &mut dyn Activity<R>),
{
    let label = root.label().to_string();
    f(&label, root.behaviour_mut());
    for child in root.ordered_children_mut() {
        for_each_activity_mut(child, f);
    }
}
