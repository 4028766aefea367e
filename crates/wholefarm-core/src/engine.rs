//! Simulation engine - steps a farm one month at a time

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wholefarm_logic::{
    for_each_activity_mut, resolve_all, ActivityNode, AllocationEngine, ShortfallEvent,
    ShortfallLog, TraversalReport,
};

use crate::config::FarmConfig;
use crate::error::{ConfigError, SimulationError};
use crate::resources::FarmResources;

/// Everything that happened in one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub month: u32,
    pub traversal: TraversalReport,
    /// Unmet requests, in emission order.
    pub shortfalls: Vec<ShortfallEvent>,
    /// Every store's amount at the end of the month.
    pub balances: BTreeMap<String, f64>,
}

/// Main simulation engine
pub struct FarmSimulation {
    /// Ledger shared by every activity
    pub resources: FarmResources,
    root: ActivityNode<FarmResources>,
    engine: AllocationEngine,
    shortfalls: ShortfallLog,
    month: u32,
    history: Vec<StepReport>,
}

impl FarmSimulation {
    pub fn new(config: &FarmConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(
            config.build_resources(),
            config.build_activity_tree(),
        ))
    }

    /// Assemble a simulation from an existing ledger and tree.
    pub fn from_parts(resources: FarmResources, mut root: ActivityNode<FarmResources>) -> Self {
        let shortfalls = ShortfallLog::new();
        attach_log(&shortfalls, &mut root);
        Self {
            resources,
            root,
            engine: AllocationEngine::new(),
            shortfalls,
            month: 0,
            history: Vec::new(),
        }
    }

    /// Resolve the whole tree for the current month, then run end-of-month hooks.
    pub fn step(&mut self) -> Result<&StepReport, SimulationError> {
        let month = self.month;
        self.resources.set_step(month);

        let traversal = resolve_all(&mut self.engine, &mut self.root, &mut self.resources)
            .map_err(|error| SimulationError::Allocation { month, error })?;

        let resources = &mut self.resources;
        for_each_activity_mut(&mut self.root, &mut |_, activity| {
            activity.end_of_step(resources)
        });

        let shortfalls = self.shortfalls.drain();
        log::info!(
            "month {}: {} performed, {} skipped, {} shortfall(s)",
            month,
            traversal.performed().count(),
            traversal.skipped().count(),
            shortfalls.len()
        );

        self.history.push(StepReport {
            month,
            traversal,
            shortfalls,
            balances: self.resources.snapshot(),
        });
        self.month += 1;
        Ok(&self.history[self.history.len() - 1])
    }

    pub fn run(&mut self, months: u32) -> Result<(), SimulationError> {
        for _ in 0..months {
            self.step()?;
        }
        Ok(())
    }

    /// Month that the next `step` will simulate.
    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn history(&self) -> &[StepReport] {
        &self.history
    }

    pub fn root(&self) -> &ActivityNode<FarmResources> {
        &self.root
    }

    /// Direct access to the tree. Nodes added through this are not wired to
    /// the shortfall log; use [`FarmSimulation::add_dynamic_child`] for that.
    pub fn root_mut(&mut self) -> &mut ActivityNode<FarmResources> {
        &mut self.root
    }

    /// Spawn `child` under the activity labelled `parent`, reporting its
    /// shortfalls like every other node. Returns false if `parent` is unknown.
    pub fn add_dynamic_child(
        &mut self,
        parent: &str,
        mut child: ActivityNode<FarmResources>,
    ) -> bool {
        let Some(node) = self.root.find_mut(parent) else {
            return false;
        };
        attach_log(&self.shortfalls, &mut child);
        node.add_dynamic_child(child);
        true
    }

    /// Shortfall log attached to every node the simulation knows about.
    pub fn shortfall_log(&self) -> &ShortfallLog {
        &self.shortfalls
    }

    pub fn report_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.history)
    }
}

fn attach_log(log: &ShortfallLog, root: &mut ActivityNode<FarmResources>) {
    root.for_each_node_mut(&mut |node| {
        log.attach(node.shortfall_notifier());
    });
}
