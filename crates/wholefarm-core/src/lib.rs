//! WholeFarm Core - farm resource ledger and monthly simulation driver
//!
//! Plugs a concrete ledger and a handful of farm activities into the
//! allocation protocol from `wholefarm-logic`.
//!
//! # Architecture
//!
//! - **Resources**: groups of named stores (`Finance.Bank`, `AnimalFoodStore.Hay`)
//!   with an audit trail of every addition and removal
//! - **Transmutation**: per-store rules converting another resource into this one
//! - **Activities**: folders, enterprises that turn inputs into outputs, and
//!   monthly interest on bank accounts
//! - **Simulation**: resolves the whole activity tree once per month
//!
//! # Example
//!
//! ```rust,no_run
//! use wholefarm_core::prelude::*;
//!
//! let config = FarmConfig::from_path("data/demo_farm.json").unwrap();
//! let mut sim = FarmSimulation::new(&config).unwrap();
//! sim.run(12).unwrap();
//! println!("{}", sim.report_json().unwrap());
//! ```

pub mod activities;
pub mod config;
pub mod engine;
pub mod error;
pub mod resources;
pub mod transmutation;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::config::FarmConfig;
    pub use crate::engine::{FarmSimulation, StepReport};
    pub use crate::error::{ConfigError, SimulationError};
    pub use crate::resources::{FarmResources, ResourceItem};
}
