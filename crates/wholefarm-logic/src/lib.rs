//! Pure allocation logic for WholeFarm.
//!
//! A farm is modelled as a tree of activities (finance, livestock, cropping,
//! labour...) that compete each simulated step for a shared pool of typed
//! resources. This crate contains the request/allocation protocol only: it
//! knows nothing about how a feed store or bank balance behaves. Concrete
//! ledgers plug in through [`registry::ResourceRegistry`].
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`activity`] | Activity capability trait and the tagged activity tree |
//! | [`allocation`] | Per-activity resolution: probe, transmute, notify, gate, remove |
//! | [`error`] | Request contract violations and ledger faults |
//! | [`registry`] | Ledger contract consumed by the engine |
//! | [`request`] | Resource requests, kinds and allocation pass ids |
//! | [`shortfall`] | Synchronous unmet-request notification |
//! | [`traversal`] | Pre-order resolution of a whole activity tree |

pub mod activity;
pub mod allocation;
pub mod error;
pub mod registry;
pub mod request;
pub mod shortfall;
pub mod traversal;

pub use activity::{Activity, ActivityNode, ChildNode};
pub use allocation::{AllocationEngine, Outcome, Resolution};
pub use error::{AllocationError, RequestError};
pub use registry::{Lookup, ResourceRegistry};
pub use request::{AllocationPassId, ResourceKind, ResourceRequest, TransmutationStatus};
pub use shortfall::{ShortfallEvent, ShortfallLog, ShortfallNotifier, SubscriptionId};
pub use traversal::{for_each_activity_mut, resolve_all, TraversalReport};
