//! Concrete farm activities.

pub mod enterprise;
pub mod folder;
pub mod interest;

pub use enterprise::{Demand, EnterpriseActivity, Product};
pub use folder::ActivityFolder;
pub use interest::CalculateInterest;
