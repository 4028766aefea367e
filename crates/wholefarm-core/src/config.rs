//! Farm scenario configuration: resources and the activity tree, as JSON.
//!
//! ```json
//! {
//!   "name": "Demo farm",
//!   "resources": [
//!     { "name": "Finance", "items": [ { "name": "Bank", "amount": 1000.0 } ] }
//!   ],
//!   "activities": [
//!     { "name": "Interest", "type": "calculate_interest" }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use wholefarm_logic::{ActivityNode, ResourceKind};

use crate::activities::{ActivityFolder, CalculateInterest, Demand, EnterpriseActivity, Product};
use crate::error::ConfigError;
use crate::resources::{FarmResources, ResourceItem};

/// Complete farm scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmConfig {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ResourceGroupConfig>,
    #[serde(default)]
    pub activities: Vec<ActivityConfig>,
}

/// A resource category and its stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceGroupConfig {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ResourceItemConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceItemConfig {
    pub name: String,
    #[serde(flatten)]
    pub item: ResourceItem,
}

/// One node of the activity tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ActivityKind,
    #[serde(default)]
    pub perform_with_partial: bool,
    /// Declared child activities.
    #[serde(default)]
    pub children: Vec<ActivityConfig>,
    /// Children the activity creates itself; resolved before declared ones.
    #[serde(default)]
    pub dynamic_children: Vec<ActivityConfig>,
    /// Non-activity models attached to this node (notes, reports...).
    #[serde(default)]
    pub inert: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    Folder,
    CalculateInterest,
    Enterprise {
        #[serde(default)]
        demands: Vec<Demand>,
        #[serde(default)]
        products: Vec<Product>,
        #[serde(default = "default_interval")]
        every_months: u32,
    },
}

fn default_interval() -> u32 {
    1
}

impl FarmConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FarmConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check names are unique, amounts sane and transmutation sources exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut kinds = BTreeSet::new();
        let mut groups = BTreeSet::new();
        for group in &self.resources {
            if !groups.insert(group.name.as_str()) {
                return Err(ConfigError::DuplicateResource(group.name.clone()));
            }
            for item in &group.items {
                let kind = ResourceKind::new(group.name.clone(), item.name.clone());
                check_finite(&format!("{}.amount", kind), item.item.amount)?;
                check_non_negative(&format!("{}.overdraft_limit", kind), item.item.overdraft_limit)?;
                check_non_negative(&format!("{}.interest_rate_paid", kind), item.item.interest_rate_paid)?;
                check_non_negative(
                    &format!("{}.interest_rate_charged", kind),
                    item.item.interest_rate_charged,
                )?;
                if !kinds.insert(kind.clone()) {
                    return Err(ConfigError::DuplicateResource(kind.to_string()));
                }
            }
        }

        for group in &self.resources {
            for item in &group.items {
                let target = ResourceKind::new(group.name.clone(), item.name.clone());
                for rule in &item.item.transmutations {
                    if !kinds.contains(&rule.source) {
                        return Err(ConfigError::UnknownTransmutationSource {
                            target: target.to_string(),
                            source: rule.source.to_string(),
                        });
                    }
                    if !(rule.cost_per_unit.is_finite() && rule.cost_per_unit > 0.0) {
                        return Err(ConfigError::InvalidValue {
                            field: format!("{} cost_per_unit", target),
                            value: rule.cost_per_unit,
                        });
                    }
                }
            }
        }

        let mut names = BTreeSet::new();
        if !self.name.is_empty() {
            names.insert(self.name.clone());
        }
        for activity in &self.activities {
            activity.validate(&mut names)?;
        }
        Ok(())
    }

    pub fn build_resources(&self) -> FarmResources {
        let mut resources = FarmResources::new();
        for group in &self.resources {
            resources.add_group(group.name.clone());
            for item in &group.items {
                let kind = ResourceKind::new(group.name.clone(), item.name.clone());
                resources.insert(&kind, item.item.clone());
            }
        }
        resources
    }

    /// Root folder named after the farm, with every configured activity beneath it.
    pub fn build_activity_tree(&self) -> ActivityNode<FarmResources> {
        let mut root = ActivityNode::new(self.name.clone(), Box::new(ActivityFolder));
        for activity in &self.activities {
            root.add_child(activity.build());
        }
        root
    }
}

impl ActivityConfig {
    fn validate(&self, names: &mut BTreeSet<String>) -> Result<(), ConfigError> {
        if !names.insert(self.name.clone()) {
            return Err(ConfigError::DuplicateActivity(self.name.clone()));
        }
        if let ActivityKind::Enterprise {
            demands,
            products,
            every_months,
        } = &self.kind
        {
            for d in demands {
                check_non_negative(&format!("{} demand for {}", self.name, d.resource), d.amount)?;
            }
            for p in products {
                check_non_negative(&format!("{} product {}", self.name, p.resource), p.amount)?;
            }
            if *every_months == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{} every_months", self.name),
                    value: 0.0,
                });
            }
        }
        for child in self.dynamic_children.iter().chain(&self.children) {
            child.validate(names)?;
        }
        Ok(())
    }

    pub fn build(&self) -> ActivityNode<FarmResources> {
        let behaviour: Box<dyn wholefarm_logic::Activity<FarmResources>> = match &self.kind {
            ActivityKind::Folder => Box::new(ActivityFolder),
            ActivityKind::CalculateInterest => Box::new(CalculateInterest::new(self.name.clone())),
            ActivityKind::Enterprise {
                demands,
                products,
                every_months,
            } => Box::new(
                EnterpriseActivity::new(self.name.clone(), demands.clone(), products.clone())
                    .every_months(*every_months),
            ),
        };
        let mut node = ActivityNode::new(self.name.clone(), behaviour)
            .with_partial(self.perform_with_partial);
        for child in &self.dynamic_children {
            node.add_dynamic_child(child.build());
        }
        for child in &self.children {
            node.add_child(child.build());
        }
        for name in &self.inert {
            node.add_inert_child(name.clone());
        }
        node
    }
}

fn check_finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        })
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}
