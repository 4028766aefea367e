//! Farm enterprise: consumes inputs each active month and yields products.
//!
//! An enterprise (a feeding regime, a cropping paddock, a hired-labour job)
//! asks for a fixed set of inputs every `every_months` months. When it runs,
//! its products are added to the ledger scaled by how well it was supplied:
//! the mean `provided / required` ratio across its inputs.

use serde::{Deserialize, Serialize};
use wholefarm_logic::{Activity, RequestError, ResourceKind, ResourceRequest};

use crate::resources::FarmResources;

/// One input requested every active month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub resource: ResourceKind,
    pub amount: f64,
    #[serde(default)]
    pub allow_transmutation: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One output produced when the enterprise runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub resource: ResourceKind,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct EnterpriseActivity {
    name: String,
    demands: Vec<Demand>,
    products: Vec<Product>,
    every_months: u32,
    months_performed: u32,
}

impl EnterpriseActivity {
    pub fn new(name: impl Into<String>, demands: Vec<Demand>, products: Vec<Product>) -> Self {
        Self {
            name: name.into(),
            demands,
            products,
            every_months: 1,
            months_performed: 0,
        }
    }

    pub fn every_months(mut self, interval: u32) -> Self {
        self.every_months = interval.max(1);
        self
    }

    pub fn months_performed(&self) -> u32 {
        self.months_performed
    }

    fn is_active(&self, step: u32) -> bool {
        step % self.every_months == 0
    }
}

/// Mean fraction supplied across the requests; 1.0 when nothing was asked.
pub fn supply_ratio(requests: &[ResourceRequest]) -> f64 {
    let ratios: Vec<f64> = requests
        .iter()
        .filter(|r| r.required > 0.0)
        .map(|r| (r.provided / r.required).min(1.0))
        .collect();
    if ratios.is_empty() {
        return 1.0;
    }
    ratios.iter().sum::<f64>() / ratios.len() as f64
}

impl Activity<FarmResources> for EnterpriseActivity {
    fn determine_resources_needed(
        &mut self,
        resources: &FarmResources,
    ) -> Result<Option<Vec<ResourceRequest>>, RequestError> {
        if !self.is_active(resources.step()) {
            return Ok(None);
        }
        let requests = self
            .demands
            .iter()
            .map(|d| -> Result<ResourceRequest, RequestError> {
                let request = ResourceRequest::new(self.name.clone(), d.resource.clone(), d.amount)?
                    .with_transmutation(d.allow_transmutation);
                Ok(match &d.reason {
                    Some(reason) => request.with_reason(reason.clone()),
                    None => request,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(requests))
    }

    fn perform_activity(&mut self, requests: &[ResourceRequest], resources: &mut FarmResources) {
        self.months_performed += 1;
        let ratio = supply_ratio(requests);
        for product in &self.products {
            let amount = product.amount * ratio;
            if amount <= 0.0 {
                continue;
            }
            if !resources.add(&product.resource, amount, &self.name, "Production") {
                log::debug!(
                    "{}: {} is not stored on this farm, output discarded",
                    self.name,
                    product.resource
                );
            }
        }
    }
}
