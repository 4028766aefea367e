//! Monthly interest on bank accounts.
//!
//! Requests nothing through the allocation protocol. At the end of each month,
//! positive balances earn `balance × rate_paid / 1200` and negative balances
//! are charged `|balance| × rate_charged / 1200` (rates are annual percent).

use wholefarm_logic::{Activity, RequestError, ResourceRequest};

use crate::resources::FarmResources;

pub const INTEREST_EARNED: &str = "Interest earned";
pub const INTEREST_CHARGED: &str = "Interest charged";

#[derive(Debug, Clone)]
pub struct CalculateInterest {
    name: String,
}

impl CalculateInterest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Apply one month of interest to every finance account.
    pub fn apply(&self, resources: &mut FarmResources) {
        for account in resources.finance_accounts() {
            let Some(item) = resources.item(&account) else {
                continue;
            };
            let balance = item.amount;
            if balance > 0.0 {
                let earned = balance * item.interest_rate_paid / 1200.0;
                if earned != 0.0 {
                    resources.add(&account, earned, &self.name, INTEREST_EARNED);
                }
            } else {
                let charged = balance.abs() * item.interest_rate_charged / 1200.0;
                if charged != 0.0 {
                    resources.charge(&account, charged, &self.name, INTEREST_CHARGED);
                    log::debug!("{}: charged {:.2} interest on {}", self.name, charged, account);
                }
            }
        }
    }
}

impl Activity<FarmResources> for CalculateInterest {
    fn determine_resources_needed(
        &mut self,
        _resources: &FarmResources,
    ) -> Result<Option<Vec<ResourceRequest>>, RequestError> {
        Ok(None)
    }

    fn perform_activity(&mut self, _requests: &[ResourceRequest], _resources: &mut FarmResources) {}

    fn end_of_step(&mut self, resources: &mut FarmResources) {
        self.apply(resources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceItem;
    use wholefarm_logic::ResourceKind;

    fn account(amount: f64) -> ResourceItem {
        ResourceItem {
            amount,
            interest_rate_paid: 6.0,
            interest_rate_charged: 12.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_interest_earned() {
        let bank = ResourceKind::new("Finance", "Bank");
        let mut res = FarmResources::new();
        res.insert(&bank, account(1200.0));
        CalculateInterest::new("Interest").apply(&mut res);
        assert!((res.amount(&bank).unwrap() - 1206.0).abs() < 1e-9);
        assert_eq!(res.entries()[0].reason, INTEREST_EARNED);
    }

    #[test]
    fn test_interest_charged_on_overdraft() {
        let bank = ResourceKind::new("Finance", "Loan");
        let mut res = FarmResources::new();
        res.insert(&bank, account(-1200.0));
        CalculateInterest::new("Interest").apply(&mut res);
        assert!((res.amount(&bank).unwrap() + 1212.0).abs() < 1e-9);
        assert_eq!(res.entries()[0].reason, INTEREST_CHARGED);
    }

    #[test]
    fn test_zero_balance_untouched() {
        let bank = ResourceKind::new("Finance", "Bank");
        let mut res = FarmResources::new();
        res.insert(&bank, account(0.0));
        CalculateInterest::new("Interest").apply(&mut res);
        assert!(res.entries().is_empty());
    }

    #[test]
    fn test_no_finance_group() {
        let mut res = FarmResources::new();
        CalculateInterest::new("Interest").apply(&mut res);
        assert!(res.entries().is_empty());
    }

    #[test]
    fn test_requests_nothing() {
        let res = FarmResources::new();
        let mut activity = CalculateInterest::new("Interest");
        assert_eq!(activity.determine_resources_needed(&res), Ok(None));
    }
}
