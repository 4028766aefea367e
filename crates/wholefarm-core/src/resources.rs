//! Farm resource ledger: the concrete registry behind the allocation engine.
//!
//! Resources are organised as groups (the category) holding named items:
//! `Finance.Bank`, `AnimalFoodStore.Lucerne`, `Labour.Family`. A group that is
//! not present is outside the simulated economy and reports as untracked; an
//! item missing from a present group reports as missing and holds nothing.
//! Withdrawals, and so what a request can be granted, are bounded by
//! [`ResourceItem::withdrawable`], which includes any overdraft.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wholefarm_logic::{Lookup, ResourceKind, ResourceRegistry, ResourceRequest};

use crate::transmutation::{self, TransmutationRule};

/// Group whose items are bank accounts.
pub const FINANCE_GROUP: &str = "Finance";

/// One resource store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    /// Current amount. Only finance accounts may go negative.
    pub amount: f64,
    /// How far below zero withdrawals may take the amount.
    #[serde(default)]
    pub overdraft_limit: f64,
    /// Annual interest paid on a positive balance, in percent.
    #[serde(default)]
    pub interest_rate_paid: f64,
    /// Annual interest charged on a negative balance, in percent.
    #[serde(default)]
    pub interest_rate_charged: f64,
    /// Conversions into this item, tried in order.
    #[serde(default)]
    pub transmutations: Vec<TransmutationRule>,
}

impl ResourceItem {
    pub fn with_amount(amount: f64) -> Self {
        Self {
            amount,
            ..Default::default()
        }
    }

    /// What can be withdrawn right now.
    pub fn withdrawable(&self) -> f64 {
        (self.amount + self.overdraft_limit).max(0.0)
    }
}

/// Audit trail record for one change to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub step: u32,
    pub kind: ResourceKind,
    /// Positive for additions, negative for removals.
    pub delta: f64,
    pub activity: String,
    pub reason: String,
}

/// All farm resources plus the audit trail.
#[derive(Debug, Clone, Default)]
pub struct FarmResources {
    groups: BTreeMap<String, BTreeMap<String, ResourceItem>>,
    entries: Vec<LedgerEntry>,
    step: u32,
}

impl FarmResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a category. Existing items are kept.
    pub fn add_group(&mut self, group: impl Into<String>) {
        self.groups.entry(group.into()).or_default();
    }

    /// Insert or replace an item; its group becomes tracked.
    pub fn insert(&mut self, kind: &ResourceKind, item: ResourceItem) {
        self.groups
            .entry(kind.group().to_string())
            .or_default()
            .insert(kind.item().to_string(), item);
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn item(&self, kind: &ResourceKind) -> Option<&ResourceItem> {
        self.groups.get(kind.group())?.get(kind.item())
    }

    pub fn item_mut(&mut self, kind: &ResourceKind) -> Option<&mut ResourceItem> {
        self.groups.get_mut(kind.group())?.get_mut(kind.item())
    }

    /// Current amount, `None` when the item does not exist.
    pub fn amount(&self, kind: &ResourceKind) -> Option<f64> {
        self.item(kind).map(|i| i.amount)
    }

    /// Current simulation step, stamped on ledger entries.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn set_step(&mut self, step: u32) {
        self.step = step;
    }

    /// Add to an existing item. Returns false if the item does not exist.
    pub fn add(&mut self, kind: &ResourceKind, amount: f64, activity: &str, reason: &str) -> bool {
        let step = self.step;
        match self.item_mut(kind) {
            Some(item) => {
                item.amount += amount;
                self.record(step, kind, amount, activity, reason);
                true
            }
            None => false,
        }
    }

    /// Withdraw up to `amount`, limited by what the item allows. Returns the
    /// amount actually removed.
    pub fn remove(&mut self, kind: &ResourceKind, amount: f64, activity: &str, reason: &str) -> f64 {
        let step = self.step;
        let taken = match self.item_mut(kind) {
            Some(item) => {
                let taken = amount.max(0.0).min(item.withdrawable());
                item.amount -= taken;
                taken
            }
            None => return 0.0,
        };
        if taken > 0.0 {
            self.record(step, kind, -taken, activity, reason);
        }
        taken
    }

    /// Take `amount` regardless of balance. Used for charges like interest.
    pub fn charge(&mut self, kind: &ResourceKind, amount: f64, activity: &str, reason: &str) -> bool {
        let step = self.step;
        match self.item_mut(kind) {
            Some(item) => {
                item.amount -= amount;
                self.record(step, kind, -amount, activity, reason);
                true
            }
            None => false,
        }
    }

    fn record(&mut self, step: u32, kind: &ResourceKind, delta: f64, activity: &str, reason: &str) {
        self.entries.push(LedgerEntry {
            step,
            kind: kind.clone(),
            delta,
            activity: activity.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Kinds in the finance group, in name order.
    pub fn finance_accounts(&self) -> Vec<ResourceKind> {
        self.groups
            .get(FINANCE_GROUP)
            .map(|items| {
                items
                    .keys()
                    .map(|name| ResourceKind::new(FINANCE_GROUP, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every item's amount keyed by `group.item`.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.groups
            .iter()
            .flat_map(|(group, items)| {
                items
                    .iter()
                    .map(move |(name, item)| (format!("{}.{}", group, name), item.amount))
            })
            .collect()
    }
}

impl ResourceRegistry for FarmResources {
    fn lookup(&self, kind: &ResourceKind) -> Lookup {
        if !self.has_group(kind.group()) {
            return Lookup::Untracked;
        }
        match self.item(kind) {
            Some(item) => Lookup::Tracked(item.withdrawable()),
            None => Lookup::Missing,
        }
    }

    fn check_transmutation(&self, requests: &mut [ResourceRequest]) {
        transmutation::check(self, requests);
    }

    fn perform_transmutation(&mut self, requests: &mut [ResourceRequest]) {
        transmutation::perform(self, requests);
    }

    fn debit(&mut self, request: &ResourceRequest, amount: f64) -> f64 {
        let reason = request.reason.as_deref().unwrap_or("Resource request");
        self.remove(&request.kind, amount, &request.activity_label, reason)
    }
}
