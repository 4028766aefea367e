//! Integration tests for the allocation protocol.
//!
//! Exercises: ActivityNode → AllocationEngine::resolve → resolve_all
//! against a small in-memory ledger with one-step conversion rules.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wholefarm_logic::{
    resolve_all, Activity, ActivityNode, AllocationEngine, AllocationError, Lookup, Outcome,
    RequestError, ResourceKind, ResourceRegistry, ResourceRequest, ShortfallLog,
    TransmutationStatus,
};

// ── Test ledger ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct TestLedger {
    groups: BTreeSet<String>,
    amounts: BTreeMap<ResourceKind, f64>,
    /// target → (source, source units per target unit)
    rules: BTreeMap<ResourceKind, (ResourceKind, f64)>,
    /// Multiplies every debit; anything above 1.0 breaks the debit contract.
    debit_factor: f64,
}

impl TestLedger {
    fn new() -> Self {
        Self {
            debit_factor: 1.0,
            ..Default::default()
        }
    }

    fn with(mut self, kind: &ResourceKind, amount: f64) -> Self {
        self.groups.insert(kind.group().to_string());
        self.amounts.insert(kind.clone(), amount);
        self
    }

    fn with_rule(mut self, target: &ResourceKind, source: &ResourceKind, cost: f64) -> Self {
        self.rules.insert(target.clone(), (source.clone(), cost));
        self
    }

    fn amount(&self, kind: &ResourceKind) -> f64 {
        self.amounts.get(kind).copied().unwrap_or(0.0)
    }
}

impl ResourceRegistry for TestLedger {
    fn lookup(&self, kind: &ResourceKind) -> Lookup {
        if !self.groups.contains(kind.group()) {
            return Lookup::Untracked;
        }
        match self.amounts.get(kind) {
            Some(held) => Lookup::Tracked(*held),
            None => Lookup::Missing,
        }
    }

    fn check_transmutation(&self, requests: &mut [ResourceRequest]) {
        let mut reserved: BTreeMap<ResourceKind, f64> = BTreeMap::new();
        for req in requests.iter_mut() {
            req.transmutation = match self.rules.get(&req.kind) {
                Some((source, cost)) => {
                    let needed = req.shortfall() * cost;
                    let claimed = reserved.entry(source.clone()).or_insert(0.0);
                    if self.amount(source) - *claimed >= needed {
                        *claimed += needed;
                        TransmutationStatus::Possible
                    } else {
                        TransmutationStatus::NotPossible
                    }
                }
                None => TransmutationStatus::NotPossible,
            };
        }
    }

    fn perform_transmutation(&mut self, requests: &mut [ResourceRequest]) {
        for req in requests.iter().filter(|r| r.transmutation_usable()) {
            if let Some((source, cost)) = self.rules.get(&req.kind).cloned() {
                let deficit = req.shortfall();
                *self.amounts.entry(source).or_insert(0.0) -= deficit * cost;
                *self.amounts.entry(req.kind.clone()).or_insert(0.0) += deficit;
            }
        }
    }

    fn debit(&mut self, request: &ResourceRequest, amount: f64) -> f64 {
        let held = self.amounts.entry(request.kind.clone()).or_insert(0.0);
        let taken = amount.min(*held);
        *held -= taken;
        taken * self.debit_factor
    }
}

// ── Test activity ──────────────────────────────────────────────────────

#[derive(Clone)]
struct Demand {
    label: String,
    needs: Vec<(ResourceKind, f64, bool)>,
    performed: Rc<Cell<u32>>,
    last_seen: Rc<RefCell<Vec<ResourceRequest>>>,
}

impl Demand {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            needs: Vec::new(),
            performed: Rc::new(Cell::new(0)),
            last_seen: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn needs(mut self, kind: &ResourceKind, amount: f64, allow: bool) -> Self {
        self.needs.push((kind.clone(), amount, allow));
        self
    }

    fn node(&self, partial: bool) -> ActivityNode<TestLedger> {
        ActivityNode::new(self.label.clone(), Box::new(self.clone())).with_partial(partial)
    }
}

impl Activity<TestLedger> for Demand {
    fn determine_resources_needed(
        &mut self,
        _registry: &TestLedger,
    ) -> Result<Option<Vec<ResourceRequest>>, RequestError> {
        if self.needs.is_empty() {
            return Ok(None);
        }
        self.needs
            .iter()
            .map(|(kind, amount, allow)| {
                ResourceRequest::new(self.label.clone(), kind.clone(), *amount)
                    .map(|r| r.with_transmutation(*allow))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn perform_activity(&mut self, requests: &[ResourceRequest], _registry: &mut TestLedger) {
        self.performed.set(self.performed.get() + 1);
        *self.last_seen.borrow_mut() = requests.to_vec();
    }
}

fn kind(raw: &str) -> ResourceKind {
    ResourceKind::parse(raw).unwrap()
}

fn folder(label: &str) -> ActivityNode<TestLedger> {
    Demand::new(label).node(false)
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[test]
fn untracked_resource_is_unlimited() {
    let water = kind("Water.Bore");
    let mut ledger = TestLedger::new();
    let demand = Demand::new("Irrigate").needs(&water, 100.0, false);
    let mut node = demand.node(false);
    let log = ShortfallLog::new();
    log.attach(node.shortfall_notifier());

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert_eq!(res.outcome, Outcome::Performed);
    assert_eq!(node.requests()[0].available, 100.0);
    assert_eq!(node.requests()[0].provided, 100.0);
    assert!(log.is_empty());
    assert_eq!(demand.performed.get(), 1);
}

#[test]
fn tracked_but_missing_item_is_zero() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let other = kind("AnimalFoodStore.Hay");
    let mut ledger = TestLedger::new().with(&other, 50.0);
    let demand = Demand::new("Feed").needs(&feed, 10.0, false);
    let mut node = demand.node(false);

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert_eq!(res.outcome, Outcome::Skipped);
    assert_eq!(node.requests()[0].available, 0.0);
}

#[test]
fn capped_shortfall_strict_mode_skips() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let mut ledger = TestLedger::new().with(&feed, 5.0);
    let demand = Demand::new("Feed").needs(&feed, 10.0, false);
    let mut node = demand.node(false);
    let log = ShortfallLog::new();
    log.attach(node.shortfall_notifier());

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert_eq!(res.outcome, Outcome::Skipped);
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].deficit, 5.0);
    assert_eq!(node.requests()[0].available, 5.0);
    assert_eq!(node.requests()[0].provided, 0.0);
    assert_eq!(demand.performed.get(), 0);
    assert_eq!(ledger.amount(&feed), 5.0, "nothing removed when gated");
}

#[test]
fn capped_shortfall_partial_mode_takes_what_is_there() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let mut ledger = TestLedger::new().with(&feed, 5.0);
    let demand = Demand::new("Feed").needs(&feed, 10.0, false);
    let mut node = demand.node(true);
    let log = ShortfallLog::new();
    log.attach(node.shortfall_notifier());

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert_eq!(res.outcome, Outcome::Performed);
    assert_eq!(log.len(), 1);
    assert_eq!(node.requests()[0].provided, 5.0);
    assert_eq!(ledger.amount(&feed), 0.0);
    assert_eq!(demand.last_seen.borrow()[0].provided, 5.0);
}

#[test]
fn partial_mode_transmutation_with_residual_deficit() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let cash = kind("Finance.Bank");
    let labour = kind("Labour.Hired");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&cash, 100.0)
        .with(&labour, 0.0)
        .with_rule(&feed, &cash, 2.0);
    let demand = Demand::new("Feed")
        .needs(&feed, 10.0, true)
        .needs(&labour, 4.0, true);
    let mut node = demand.node(true);
    let log = ShortfallLog::new();
    log.attach(node.shortfall_notifier());

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(res.transmuted);
    assert_eq!(res.outcome, Outcome::Performed);
    assert_eq!(ledger.amount(&cash), 90.0, "5 units bought at 2 each");
    assert_eq!(node.requests()[0].available, 10.0);
    assert_eq!(node.requests()[0].provided, 10.0);
    assert_eq!(ledger.amount(&feed), 0.0);
    let labour_req = &node.requests()[1];
    assert_eq!(labour_req.transmutation, TransmutationStatus::NotPossible);
    // The recheck reports labour as fully available, so no event fires even
    // though nothing could be debited.
    assert_eq!(labour_req.available, 4.0);
    assert_eq!(labour_req.provided, 0.0);
    assert!(log.is_empty());
    assert_eq!(demand.performed.get(), 1);
}

#[test]
fn strict_mode_full_transmutation_covers_shortfall() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let cash = kind("Finance.Bank");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&cash, 100.0)
        .with_rule(&feed, &cash, 1.0);
    let demand = Demand::new("Feed").needs(&feed, 10.0, true);
    let mut node = demand.node(false);

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(res.transmuted);
    assert_eq!(res.outcome, Outcome::Performed);
    assert_eq!(res.shortfalls, 0);
    assert_eq!(ledger.amount(&cash), 95.0);
    assert_eq!(ledger.amount(&feed), 0.0);
}

#[test]
fn fully_convertible_with_partial_does_not_transmute() {
    // Both arms of the transmutation gate hold, so the XOR rejects it.
    let feed = kind("AnimalFoodStore.Lucerne");
    let cash = kind("Finance.Bank");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&cash, 100.0)
        .with_rule(&feed, &cash, 1.0);
    let demand = Demand::new("Feed").needs(&feed, 10.0, true);
    let mut node = demand.node(true);

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(!res.transmuted);
    assert_eq!(res.outcome, Outcome::Performed);
    assert_eq!(res.shortfalls, 1);
    assert_eq!(ledger.amount(&cash), 100.0);
    assert_eq!(node.requests()[0].provided, 5.0);
}

#[test]
fn transmutation_not_allowed_is_not_used() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let cash = kind("Finance.Bank");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&cash, 100.0)
        .with_rule(&feed, &cash, 1.0);
    let demand = Demand::new("Feed").needs(&feed, 10.0, false);
    let mut node = demand.node(false);

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(!res.transmuted);
    assert_eq!(node.requests()[0].transmutation, TransmutationStatus::Possible);
    assert_eq!(res.outcome, Outcome::Skipped);
    assert_eq!(ledger.amount(&cash), 100.0);
}

#[test]
fn recheck_after_transmutation_uses_max_of_held_and_required() {
    // Pins the post-transmutation recheck: every request's `available` becomes
    // max(held, required), so a well-stocked kind reports more than required.
    let feed = kind("AnimalFoodStore.Lucerne");
    let cash = kind("Finance.Bank");
    let hay = kind("AnimalFoodStore.Hay");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&hay, 50.0)
        .with(&cash, 100.0)
        .with_rule(&feed, &cash, 1.0);
    let demand = Demand::new("Feed")
        .needs(&feed, 10.0, true)
        .needs(&hay, 10.0, false);
    let mut node = demand.node(false);

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(res.transmuted);
    let hay_req = &node.requests()[1];
    assert_eq!(hay_req.available, 50.0);
    assert!(hay_req.available > hay_req.required);
    assert_eq!(hay_req.provided, 10.0);
    assert_eq!(ledger.amount(&hay), 40.0);
}

#[test]
fn recheck_after_transmutation_drops_untracked_to_zero() {
    let feed = kind("AnimalFoodStore.Hay");
    let cash = kind("Finance.Bank");
    let water = kind("Water.Bore");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&cash, 100.0)
        .with_rule(&feed, &cash, 1.0);
    let demand = Demand::new("Feed")
        .needs(&feed, 10.0, true)
        .needs(&water, 100.0, false);
    let mut node = demand.node(false);
    let log = ShortfallLog::new();
    log.attach(node.shortfall_notifier());

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(res.transmuted);
    assert_eq!(res.outcome, Outcome::Skipped);
    assert_eq!(node.requests()[1].available, 0.0);
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), &water);
    assert_eq!(events[0].deficit, 100.0);
    assert_eq!(ledger.amount(&feed), 10.0, "bought but not consumed");
    assert_eq!(demand.performed.get(), 0);
}

#[test]
fn recheck_after_transmutation_drops_missing_item_to_zero() {
    let feed = kind("AnimalFoodStore.Hay");
    let lucerne = kind("AnimalFoodStore.Lucerne");
    let cash = kind("Finance.Bank");
    let mut ledger = TestLedger::new()
        .with(&feed, 5.0)
        .with(&cash, 100.0)
        .with_rule(&feed, &cash, 1.0);
    let demand = Demand::new("Feed")
        .needs(&feed, 10.0, true)
        .needs(&lucerne, 5.0, true);
    let mut node = demand.node(true);
    let log = ShortfallLog::new();
    log.attach(node.shortfall_notifier());

    let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();

    assert!(res.transmuted);
    assert_eq!(res.outcome, Outcome::Performed);
    let lucerne_req = &node.requests()[1];
    assert_eq!(lucerne_req.available, 0.0);
    assert_eq!(lucerne_req.provided, 0.0);
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), &lucerne);
    assert_eq!(events[0].deficit, 5.0);
    assert_eq!(node.requests()[0].provided, 10.0);
}

#[test]
fn no_requests_means_not_gated() {
    let mut ledger = TestLedger::new();
    let demand = Demand::new("Folder");
    let mut node = demand.node(false);
    let mut engine = AllocationEngine::new();

    let res = engine.resolve(&mut node, &mut ledger).unwrap();

    assert_eq!(res.outcome, Outcome::NoDemand);
    assert_eq!(res.pass_id, None);
    assert_eq!(engine.passes(), 0);
    assert_eq!(demand.performed.get(), 0);
}

#[test]
fn pass_ids_are_distinct_and_shared_within_a_pass() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let hay = kind("AnimalFoodStore.Hay");
    let mut ledger = TestLedger::new().with(&feed, 100.0).with(&hay, 100.0);
    let demand = Demand::new("Feed").needs(&feed, 1.0, false).needs(&hay, 1.0, false);
    let mut node = demand.node(false);
    let mut engine = AllocationEngine::new();

    let first = engine.resolve(&mut node, &mut ledger).unwrap();
    let second = engine.resolve(&mut node, &mut ledger).unwrap();

    assert_ne!(first.pass_id, second.pass_id);
    assert!(node.requests().iter().all(|r| r.pass_id == second.pass_id));
}

#[test]
fn ordering_first_sibling_wins() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let mut ledger = TestLedger::new().with(&feed, 15.0);
    let a = Demand::new("A").needs(&feed, 10.0, false);
    let b = Demand::new("B").needs(&feed, 10.0, false);
    let mut root = folder("Activities").with_child(a.node(false)).with_child(b.node(false));
    let log = ShortfallLog::new();
    log.attach(root.find_mut("B").unwrap().shortfall_notifier());

    let report = resolve_all(&mut AllocationEngine::new(), &mut root, &mut ledger).unwrap();

    let ra = report.get("A").unwrap();
    let rb = report.get("B").unwrap();
    assert_eq!(ra.requests[0].available, 10.0);
    assert_eq!(ra.requests[0].provided, 10.0);
    assert_eq!(rb.requests[0].available, 5.0);
    assert_eq!(rb.outcome, Outcome::Skipped);
    assert_eq!(log.len(), 1);
    assert_eq!(log.events()[0].deficit, 5.0);
}

#[test]
fn pre_order_with_dynamic_children_first() {
    let mut ledger = TestLedger::new();
    let mut root = folder("Root");
    let mut herd = folder("Herd");
    herd.add_child(folder("Breed"));
    herd.add_dynamic_child(folder("Calves"));
    root.add_child(herd);
    root.add_inert_child("Notes");
    root.add_child(folder("Sell"));
    root.add_dynamic_child(folder("Spawned"));

    let report = resolve_all(&mut AllocationEngine::new(), &mut root, &mut ledger).unwrap();

    assert_eq!(
        report.visit_order(),
        vec!["Root", "Spawned", "Herd", "Calves", "Breed", "Sell"]
    );
    assert_eq!(root.activity_count(), 6);
}

#[test]
fn conflicting_duplicate_aborts_traversal() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let mut ledger = TestLedger::new().with(&feed, 15.0);
    let bad = Demand::new("Bad")
        .needs(&feed, 1.0, true)
        .needs(&feed, 1.0, false);
    let later = Demand::new("Later").needs(&feed, 1.0, false);
    let mut root = folder("Root").with_child(bad.node(false)).with_child(later.node(false));

    let err = resolve_all(&mut AllocationEngine::new(), &mut root, &mut ledger).unwrap_err();

    assert!(matches!(
        err,
        AllocationError::Request(RequestError::ConflictingDuplicate { .. })
    ));
    assert_eq!(ledger.amount(&feed), 15.0);
    assert_eq!(later.performed.get(), 0);
}

#[test]
fn negative_request_is_rejected() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let mut ledger = TestLedger::new().with(&feed, 15.0);
    let bad = Demand::new("Bad").needs(&feed, -3.0, false);
    let mut node = bad.node(false);

    let err = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap_err();

    assert!(matches!(
        err,
        AllocationError::Request(RequestError::InvalidAmount { .. })
    ));
}

#[test]
fn over_debit_is_a_ledger_fault() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let mut ledger = TestLedger::new().with(&feed, 15.0);
    ledger.debit_factor = 2.0;
    let demand = Demand::new("Feed").needs(&feed, 5.0, false);
    let mut node = demand.node(false);

    let err = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap_err();

    assert!(matches!(err, AllocationError::LedgerInconsistent { .. }));
    assert_eq!(demand.performed.get(), 0);
}

#[test]
fn subscriber_presence_does_not_change_outcome() {
    let feed = kind("AnimalFoodStore.Lucerne");
    let run = |subscribe: bool| {
        let mut ledger = TestLedger::new().with(&feed, 5.0);
        let demand = Demand::new("Feed").needs(&feed, 10.0, false);
        let mut node = demand.node(true);
        if subscribe {
            node.shortfall_notifier().subscribe(|_| panic!("noisy observer"));
        }
        let res = AllocationEngine::new().resolve(&mut node, &mut ledger).unwrap();
        (res, ledger.amount(&feed))
    };
    let (quiet, quiet_left) = run(false);
    let (noisy, noisy_left) = run(true);
    assert_eq!(quiet, noisy);
    assert_eq!(quiet_left, noisy_left);
}

// ── Properties over random trees ───────────────────────────────────────

const KINDS: [&str; 4] = [
    "AnimalFoodStore.Lucerne",
    "AnimalFoodStore.Hay",
    "Labour.Family",
    "Water.Bore",
];

fn random_farm(seed: u64) -> (TestLedger, ActivityNode<TestLedger>, Vec<Demand>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ledger = TestLedger::new();
    for raw in &KINDS[..3] {
        ledger = ledger.with(&kind(raw), rng.gen_range(0.0..60.0));
    }
    let mut demands = Vec::new();
    let mut root = folder("Root");
    for i in 0..rng.gen_range(2..6) {
        let mut group = folder(&format!("Group{i}"));
        for j in 0..rng.gen_range(1..5) {
            let mut d = Demand::new(&format!("Act{i}.{j}"));
            for raw in KINDS.iter() {
                if rng.gen_bool(0.5) {
                    d = d.needs(&kind(raw), rng.gen_range(0.0..25.0), false);
                }
            }
            let node = d.node(rng.gen_bool(0.5));
            if rng.gen_bool(0.3) {
                group.add_dynamic_child(node);
            } else {
                group.add_child(node);
            }
            demands.push(d);
        }
        root.add_child(group);
    }
    (ledger, root, demands)
}

#[test]
fn conservation_over_random_trees() {
    for seed in 0..50 {
        let (mut ledger, mut root, _) = random_farm(seed);
        let start = ledger.clone();
        let report = resolve_all(&mut AllocationEngine::new(), &mut root, &mut ledger).unwrap();
        for raw in &KINDS[..3] {
            let k = kind(raw);
            let provided = report.provided_for(&k);
            assert!(
                provided <= start.amount(&k) + 1e-9,
                "seed {seed}: {k} provided {provided} > start {}",
                start.amount(&k)
            );
            assert!((start.amount(&k) - provided - ledger.amount(&k)).abs() < 1e-9);
        }
        for res in &report.resolutions {
            for req in &res.requests {
                assert!(req.provided <= req.available + 1e-9);
            }
        }
    }
}

#[test]
fn gate_consistency_over_random_trees() {
    for seed in 0..50 {
        let (mut ledger, mut root, demands) = random_farm(seed);
        let report = resolve_all(&mut AllocationEngine::new(), &mut root, &mut ledger).unwrap();
        for d in &demands {
            let res = report.get(&d.label).unwrap();
            let node = root.find(&d.label).unwrap();
            let unmet = res.requests.iter().any(|r| r.is_unmet());
            let expected = match res.outcome {
                Outcome::NoDemand => 0,
                _ if !unmet || node.perform_with_partial => 1,
                _ => 0,
            };
            assert_eq!(d.performed.get(), expected, "seed {seed}: {}", d.label);
        }
    }
}

#[test]
fn determinism_over_random_trees() {
    for seed in 0..20 {
        let run = || {
            let (mut ledger, mut root, _) = random_farm(seed);
            let log = ShortfallLog::new();
            for d in 0..8 {
                for j in 0..5 {
                    if let Some(node) = root.find_mut(&format!("Act{d}.{j}")) {
                        log.attach(node.shortfall_notifier());
                    }
                }
            }
            let report =
                resolve_all(&mut AllocationEngine::new(), &mut root, &mut ledger).unwrap();
            (report, log.events())
        };
        let (r1, e1) = run();
        let (r2, e2) = run();
        assert_eq!(r1, r2, "seed {seed}");
        assert_eq!(e1, e2, "seed {seed}");
    }
}
