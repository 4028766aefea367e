//! WholeFarm Headless Simulation Harness
//!
//! Validates the allocation protocol and the demo farm without any UI.
//! Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p wholefarm-simtest
//!   cargo run -p wholefarm-simtest -- --verbose
//!   cargo run -p wholefarm-simtest -- --json --months 24

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use wholefarm_core::activities::{ActivityFolder, Demand, EnterpriseActivity};
use wholefarm_core::prelude::*;
use wholefarm_core::transmutation::TransmutationRule;
use wholefarm_logic::{
    resolve_all, ActivityNode, AllocationEngine, Outcome, ResourceKind, ShortfallLog,
};

// ── Demo farm (same JSON the core tests use) ───────────────────────────
const DEMO_JSON: &str = include_str!("../../../data/demo_farm.json");

// ── Test harness ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    months: u32,
    results: &'a [TestResult],
    balances: BTreeMap<String, f64>,
}

struct Options {
    verbose: bool,
    json: bool,
    months: u32,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let months = args
        .iter()
        .position(|a| a == "--months")
        .and_then(|i| args.get(i + 1))
        .and_then(|m| m.parse().ok())
        .unwrap_or(12);
    Options {
        verbose: args.iter().any(|a| a == "--verbose"),
        json: args.iter().any(|a| a == "--json"),
        months,
    }
}

fn main() {
    let opts = parse_args();
    if !opts.json {
        println!("=== WholeFarm Simulation Harness ===\n");
    }

    let mut results = Vec::new();

    // 1. Scenario configuration
    let config = match FarmConfig::from_json(DEMO_JSON) {
        Ok(c) => {
            results.push(TestResult::new(
                "config_parse",
                true,
                format!("{} resource groups", c.resources.len()),
            ));
            Some(c)
        }
        Err(e) => {
            results.push(TestResult::new("config_parse", false, e.to_string()));
            None
        }
    };

    // 2. Protocol scenarios
    results.extend(validate_protocol_scenarios(opts.verbose && !opts.json));

    // 3. Random tree sweep
    results.extend(validate_random_sweep(opts.verbose && !opts.json));

    // 4. Demo farm run
    let mut balances = BTreeMap::new();
    if let Some(config) = &config {
        let (demo_results, final_balances) =
            validate_demo_farm(config, opts.months, opts.verbose && !opts.json);
        results.extend(demo_results);
        balances = final_balances;
    }

    // ── Summary ──
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    if opts.json {
        let summary = Summary {
            months: opts.months,
            results: &results,
            balances,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("could not serialize summary: {}", e),
        }
    } else {
        println!();
        for r in &results {
            let icon = if r.passed { "✓" } else { "✗" };
            if !r.passed || opts.verbose {
                println!("  {} {}: {}", icon, r.name, r.detail);
            }
        }
        println!(
            "\n=== RESULT: {}/{} passed, {} failed ===",
            passed,
            results.len(),
            failed
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn kind(group: &str, item: &str) -> ResourceKind {
    ResourceKind::new(group, item)
}

fn enterprise(
    name: &str,
    demands: &[(ResourceKind, f64, bool)],
    partial: bool,
) -> ActivityNode<FarmResources> {
    let demands = demands
        .iter()
        .map(|(resource, amount, allow)| Demand {
            resource: resource.clone(),
            amount: *amount,
            allow_transmutation: *allow,
            reason: None,
        })
        .collect();
    ActivityNode::new(
        name,
        Box::new(EnterpriseActivity::new(name, demands, Vec::new())),
    )
    .with_partial(partial)
}

// ── 2. Protocol scenarios ───────────────────────────────────────────────

fn validate_protocol_scenarios(verbose: bool) -> Vec<TestResult> {
    if verbose {
        println!("--- Protocol scenarios ---");
    }
    let mut results = Vec::new();
    let hay = kind("AnimalFoodStore", "Hay");
    let bank = kind("Finance", "Bank");
    let hired = kind("Labour", "Hired");
    let water = kind("Water", "Bore");

    // Untracked resource
    {
        let mut res = FarmResources::new();
        let mut node = enterprise("Irrigate", &[(water.clone(), 100.0, false)], false);
        let log = ShortfallLog::new();
        log.attach(node.shortfall_notifier());
        let outcome = AllocationEngine::new().resolve(&mut node, &mut res);
        let ok = match &outcome {
            Ok(r) => {
                r.outcome == Outcome::Performed
                    && r.requests[0].available == 100.0
                    && r.requests[0].provided == 100.0
                    && log.is_empty()
            }
            Err(_) => false,
        };
        results.push(TestResult::new(
            "untracked_unlimited",
            ok,
            "100 units of an untracked kind granted in full",
        ));
    }

    // Capped shortfall, strict
    {
        let mut res = FarmResources::new();
        res.insert(&hay, ResourceItem::with_amount(5.0));
        let mut node = enterprise("Feed", &[(hay.clone(), 10.0, false)], false);
        let log = ShortfallLog::new();
        log.attach(node.shortfall_notifier());
        let outcome = AllocationEngine::new().resolve(&mut node, &mut res);
        let events = log.events();
        let ok = matches!(&outcome, Ok(r) if r.outcome == Outcome::Skipped)
            && events.len() == 1
            && events[0].deficit == 5.0
            && res.amount(&hay) == Some(5.0);
        results.push(TestResult::new(
            "strict_shortfall_skips",
            ok,
            format!("{} shortfall event(s), hay left {:?}", events.len(), res.amount(&hay)),
        ));
    }

    // Partial mode with transmutation
    {
        let mut res = FarmResources::new();
        res.insert(&bank, ResourceItem::with_amount(100.0));
        res.insert(
            &hay,
            ResourceItem {
                amount: 5.0,
                transmutations: vec![TransmutationRule {
                    source: bank.clone(),
                    cost_per_unit: 2.0,
                }],
                ..Default::default()
            },
        );
        res.insert(&hired, ResourceItem::with_amount(0.0));
        let mut node = enterprise(
            "Feed",
            &[(hay.clone(), 10.0, true), (hired.clone(), 4.0, true)],
            true,
        );
        let outcome = AllocationEngine::new().resolve(&mut node, &mut res);
        let ok = matches!(&outcome, Ok(r) if r.transmuted && r.outcome == Outcome::Performed)
            && res.amount(&bank) == Some(90.0);
        results.push(TestResult::new(
            "partial_transmutation",
            ok,
            format!("bank after purchase {:?}", res.amount(&bank)),
        ));
    }

    // Ordering
    {
        let mut res = FarmResources::new();
        res.insert(&hay, ResourceItem::with_amount(15.0));
        let mut root = ActivityNode::new("Farm", Box::new(ActivityFolder))
            .with_child(enterprise("A", &[(hay.clone(), 10.0, false)], false))
            .with_child(enterprise("B", &[(hay.clone(), 10.0, false)], false));
        let log = ShortfallLog::new();
        root.for_each_node_mut(&mut |n| {
            log.attach(n.shortfall_notifier());
        });
        let ok = match resolve_all(&mut AllocationEngine::new(), &mut root, &mut res) {
            Ok(report) => {
                let a = report.get("A").map(|r| r.requests[0].available);
                let b = report.get("B").map(|r| r.requests[0].available);
                a == Some(10.0) && b == Some(5.0) && log.len() == 1
            }
            Err(_) => false,
        };
        results.push(TestResult::new(
            "first_come_first_served",
            ok,
            "A takes 10 of 15, B sees 5",
        ));
    }

    results
}

// ── 3. Random sweep ─────────────────────────────────────────────────────

fn random_farm(seed: u64) -> (FarmResources, ActivityNode<FarmResources>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let stores = ["Hay", "Lucerne", "Grain"];
    let mut res = FarmResources::new();
    for store in stores {
        res.insert(
            &kind("AnimalFoodStore", store),
            ResourceItem::with_amount(rng.gen_range(0.0..80.0)),
        );
    }
    let mut root = ActivityNode::new("Farm", Box::new(ActivityFolder));
    for i in 0..rng.gen_range(3..10) {
        let mut demands = Vec::new();
        for store in stores {
            if rng.gen_bool(0.6) {
                demands.push((kind("AnimalFoodStore", store), rng.gen_range(0.0..30.0), false));
            }
        }
        let node = enterprise(&format!("Paddock{i}"), &demands, rng.gen_bool(0.5));
        if rng.gen_bool(0.25) {
            root.add_dynamic_child(node);
        } else {
            root.add_child(node);
        }
    }
    (res, root)
}

fn validate_random_sweep(verbose: bool) -> Vec<TestResult> {
    if verbose {
        println!("--- Random sweep ---");
    }
    let mut violations = Vec::new();
    let mut nondeterministic = Vec::new();
    let seeds = 0..200u64;

    for seed in seeds.clone() {
        let run = || {
            let (mut res, mut root) = random_farm(seed);
            let start = res.snapshot();
            let report = resolve_all(&mut AllocationEngine::new(), &mut root, &mut res);
            (start, report, res.snapshot())
        };
        let (start, first, end) = run();
        let (_, second, _) = run();
        let Ok(report) = first else {
            violations.push(format!("seed {seed}: resolution error"));
            continue;
        };
        if second.as_ref().ok() != Some(&report) {
            nondeterministic.push(seed);
        }
        for (name, before) in &start {
            let Ok(k) = ResourceKind::parse(name) else {
                continue;
            };
            let provided = report.provided_for(&k);
            let after = end.get(name).copied().unwrap_or(0.0);
            if provided > before + 1e-9 || (before - provided - after).abs() > 1e-9 {
                violations.push(format!("seed {seed}: {name} provided {provided:.3} of {before:.3}"));
            }
        }
    }

    let count = seeds.end - seeds.start;
    vec![
        TestResult::new(
            "sweep_conservation",
            violations.is_empty(),
            if violations.is_empty() {
                format!("{} random farms conserve every store", count)
            } else {
                violations.join("; ")
            },
        ),
        TestResult::new(
            "sweep_determinism",
            nondeterministic.is_empty(),
            format!("{} nondeterministic seed(s) of {}", nondeterministic.len(), count),
        ),
    ]
}

// ── 4. Demo farm ────────────────────────────────────────────────────────

fn validate_demo_farm(
    config: &FarmConfig,
    months: u32,
    verbose: bool,
) -> (Vec<TestResult>, BTreeMap<String, f64>) {
    if verbose {
        println!("--- Demo farm ({} months) ---", months);
    }
    let mut results = Vec::new();
    let mut sim = match FarmSimulation::new(config) {
        Ok(s) => s,
        Err(e) => {
            results.push(TestResult::new("demo_build", false, e.to_string()));
            return (results, BTreeMap::new());
        }
    };

    if let Err(e) = sim.run(months) {
        results.push(TestResult::new("demo_run", false, e.to_string()));
        return (results, sim.resources.snapshot());
    }
    results.push(TestResult::new(
        "demo_run",
        true,
        format!("{} months simulated", sim.history().len()),
    ));

    if verbose {
        for step in sim.history() {
            println!(
                "  month {:>2}: {} performed, {} skipped, {} shortfall(s)",
                step.month,
                step.traversal.performed().count(),
                step.traversal.skipped().count(),
                step.shortfalls.len()
            );
        }
    }

    // Gate consistency over the whole run
    let mut gate_errors = 0;
    for step in sim.history() {
        for res in &step.traversal.resolutions {
            let unmet = res.requests.iter().any(|r| r.is_unmet());
            let partial = sim
                .root()
                .find(&res.activity_label)
                .map(|n| n.perform_with_partial)
                .unwrap_or(false);
            let expected = match res.outcome {
                Outcome::NoDemand => true,
                Outcome::Performed => !unmet || partial,
                Outcome::Skipped => unmet && !partial,
            };
            if !expected {
                gate_errors += 1;
            }
        }
    }
    results.push(TestResult::new(
        "demo_gate_consistency",
        gate_errors == 0,
        format!("{} gate inconsistencies", gate_errors),
    ));

    // Events match unmet requests
    let mismatched = sim
        .history()
        .iter()
        .filter(|s| s.shortfalls.len() != s.traversal.shortfall_count())
        .count();
    results.push(TestResult::new(
        "demo_shortfall_events",
        mismatched == 0,
        format!("{} month(s) with event/shortfall mismatch", mismatched),
    ));

    // provided never exceeds available
    let over = sim
        .history()
        .iter()
        .flat_map(|s| s.traversal.resolutions.iter())
        .flat_map(|r| r.requests.iter())
        .filter(|r| r.provided > r.available + 1e-9)
        .count();
    results.push(TestResult::new(
        "demo_provided_within_available",
        over == 0,
        format!("{} request(s) over-provided", over),
    ));

    (results, sim.resources.snapshot())
}
