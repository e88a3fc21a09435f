use std::collections::HashSet;

use insta::assert_snapshot;
use wxcheck::{evaluate_parallel, run_suite, ModelConfig, Scenario, VerdictKind};

/// Panic with a unified diff when the verdicts drift from the expected table.
fn check_verdicts(expected: &str, actual: &str) {
    if expected != actual {
        let diff = similar::udiff::unified_diff(
            similar::Algorithm::Patience,
            expected,
            actual,
            3,
            Some(("expected", "actual")),
        );
        panic!("verdicts differ from the expected table:\n{diff}");
    }
}

#[test]
fn default_suite_gives_expected_verdicts() {
    let report = run_suite(&ModelConfig::default(), &Scenario::default_suite()).unwrap();
    check_verdicts(&report.expected_table(), &report.verdict_table());
    assert!(report.all_expected());
}

#[test]
fn parallel_evaluation_matches_sequential() {
    let suite = Scenario::default_suite();
    let sequential = run_suite(&ModelConfig::default(), &suite).unwrap();
    let parallel = evaluate_parallel(&ModelConfig::default(), &suite).unwrap();

    let scenarios: Vec<_> = parallel.entries.iter().map(|e| e.scenario).collect();
    assert_eq!(scenarios, suite);
    check_verdicts(&sequential.verdict_table(), &parallel.verdict_table());
}

#[test]
fn repeated_suites_agree() {
    let suite = Scenario::default_suite();
    let first = run_suite(&ModelConfig::default(), &suite).unwrap();
    let second = run_suite(&ModelConfig::default(), &suite).unwrap();
    check_verdicts(&first.verdict_table(), &second.verdict_table());
}

#[test]
fn suite_rejects_invalid_configuration() {
    let config = ModelConfig::default().with_page_size(0x3000);
    assert!(run_suite(&config, &Scenario::default_suite()).is_err());
    assert!(evaluate_parallel(&config, &Scenario::default_suite()).is_err());
}

#[test]
fn scenario_keys_are_unique() {
    let suite = Scenario::default_suite();
    let keys: HashSet<String> = suite.iter().map(Scenario::key).collect();
    assert_eq!(keys.len(), suite.len());
    assert!(keys.contains("direct-alias-mapping-ro-sync"));
    assert!(keys.contains("nested-writable-but-alias-read-only"));
    assert!(keys.contains("nested-stage2-alias"));
}

#[test]
fn only_plain_writes_and_executes_are_reachable() {
    let reachable: Vec<_> = Scenario::default_suite()
        .into_iter()
        .filter(|s| s.expected() == VerdictKind::Sat)
        .map(|s| s.key())
        .collect();
    assert_eq!(
        reachable,
        [
            "direct-basic-mapping",
            "direct-alias-mapping-ro",
            "direct-alias-mapping-nx",
            "direct-writable",
            "direct-executable",
            "nested-basic-mapping",
            "nested-alias-mapping",
            "nested-writable",
            "nested-executable",
        ]
    );
}

#[test]
fn expected_table() {
    let report = run_suite(&ModelConfig::default(), &Scenario::default_suite()).unwrap();
    assert_snapshot!(report.expected_table(), @r###"
    direct::basic_mapping(0x12345000) => sat
    direct::alias_mapping[ro](0x1000, 0x2000 -> 0x5000) => sat
    direct::alias_mapping[ro, synchronized](0x1000, 0x2000 -> 0x5000) => unsat
    direct::alias_mapping[nx](0x1000, 0x2000 -> 0x5000) => sat
    direct::alias_mapping[nx, synchronized](0x1000, 0x2000 -> 0x5000) => unsat
    direct::writable(0x12345000) => sat
    direct::executable(0x12345000) => sat
    direct::writable_and_executable(0x12345000) => unsat
    direct::writable_but_alias_read_only(0x12345000, 0x23456000) => unsat
    direct::executable_but_alias_nx(0x12345000, 0x23456000) => unsat
    nested::basic_mapping(0x12345000) => sat
    nested::alias_mapping(0x12345000, 0x23456000) => sat
    nested::writable(0x12345000) => sat
    nested::executable(0x12345000) => sat
    nested::writable_and_executable(0x12345000) => unsat
    nested::writable_but_alias_read_only(0x12345000, 0x23456000) => unsat
    nested::executable_but_alias_nx(0x12345000, 0x23456000) => unsat
    nested::stage2_alias(0x40000000, 0x40001000) => unsat
    "###);
}
