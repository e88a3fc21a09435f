//! Verdicts of the single-stage (VA to PA) scenarios.

use insta::assert_snapshot;
use wxcheck::{direct, AccessQuery, Model, ModelConfig, Paging, Scenario, VerdictKind};
use z3::{Config, Context};

const VA: u64 = 0x1234_5000;
const ALIAS: u64 = 0x2345_6000;

fn with_direct<R>(f: impl FnOnce(&Model<'_>) -> R) -> R {
    let ctx = Context::new(&Config::new());
    let model = Model::direct(&ctx, ModelConfig::default()).unwrap();
    f(&model)
}

#[test]
fn basic_mapping_is_satisfiable_for_aligned_addresses() {
    with_direct(|model| {
        for va in [0x0, 0x1000, VA, 0xffff_f000] {
            let eval = direct::basic_mapping(model, va).unwrap();
            assert_eq!(eval.kind(), VerdictKind::Sat, "basic_mapping({va:#x})");
        }
    });
}

#[test]
fn basic_mapping_witness_matches_frame_permissions() {
    with_direct(|model| {
        let eval = direct::basic_mapping(model, VA).unwrap();
        let witness = eval.verdict.witness().unwrap();
        assert_eq!(witness.bits("va"), Some(VA));
        assert_eq!(witness.bits("pa").unwrap() & 0xfff, 0);
        assert_eq!(witness.bool("stage1_ro(va)"), witness.bool("phys_ro(pa)"));
        assert_eq!(witness.bool("stage1_nx(va)"), witness.bool("phys_nx(pa)"));
    });
}

#[test]
fn aliases_may_disagree_without_synchronization() {
    with_direct(|model| {
        let ro = direct::alias_mapping(model, 0x1000, 0x2000, 0x5000, false).unwrap();
        assert_eq!(ro.kind(), VerdictKind::Sat);
        let witness = ro.verdict.witness().unwrap();
        assert_ne!(witness.bool("stage1_ro(va)"), witness.bool("stage1_ro(va1)"));

        let nx = direct::alias_mapping_nx(model, 0x1000, 0x2000, 0x5000, false).unwrap();
        assert_eq!(nx.kind(), VerdictKind::Sat);
    });
}

#[test]
fn synchronized_aliases_cannot_disagree() {
    with_direct(|model| {
        let ro = direct::alias_mapping(model, 0x1000, 0x2000, 0x5000, true).unwrap();
        assert_eq!(ro.kind(), VerdictKind::Unsat);
        let nx = direct::alias_mapping_nx(model, 0x1000, 0x2000, 0x5000, true).unwrap();
        assert_eq!(nx.kind(), VerdictKind::Unsat);
    });
}

#[test]
fn wx_allows_write_or_execute_but_not_both() {
    with_direct(|model| {
        assert_eq!(direct::writable(model, VA).unwrap().kind(), VerdictKind::Sat);
        assert_eq!(direct::executable(model, VA).unwrap().kind(), VerdictKind::Sat);
        assert_eq!(
            direct::writable_and_executable(model, VA).unwrap().kind(),
            VerdictKind::Unsat
        );
    });
}

#[test]
fn writable_page_is_a_data_frame() {
    with_direct(|model| {
        let eval = direct::writable(model, VA).unwrap();
        let witness = eval.verdict.witness().unwrap();
        assert_eq!(witness.bool("write"), Some(true));
        assert_eq!(witness.bool("execute"), Some(false));
        assert_eq!(witness.bool("stage1_ro(va)"), Some(false));
        assert_eq!(witness.bool("phys_ro(pa)"), Some(false));
        assert_eq!(witness.bool("phys_nx(pa)"), Some(true));
    });
}

#[test]
fn executable_page_is_a_code_frame() {
    with_direct(|model| {
        let eval = direct::executable(model, VA).unwrap();
        let witness = eval.verdict.witness().unwrap();
        assert_eq!(witness.bool("execute"), Some(true));
        assert_eq!(witness.bool("stage1_nx(va)"), Some(false));
        assert_eq!(witness.bool("phys_nx(pa)"), Some(false));
        assert_eq!(witness.bool("phys_ro(pa)"), Some(true));
    });
}

#[test]
fn aliases_cannot_bypass_synchronized_permissions() {
    with_direct(|model| {
        assert_eq!(
            direct::writable_but_alias_read_only(model, VA, ALIAS)
                .unwrap()
                .kind(),
            VerdictKind::Unsat
        );
        assert_eq!(
            direct::executable_but_alias_nx(model, VA, ALIAS)
                .unwrap()
                .kind(),
            VerdictKind::Unsat
        );
    });
}

#[test]
fn repeated_queries_on_fresh_contexts_agree() {
    let scenario = Scenario::Access {
        paging: Paging::Direct,
        query: AccessQuery::WritableAndExecutable,
        va: VA,
        alias: None,
    };
    let kinds: Vec<_> = (0..3)
        .map(|_| with_direct(|model| scenario.run(model).unwrap().kind()))
        .collect();
    assert_eq!(kinds, vec![VerdictKind::Unsat; 3]);
}

#[test]
fn writable_constraints() {
    with_direct(|model| {
        let scenario = Scenario::Access {
            paging: Paging::Direct,
            query: AccessQuery::Writable,
            va: VA,
            alias: None,
        };
        let bound = scenario.plan(model).unwrap();
        assert_snapshot!(bound.constraints().render(), @r###"
        direct::writable:
          0. [mapping] stage1(va) == pa
          1. [mapping] va & 0xfff == 0
          2. [mapping] pa & 0xfff == 0
          3. [wx] phys_ro(pa) != phys_nx(pa)
          4. [guard] write => stage1_ro(va) == phys_ro(pa) && !stage1_ro(va)
          5. [guard] execute => stage1_nx(va) == phys_nx(pa) && !stage1_nx(va)
          6. [bind] va == 0x12345000
          7. [bind] write == true
          8. [bind] execute == false
        "###);
    });
}

#[test]
fn synchronized_alias_constraints() {
    with_direct(|model| {
        let scenario = Scenario::AliasMapping {
            flag: wxcheck::Flag::ReadOnly,
            va: 0x1000,
            alias: 0x2000,
            pa: 0x5000,
            synchronized: true,
        };
        let bound = scenario.plan(model).unwrap();
        assert_snapshot!(bound.constraints().render(), @r###"
        direct::alias_mapping[ro, synchronized]:
          0. [mapping] stage1(va) == pa
          1. [mapping] va & 0xfff == 0
          2. [mapping] pa & 0xfff == 0
          3. [distinct] distinct(va, va1)
          4. [co_map] stage1(va) == pa
          5. [co_map] stage1(va1) == pa
          6. [align] va & 0xfff == 0
          7. [align] va1 & 0xfff == 0
          8. [sync] stage1_ro(va) == phys_ro(pa)
          9. [sync] stage1_nx(va) == phys_nx(pa)
          10. [sync] stage1_ro(va1) == phys_ro(pa)
          11. [sync] stage1_nx(va1) == phys_nx(pa)
          12. [query] stage1_ro(va) != stage1_ro(va1)
          13. [bind] va == 0x1000
          14. [bind] va1 == 0x2000
          15. [bind] pa == 0x5000
        "###);
    });
}
