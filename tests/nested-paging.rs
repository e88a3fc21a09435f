//! Verdicts of the two-stage (VA to IPA to PA) scenarios.

use insta::assert_snapshot;
use wxcheck::{
    nested, AccessQuery, CheckError, Model, ModelConfig, Paging, Scenario, VerdictKind,
};
use z3::{Config, Context};

const VA: u64 = 0x1234_5000;
const ALIAS: u64 = 0x2345_6000;

fn with_nested<R>(f: impl FnOnce(&Model<'_>) -> R) -> R {
    let ctx = Context::new(&Config::new());
    let model = Model::nested(&ctx, ModelConfig::default()).unwrap();
    f(&model)
}

#[test]
fn basic_mapping_is_satisfiable() {
    with_nested(|model| {
        let eval = nested::basic_mapping(model, VA).unwrap();
        assert_eq!(eval.kind(), VerdictKind::Sat);
        let witness = eval.verdict.witness().unwrap();
        assert_eq!(witness.bits("va"), Some(VA));
        assert_eq!(witness.bits("ipa").unwrap() & 0xfff, 0);
        assert_eq!(witness.bits("pa").unwrap() & 0xfff, 0);
    });
}

#[test]
fn least_privilege_absorbs_diverging_aliases() {
    with_nested(|model| {
        let eval = nested::alias_mapping(model, VA, ALIAS).unwrap();
        assert_eq!(eval.kind(), VerdictKind::Sat);
        let witness = eval.verdict.witness().unwrap();
        assert_ne!(witness.bool("stage1_ro(va)"), witness.bool("stage1_ro(va1)"));
        // One alias declares read-only, so the frame must be read-only.
        assert_eq!(witness.bool("phys_ro(stage2(stage1(va)))"), Some(true));
    });
}

#[test]
fn wx_allows_write_or_execute_but_not_both() {
    with_nested(|model| {
        assert_eq!(nested::writable(model, VA).unwrap().kind(), VerdictKind::Sat);
        assert_eq!(nested::executable(model, VA).unwrap().kind(), VerdictKind::Sat);
        assert_eq!(
            nested::writable_and_executable(model, VA).unwrap().kind(),
            VerdictKind::Unsat
        );
    });
}

#[test]
fn writable_page_has_clear_stage2_read_only_bit() {
    with_nested(|model| {
        let eval = nested::writable(model, VA).unwrap();
        let witness = eval.verdict.witness().unwrap();
        assert_eq!(witness.bool("write"), Some(true));
        assert_eq!(witness.bool("stage2_ro(stage1(va))"), Some(false));
        assert_eq!(witness.bool("phys_ro(stage2(stage1(va)))"), Some(false));
        assert_eq!(witness.bool("phys_nx(stage2(stage1(va)))"), Some(true));
    });
}

#[test]
fn aliases_cannot_bypass_combined_permissions() {
    with_nested(|model| {
        assert_eq!(
            nested::writable_but_alias_read_only(model, VA, ALIAS)
                .unwrap()
                .kind(),
            VerdictKind::Unsat
        );
        assert_eq!(
            nested::executable_but_alias_nx(model, VA, ALIAS)
                .unwrap()
                .kind(),
            VerdictKind::Unsat
        );
    });
}

#[test]
fn stage2_never_aliases_distinct_ipas() {
    with_nested(|model| {
        let eval = nested::stage2_alias(model, 0x4000_0000, 0x4000_1000).unwrap();
        assert_eq!(eval.kind(), VerdictKind::Unsat);
    });
}

#[test]
fn nested_scenarios_reject_a_direct_model() {
    let ctx = Context::new(&Config::new());
    let direct = Model::direct(&ctx, ModelConfig::default()).unwrap();
    let err = nested::writable(&direct, VA).unwrap_err();
    assert!(
        matches!(err, CheckError::ModelConstruction { .. }),
        "unexpected error: {err:?}"
    );
}

#[test]
fn bypass_constraints() {
    with_nested(|model| {
        let scenario = Scenario::Access {
            paging: Paging::Nested,
            query: AccessQuery::WritableButAliasReadOnly,
            va: VA,
            alias: Some(ALIAS),
        };
        let bound = scenario.plan(model).unwrap();
        assert_snapshot!(bound.constraints().render(), @r###"
        nested::writable_but_alias_read_only:
          0. [mapping] stage1(va) == ipa
          1. [mapping] stage2(ipa) == pa
          2. [mapping] va & 0xfff == 0
          3. [mapping] ipa & 0xfff == 0
          4. [mapping] pa & 0xfff == 0
          5. [distinct] distinct(va, va1)
          6. [co_map] stage1(va) == ipa
          7. [co_map] stage1(va1) == ipa
          8. [align] va & 0xfff == 0
          9. [align] va1 & 0xfff == 0
          10. [no_alias] stage1(va) != stage1(va1) => stage2(stage1(va)) != stage2(stage1(va1))
          11. [least_privilege] phys_ro(stage2(stage1(va))) == stage1_ro(va) || stage1_ro(va1) || stage2_ro(stage1(va)) || stage2_ro(stage1(va1))
          12. [least_privilege] phys_nx(stage2(stage1(va))) == stage1_nx(va) || stage1_nx(va1) || stage2_nx(stage1(va)) || stage2_nx(stage1(va1))
          13. [wx] phys_ro(stage2(stage1(va))) != phys_nx(stage2(stage1(va)))
          14. [guard] write => stage2_ro(stage1(va)) == phys_ro(stage2(stage1(va))) && !stage2_ro(stage1(va))
          15. [guard] execute => stage2_nx(stage1(va)) == phys_nx(stage2(stage1(va))) && !stage2_nx(stage1(va))
          16. [query] stage1_ro(va1) != stage1_ro(va)
          17. [bind] va == 0x12345000
          18. [bind] va1 == 0x23456000
          19. [bind] write == true
          20. [bind] execute == false
        "###);
    });
}
