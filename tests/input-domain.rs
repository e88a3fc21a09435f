//! Literal and configuration validation happens before any constraint reaches a solver.

use wxcheck::constraint::ConstraintSet;
use wxcheck::solver::Probe;
use wxcheck::{
    direct, nested, AccessQuery, CheckError, InputDomainError, Literal, Model, ModelConfig,
    Paging, Scenario, SolverBackend, Verdict, VerdictKind,
};
use z3::{Config, Context};

#[derive(Default)]
struct Counting {
    calls: usize,
}

impl<'ctx> SolverBackend<'ctx> for Counting {
    fn check(&mut self, _: &ConstraintSet<'ctx>, _: &[Probe<'ctx>]) -> Verdict {
        self.calls += 1;
        Verdict::Unsatisfiable
    }
}

#[test]
fn misaligned_addresses_are_rejected() {
    let ctx = Context::new(&Config::new());
    let model = Model::direct(&ctx, ModelConfig::default()).unwrap();
    let err = direct::writable(&model, 0x1234_5001).unwrap_err();
    assert!(matches!(
        err,
        CheckError::InputDomain(InputDomainError::Misaligned {
            value: 0x1234_5001,
            page_size: 0x1000,
        })
    ));
    assert_eq!(
        err.to_string(),
        "address 0x12345001 is not aligned to a 0x1000-byte page"
    );
}

#[test]
fn out_of_range_addresses_are_rejected() {
    let ctx = Context::new(&Config::new());
    let model = Model::nested(&ctx, ModelConfig::default()).unwrap();
    let err = nested::writable_but_alias_read_only(&model, 0x1234_5000, 0x1_0000_0000)
        .unwrap_err();
    assert!(matches!(
        err,
        CheckError::InputDomain(InputDomainError::OutOfRange {
            value: 0x1_0000_0000,
            bits: 32,
        })
    ));
    assert_eq!(
        err.to_string(),
        "address 0x100000000 does not fit in a 32-bit address space"
    );
}

#[test]
fn range_is_checked_before_alignment() {
    let config = ModelConfig::default();
    assert!(matches!(
        Literal::new(0x1_0000_0001, &config),
        Err(CheckError::InputDomain(InputDomainError::OutOfRange {
            value: 0x1_0000_0001,
            bits: 32,
        }))
    ));
    assert_eq!(Literal::new(0xffff_f000, &config).unwrap().value(), 0xffff_f000);
}

#[test]
fn literals_reject_an_invalid_configuration() {
    for config in [
        ModelConfig::default().with_page_size(0),
        ModelConfig::default().with_address_bits(0),
    ] {
        assert!(
            matches!(Literal::new(0x1000, &config), Err(CheckError::Config { .. })),
            "{config:?}"
        );
    }
}

#[test]
fn alias_pairs_need_two_addresses() {
    let ctx = Context::new(&Config::new());
    let direct = Model::direct(&ctx, ModelConfig::default()).unwrap();
    let nested = Model::nested(&ctx, ModelConfig::default()).unwrap();
    let mut backend = Counting::default();

    let coincident = [
        Scenario::AliasMapping {
            flag: wxcheck::Flag::ReadOnly,
            va: 0x1000,
            alias: 0x1000,
            pa: 0x5000,
            synchronized: false,
        },
        Scenario::Access {
            paging: Paging::Direct,
            query: AccessQuery::WritableButAliasReadOnly,
            va: 0x1234_5000,
            alias: Some(0x1234_5000),
        },
        Scenario::Access {
            paging: Paging::Nested,
            query: AccessQuery::ExecutableButAliasNx,
            va: 0x1234_5000,
            alias: Some(0x1234_5000),
        },
        Scenario::NestedAliasMapping {
            va: 0x1234_5000,
            alias: 0x1234_5000,
        },
        Scenario::Stage2Alias {
            ipa: 0x4000_0000,
            alias: 0x4000_0000,
        },
    ];
    for scenario in coincident {
        let model = match scenario.paging() {
            Paging::Direct => &direct,
            Paging::Nested => &nested,
        };
        let err = scenario.run_with(model, &mut backend).unwrap_err();
        assert!(
            matches!(
                err,
                CheckError::InputDomain(InputDomainError::Coincident { .. })
            ),
            "{scenario}: {err:?}"
        );
    }
    assert_eq!(backend.calls, 0);

    let err = direct::alias_mapping(&direct, 0x1000, 0x1000, 0x5000, false).unwrap_err();
    assert_eq!(
        err.to_string(),
        "alias 0x1000 is the address it is meant to alias"
    );
}

#[test]
fn rejected_literals_never_reach_the_solver() {
    let ctx = Context::new(&Config::new());
    let model = Model::direct(&ctx, ModelConfig::default()).unwrap();
    let mut backend = Counting::default();

    let rejected = [
        Scenario::BasicMapping {
            paging: Paging::Direct,
            va: 0x800,
        },
        Scenario::Access {
            paging: Paging::Direct,
            query: AccessQuery::ExecutableButAliasNx,
            va: 0x1234_5000,
            alias: Some(0x2345_6008),
        },
        Scenario::AliasMapping {
            flag: wxcheck::Flag::NoExecute,
            va: 0x1000,
            alias: 0x2000,
            pa: 0x2_0000_0000,
            synchronized: true,
        },
    ];
    for scenario in rejected {
        assert!(scenario.run_with(&model, &mut backend).is_err(), "{scenario}");
    }
    assert_eq!(backend.calls, 0);

    let accepted = Scenario::Access {
        paging: Paging::Direct,
        query: AccessQuery::Writable,
        va: 0x1234_5000,
        alias: None,
    };
    accepted.run_with(&model, &mut backend).unwrap();
    assert_eq!(backend.calls, 1);
}

#[test]
fn invalid_configurations_are_rejected() {
    let ctx = Context::new(&Config::new());
    for config in [
        ModelConfig::default().with_address_bits(0),
        ModelConfig::default().with_address_bits(65),
        ModelConfig::default().with_page_size(0),
        ModelConfig::default().with_page_size(3000),
        ModelConfig::default()
            .with_address_bits(12)
            .with_page_size(0x1_0000),
    ] {
        assert!(
            matches!(config.validate(), Err(CheckError::Config { .. })),
            "{config:?}"
        );
        assert!(
            matches!(
                Model::new(&ctx, Paging::Direct, config),
                Err(CheckError::Config { .. })
            ),
            "{config:?}"
        );
    }
}

#[test]
fn page_size_is_configurable() {
    let ctx = Context::new(&Config::new());
    let config = ModelConfig::default().with_page_size(0x1_0000);
    let model = Model::direct(&ctx, config).unwrap();

    assert!(matches!(
        direct::basic_mapping(&model, 0x1234_5000),
        Err(CheckError::InputDomain(InputDomainError::Misaligned { .. }))
    ));
    assert_eq!(
        direct::basic_mapping(&model, 0x1234_0000).unwrap().kind(),
        VerdictKind::Sat
    );
}

#[test]
fn wide_address_spaces_accept_high_addresses() {
    let ctx = Context::new(&Config::new());
    let config = ModelConfig::default().with_address_bits(64);
    let model = Model::nested(&ctx, config).unwrap();
    assert_eq!(
        nested::writable_and_executable(&model, 0xffff_8000_0000_0000)
            .unwrap()
            .kind(),
        VerdictKind::Unsat
    );
}
