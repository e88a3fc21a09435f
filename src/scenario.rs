//! The scenario table: every named question the checker knows how to ask, with the verdict a
//! correctly composed model must give.

use std::fmt;

use crate::evaluator::{Bound, Evaluation};
use crate::invariant::AccessQuery;
use crate::model::{Model, Paging};
use crate::permission::Flag;
use crate::solver::{SolverBackend, VerdictKind};
use crate::{direct, nested, CheckError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    BasicMapping {
        paging: Paging,
        va: u64,
    },
    /// Direct paging: two VAs alias one frame while declaring a different `flag`.
    AliasMapping {
        flag: Flag,
        va: u64,
        alias: u64,
        pa: u64,
        synchronized: bool,
    },
    /// Nested paging: two VAs alias one IPA while declaring a different stage-1 RO bit.
    NestedAliasMapping {
        va: u64,
        alias: u64,
    },
    Access {
        paging: Paging,
        query: AccessQuery,
        va: u64,
        alias: Option<u64>,
    },
    Stage2Alias {
        ipa: u64,
        alias: u64,
    },
}

impl Scenario {
    pub fn paging(&self) -> Paging {
        match self {
            Scenario::BasicMapping { paging, .. } | Scenario::Access { paging, .. } => *paging,
            Scenario::AliasMapping { .. } => Paging::Direct,
            Scenario::NestedAliasMapping { .. } | Scenario::Stage2Alias { .. } => Paging::Nested,
        }
    }

    /// Short stable identifier, e.g. `nested-writable-but-alias-read-only`.
    pub fn key(&self) -> String {
        let name = match self {
            Scenario::BasicMapping { .. } => "basic-mapping".to_string(),
            Scenario::AliasMapping {
                flag, synchronized, ..
            } => format!(
                "alias-mapping-{flag}{}",
                if *synchronized { "-sync" } else { "" }
            ),
            Scenario::NestedAliasMapping { .. } => "alias-mapping".to_string(),
            Scenario::Access { query, .. } => query.name().replace('_', "-"),
            Scenario::Stage2Alias { .. } => "stage2-alias".to_string(),
        };
        format!("{}-{name}", self.paging())
    }

    pub fn expected(&self) -> VerdictKind {
        let reachable = match self {
            Scenario::BasicMapping { .. } | Scenario::NestedAliasMapping { .. } => true,
            Scenario::AliasMapping { synchronized, .. } => !synchronized,
            Scenario::Access { query, .. } => query.reachable(),
            Scenario::Stage2Alias { .. } => false,
        };
        if reachable {
            VerdictKind::Sat
        } else {
            VerdictKind::Unsat
        }
    }

    /// Validate literals and assemble the bound query against `model`.
    pub fn plan<'m, 'ctx>(&self, model: &'m Model<'ctx>) -> Result<Bound<'m, 'ctx>, CheckError> {
        match *self {
            Scenario::BasicMapping {
                paging: Paging::Direct,
                va,
            } => direct::plan_basic_mapping(model, va),
            Scenario::BasicMapping {
                paging: Paging::Nested,
                va,
            } => nested::plan_basic_mapping(model, va),
            Scenario::AliasMapping {
                flag,
                va,
                alias,
                pa,
                synchronized,
            } => direct::plan_alias_mapping(model, flag, va, alias, pa, synchronized),
            Scenario::NestedAliasMapping { va, alias } => {
                nested::plan_alias_mapping(model, va, alias)
            }
            Scenario::Access {
                paging: Paging::Direct,
                query,
                va,
                alias,
            } => direct::plan_access(model, query, va, alias),
            Scenario::Access {
                paging: Paging::Nested,
                query,
                va,
                alias,
            } => nested::plan_access(model, query, va, alias),
            Scenario::Stage2Alias { ipa, alias } => nested::plan_stage2_alias(model, ipa, alias),
        }
    }

    /// Evaluate in a fresh solver scope.
    pub fn run(&self, model: &Model<'_>) -> Result<Evaluation, CheckError> {
        Ok(self.plan(model)?.run())
    }

    pub fn run_with<'ctx, B: SolverBackend<'ctx>>(
        &self,
        model: &Model<'ctx>,
        backend: &mut B,
    ) -> Result<Evaluation, CheckError> {
        Ok(self.plan(model)?.check(backend))
    }

    /// The reference table: every scenario family with the literals it is usually asked about.
    pub fn default_suite() -> Vec<Scenario> {
        const VA: u64 = 0x1234_5000;
        const ALIAS: u64 = 0x2345_6000;

        let mut suite = vec![Scenario::BasicMapping {
            paging: Paging::Direct,
            va: VA,
        }];
        for flag in Flag::ALL {
            for synchronized in [false, true] {
                suite.push(Scenario::AliasMapping {
                    flag,
                    va: 0x1000,
                    alias: 0x2000,
                    pa: 0x5000,
                    synchronized,
                });
            }
        }
        suite.extend(Scenario::access_family(Paging::Direct, VA, ALIAS));
        suite.push(Scenario::BasicMapping {
            paging: Paging::Nested,
            va: VA,
        });
        suite.push(Scenario::NestedAliasMapping {
            va: VA,
            alias: ALIAS,
        });
        suite.extend(Scenario::access_family(Paging::Nested, VA, ALIAS));
        suite.push(Scenario::Stage2Alias {
            ipa: 0x4000_0000,
            alias: 0x4000_1000,
        });
        suite
    }

    fn access_family(paging: Paging, va: u64, alias: u64) -> impl Iterator<Item = Scenario> {
        AccessQuery::ALL.into_iter().map(move |query| Scenario::Access {
            paging,
            query,
            va,
            alias: query.bypassed_flag().map(|_| alias),
        })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::BasicMapping { paging, va } => write!(f, "{paging}::basic_mapping({va:#x})"),
            Scenario::AliasMapping {
                flag,
                va,
                alias,
                pa,
                synchronized,
            } => write!(
                f,
                "direct::alias_mapping[{flag}{}]({va:#x}, {alias:#x} -> {pa:#x})",
                if *synchronized { ", synchronized" } else { "" }
            ),
            Scenario::NestedAliasMapping { va, alias } => {
                write!(f, "nested::alias_mapping({va:#x}, {alias:#x})")
            }
            Scenario::Access {
                paging,
                query,
                va,
                alias: None,
            } => write!(f, "{paging}::{query}({va:#x})"),
            Scenario::Access {
                paging,
                query,
                va,
                alias: Some(alias),
            } => write!(f, "{paging}::{query}({va:#x}, {alias:#x})"),
            Scenario::Stage2Alias { ipa, alias } => {
                write!(f, "nested::stage2_alias({ipa:#x}, {alias:#x})")
            }
        }
    }
}

#[derive(Debug)]
pub struct SuiteEntry {
    pub scenario: Scenario,
    pub outcome: Result<Evaluation, CheckError>,
}

impl SuiteEntry {
    /// `None` when the scenario failed before reaching the solver.
    pub fn kind(&self) -> Option<VerdictKind> {
        self.outcome.as_ref().ok().map(Evaluation::kind)
    }

    pub fn as_expected(&self) -> bool {
        self.kind() == Some(self.scenario.expected())
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub entries: Vec<SuiteEntry>,
}

impl SuiteReport {
    pub fn mismatches(&self) -> impl Iterator<Item = &SuiteEntry> {
        self.entries.iter().filter(|e| !e.as_expected())
    }

    pub fn all_expected(&self) -> bool {
        self.mismatches().next().is_none()
    }

    /// One `scenario => verdict` line per entry.
    pub fn verdict_table(&self) -> String {
        self.entries
            .iter()
            .map(|e| match e.kind() {
                Some(kind) => format!("{} => {kind}\n", e.scenario),
                None => format!("{} => error\n", e.scenario),
            })
            .collect()
    }

    /// [`SuiteReport::verdict_table`] as a correct model would fill it in.
    pub fn expected_table(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} => {}\n", e.scenario, e.scenario.expected()))
            .collect()
    }
}
