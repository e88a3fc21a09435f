//! Query evaluation: Idle -> Built -> Bound -> Checked.
//!
//! Each state is its own type, so a query cannot be checked before its literals are bound, and a
//! finished query cannot be reused. Every query owns a fresh [`ConstraintSet`].

use tracing::{info, warn};
use z3::ast::{Ast, Bool};

use crate::address::{Address, Literal};
use crate::constraint::ConstraintSet;
use crate::model::Model;
use crate::permission::{predicate_label, Layer};
use crate::solver::{Probe, SolverBackend, Verdict, VerdictKind};
use crate::CheckError;

/// The access being tested. Write and execute are not exclusive here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccessIntent {
    pub write: bool,
    pub execute: bool,
}

impl AccessIntent {
    pub const WRITE: AccessIntent = AccessIntent {
        write: true,
        execute: false,
    };
    pub const EXECUTE: AccessIntent = AccessIntent {
        write: false,
        execute: true,
    };
    pub const WRITE_EXECUTE: AccessIntent = AccessIntent {
        write: true,
        execute: true,
    };
}

/// Literal values for a query, asserted by equality once the constraints are built.
#[derive(Default)]
pub struct Bindings<'ctx> {
    addresses: Vec<(Address<'ctx>, Literal)>,
    intent: Option<AccessIntent>,
}

impl<'ctx> Bindings<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, addr: &Address<'ctx>, value: Literal) -> Self {
        self.addresses.push((addr.clone(), value));
        self
    }

    pub fn intent(mut self, intent: AccessIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// Idle.
pub struct Query<'m, 'ctx> {
    model: &'m Model<'ctx>,
    name: String,
}

/// Built: constraints assembled, nothing bound yet.
pub struct Built<'m, 'ctx> {
    model: &'m Model<'ctx>,
    constraints: ConstraintSet<'ctx>,
    probes: Vec<Probe<'ctx>>,
}

/// Bound: ready to hand to a backend.
pub struct Bound<'m, 'ctx> {
    model: &'m Model<'ctx>,
    constraints: ConstraintSet<'ctx>,
    probes: Vec<Probe<'ctx>>,
}

/// Checked.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub scenario: String,
    pub verdict: Verdict,
    /// Number of assertions handed to the solver.
    pub assertions: usize,
}

impl Evaluation {
    pub fn kind(&self) -> VerdictKind {
        self.verdict.kind()
    }
}

impl<'m, 'ctx> Query<'m, 'ctx> {
    pub fn new(model: &'m Model<'ctx>, name: impl Into<String>) -> Self {
        Query {
            model,
            name: name.into(),
        }
    }

    pub fn build(
        self,
        fragments: impl IntoIterator<Item = ConstraintSet<'ctx>>,
    ) -> Result<Built<'m, 'ctx>, CheckError> {
        let mut constraints = ConstraintSet::new(self.name);
        for fragment in fragments {
            constraints.merge(fragment)?;
        }
        Ok(Built {
            model: self.model,
            constraints,
            probes: Vec::new(),
        })
    }
}

impl<'m, 'ctx> Built<'m, 'ctx> {
    pub fn constraints(&self) -> &ConstraintSet<'ctx> {
        &self.constraints
    }

    pub fn probe(mut self, name: impl Into<String>, term: &dyn Ast<'ctx>) -> Self {
        self.probes.push(Probe::new(name, term));
        self
    }

    pub fn probe_address(self, addr: &Address<'ctx>) -> Self {
        let name = addr.name().to_string();
        self.probe(name, addr.term())
    }

    /// Probe both restriction bits that `addr`'s own layer holds for it.
    pub fn probe_flags(mut self, addr: &Address<'ctx>) -> Result<Self, CheckError> {
        let layer = Layer::for_space(addr.space());
        for (flag, bit) in self.model.flags_at(layer, addr)? {
            self = self.probe(predicate_label(layer, flag, addr), &bit);
        }
        Ok(self)
    }

    pub fn probe_intent(self) -> Self {
        let model = self.model;
        self.probe("write", model.write())
            .probe("execute", model.execute())
    }

    pub fn bind(self, bindings: Bindings<'ctx>) -> Result<Bound<'m, 'ctx>, CheckError> {
        let Built {
            model,
            mut constraints,
            probes,
        } = self;
        let mut bound = ConstraintSet::new("bind");
        for (addr, value) in &bindings.addresses {
            bound.assert(
                format!("{} == {}", addr.name(), value),
                addr.equals_literal(*value),
            );
        }
        if let Some(intent) = bindings.intent {
            let ctx = model.ctx();
            bound.assert(
                format!("write == {}", intent.write),
                model.write()._eq(&Bool::from_bool(ctx, intent.write)),
            );
            bound.assert(
                format!("execute == {}", intent.execute),
                model.execute()._eq(&Bool::from_bool(ctx, intent.execute)),
            );
        }
        constraints.merge(bound)?;
        Ok(Bound {
            model,
            constraints,
            probes,
        })
    }
}

impl<'m, 'ctx> Bound<'m, 'ctx> {
    pub fn constraints(&self) -> &ConstraintSet<'ctx> {
        &self.constraints
    }

    /// Check against a fresh scope of the model's own solver.
    pub fn run(self) -> Evaluation {
        let mut backend = self.model.backend();
        self.check(&mut backend)
    }

    pub fn check<B: SolverBackend<'ctx>>(self, backend: &mut B) -> Evaluation {
        let verdict = backend.check(&self.constraints, &self.probes);
        let scenario = self.constraints.name().to_string();
        match verdict.kind() {
            VerdictKind::Unknown => warn!(%scenario, %verdict, "no verdict"),
            kind => info!(%scenario, verdict = %kind, "checked"),
        }
        Evaluation {
            scenario,
            verdict,
            assertions: self.constraints.len(),
        }
    }
}
