//! The solver boundary.
//!
//! A backend takes a finished [`ConstraintSet`] and answers satisfiable, unsatisfiable, or
//! unknown. Backends are free to keep state between calls (a warm solver), but no assertion may
//! outlive the call that made it.

use std::fmt;
use std::time::Duration;

use tracing::{trace, warn};
use z3::ast::{Ast, Dynamic};
use z3::{Context, Params, SatResult, Solver};

use crate::constraint::ConstraintSet;

/// A term whose value is reported in the witness of a satisfiable query.
pub struct Probe<'ctx> {
    name: String,
    term: Dynamic<'ctx>,
}

impl<'ctx> Probe<'ctx> {
    pub fn new(name: impl Into<String>, term: &dyn Ast<'ctx>) -> Self {
        Probe {
            name: name.into(),
            term: Dynamic::from_ast(term),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    Sat,
    Unsat,
    Unknown,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerdictKind::Sat => "sat",
            VerdictKind::Unsat => "unsat",
            VerdictKind::Unknown => "unknown",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Satisfiable(Witness),
    Unsatisfiable,
    /// The solver gave up, most often on a timeout. Never to be read as unsatisfiable.
    Unknown { reason: String },
}

impl Verdict {
    pub fn kind(&self) -> VerdictKind {
        match self {
            Verdict::Satisfiable(_) => VerdictKind::Sat,
            Verdict::Unsatisfiable => VerdictKind::Unsat,
            Verdict::Unknown { .. } => VerdictKind::Unknown,
        }
    }

    pub fn witness(&self) -> Option<&Witness> {
        match self {
            Verdict::Satisfiable(witness) => Some(witness),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unknown { reason } => write!(f, "unknown ({reason})"),
            other => other.kind().fmt(f),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WitnessValue {
    Bits(u64),
    Bool(bool),
    /// Anything the model could not reduce to a literal, in solver syntax.
    Opaque(String),
}

impl fmt::Display for WitnessValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WitnessValue::Bits(v) => write!(f, "{v:#x}"),
            WitnessValue::Bool(b) => write!(f, "{b}"),
            WitnessValue::Opaque(s) => f.write_str(s),
        }
    }
}

/// Concrete values of the probed terms in a satisfying assignment, in probe order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Witness {
    entries: Vec<(String, WitnessValue)>,
}

impl Witness {
    pub fn get(&self, name: &str) -> Option<&WitnessValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            WitnessValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn bits(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            WitnessValue::Bits(v) => Some(*v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WitnessValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

pub trait SolverBackend<'ctx> {
    fn check(&mut self, constraints: &ConstraintSet<'ctx>, probes: &[Probe<'ctx>]) -> Verdict;
}

/// Z3 behind push/pop: every check runs in a scope of its own.
pub struct Z3Backend<'ctx> {
    solver: Solver<'ctx>,
    timeout: Option<Duration>,
}

impl<'ctx> Z3Backend<'ctx> {
    pub fn new(ctx: &'ctx Context, timeout: Option<Duration>) -> Self {
        let solver = Solver::new(ctx);
        let mut params = Params::new(ctx);
        if let Some(timeout) = timeout {
            params.set_u32("timeout", u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        }
        // Pin the seeds so identical queries take identical search paths.
        params.set_u32("smt.random_seed", 0);
        params.set_u32("sat.random_seed", 0);
        solver.set_params(&params);
        Z3Backend { solver, timeout }
    }

    /// The per-check budget handed to the solver, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<'ctx> SolverBackend<'ctx> for Z3Backend<'ctx> {
    fn check(&mut self, constraints: &ConstraintSet<'ctx>, probes: &[Probe<'ctx>]) -> Verdict {
        self.solver.push();
        for c in constraints.iter() {
            self.solver.assert(c.assertion());
        }
        let verdict = match self.solver.check() {
            SatResult::Sat => Verdict::Satisfiable(match self.solver.get_model() {
                Some(model) => extract_witness(&model, probes),
                None => Witness::default(),
            }),
            SatResult::Unsat => Verdict::Unsatisfiable,
            SatResult::Unknown => {
                let reason = self
                    .solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "no reason given".to_string());
                warn!(set = constraints.name(), %reason, "solver returned unknown");
                Verdict::Unknown { reason }
            }
        };
        self.solver.pop(1);
        verdict
    }
}

fn extract_witness<'ctx>(model: &z3::Model<'ctx>, probes: &[Probe<'ctx>]) -> Witness {
    let entries = probes
        .iter()
        .map(|probe| {
            let value = match model.eval(&probe.term, true) {
                Some(v) => {
                    if let Some(b) = v.as_bool().and_then(|b| b.as_bool()) {
                        WitnessValue::Bool(b)
                    } else if let Some(bits) = v.as_bv().and_then(|bv| bv.as_u64()) {
                        WitnessValue::Bits(bits)
                    } else {
                        WitnessValue::Opaque(v.to_string())
                    }
                }
                None => WitnessValue::Opaque("?".to_string()),
            };
            trace!(probe = %probe.name(), %value, "witness");
            (probe.name().to_string(), value)
        })
        .collect();
    Witness { entries }
}
