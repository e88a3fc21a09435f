//! Named, ordered constraint sets.
//!
//! Every builder in this crate returns a fresh [`ConstraintSet`] fragment. Scenarios merge the
//! fragments they need into a set of their own; nothing is shared between queries.

use tracing::debug;
use z3::ast::Bool;

use crate::translation::Stage;
use crate::CheckError;

pub struct Constraint<'ctx> {
    fragment: String,
    label: String,
    assertion: Bool<'ctx>,
}

impl<'ctx> Constraint<'ctx> {
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn assertion(&self) -> &Bool<'ctx> {
        &self.assertion
    }
}

/// How a set relates two addresses at one translation stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairRelation {
    /// Both resolve to the same next-stage address.
    Alias,
    /// Distinct inputs resolve to distinct outputs.
    NoAlias,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PairClaim {
    stage: Stage,
    pair: (String, String),
    relation: PairRelation,
}

pub struct ConstraintSet<'ctx> {
    name: String,
    constraints: Vec<Constraint<'ctx>>,
    claims: Vec<PairClaim>,
}

impl<'ctx> ConstraintSet<'ctx> {
    pub fn new(name: impl Into<String>) -> Self {
        ConstraintSet {
            name: name.into(),
            constraints: Vec::new(),
            claims: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint<'ctx>> {
        self.constraints.iter()
    }

    pub fn assert(&mut self, label: impl Into<String>, assertion: Bool<'ctx>) {
        self.constraints.push(Constraint {
            fragment: self.name.clone(),
            label: label.into(),
            assertion,
        });
    }

    /// Record that `a` and `b` stand in `relation` at `stage`.
    ///
    /// A pair may not be both aliased and non-aliased at the same stage: the two claims together
    /// are trivially contradictory and would make every query on the set vacuously unsatisfiable.
    pub fn claim(
        &mut self,
        stage: Stage,
        a: &str,
        b: &str,
        relation: PairRelation,
    ) -> Result<(), CheckError> {
        let pair = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        if let Some(existing) = self
            .claims
            .iter()
            .find(|c| c.stage == stage && c.pair == pair)
        {
            if existing.relation != relation {
                return Err(CheckError::construction(format!(
                    "`{}` and `{}` are both aliased and non-aliased at {} in `{}`",
                    pair.0, pair.1, stage, self.name
                )));
            }
            return Ok(());
        }
        self.claims.push(PairClaim {
            stage,
            pair,
            relation,
        });
        Ok(())
    }

    /// Append `other`, keeping its fragment names and checking its pair claims against ours.
    pub fn merge(&mut self, other: ConstraintSet<'ctx>) -> Result<(), CheckError> {
        for claim in &other.claims {
            self.claim(claim.stage, &claim.pair.0, &claim.pair.1, claim.relation)?;
        }
        debug!(
            fragment = %other.name,
            into = %self.name,
            count = other.constraints.len(),
            "merged constraint fragment"
        );
        self.constraints.extend(other.constraints);
        Ok(())
    }

    /// Human-readable listing, one assertion per line in assertion order.
    pub fn render(&self) -> String {
        let mut out = format!("{}:\n", self.name);
        for (i, c) in self.constraints.iter().enumerate() {
            out += &format!("  {}. [{}] {}\n", i, c.fragment(), c.label());
        }
        out
    }
}
