//! Translation stages as uninterpreted functions.
//!
//! A stage asserts only that *some* deterministic translation result exists for each input; it
//! never says how the result is computed. Injectivity is never global. Where a stage forbids
//! aliasing, [`crate::alias::forbid_aliasing`] asserts it for the specific addresses in play.

use std::fmt;

use z3::ast::{Ast, Bool};
use z3::{Context, FuncDecl, Sort};

use crate::address::{Address, Space};
use crate::CheckError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Owned by the guest or OS page table.
    One,
    /// Owned by the hypervisor's nested page table.
    Two,
}

impl Stage {
    pub fn symbol(self) -> &'static str {
        match self {
            Stage::One => "stage1",
            Stage::Two => "stage2",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::One => f.write_str("stage 1"),
            Stage::Two => f.write_str("stage 2"),
        }
    }
}

pub struct Translation<'ctx> {
    stage: Stage,
    from: Space,
    to: Space,
    decl: FuncDecl<'ctx>,
}

impl<'ctx> Translation<'ctx> {
    pub fn declare(ctx: &'ctx Context, stage: Stage, from: Space, to: Space, bits: u32) -> Self {
        let sort = Sort::bitvector(ctx, bits);
        Translation {
            stage,
            from,
            to,
            decl: FuncDecl::new(ctx, stage.symbol(), &[&sort], &sort),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn apply(&self, addr: &Address<'ctx>) -> Result<Address<'ctx>, CheckError> {
        if addr.space() != self.from {
            return Err(CheckError::construction(format!(
                "{} translates {} addresses, but `{}` is {}",
                self.stage,
                self.from,
                addr.name(),
                addr.space()
            )));
        }
        let term = self
            .decl
            .apply(&[addr.term() as &dyn Ast<'ctx>])
            .as_bv()
            .ok_or_else(|| {
                CheckError::construction(format!(
                    "{} of `{}` is not a bit-vector",
                    self.stage,
                    addr.name()
                ))
            })?;
        Ok(Address::from_term(
            self.to,
            format!("{}({})", self.stage.symbol(), addr.name()),
            term,
        ))
    }

    /// `stage(addr) == target`, with the label used in constraint listings.
    pub fn maps_to(
        &self,
        addr: &Address<'ctx>,
        target: &Address<'ctx>,
    ) -> Result<(String, Bool<'ctx>), CheckError> {
        let resolved = self.apply(addr)?;
        if target.space() != self.to {
            return Err(CheckError::construction(format!(
                "{} resolves into {} addresses, but `{}` is {}",
                self.stage,
                self.to,
                target.name(),
                target.space()
            )));
        }
        Ok((
            format!("{} == {}", resolved.name(), target.name()),
            resolved.term()._eq(target.term()),
        ))
    }
}

/// Two stages chained so that the output space of the first feeds the second.
pub struct Composed<'a, 'ctx> {
    first: &'a Translation<'ctx>,
    second: &'a Translation<'ctx>,
}

pub fn compose<'a, 'ctx>(
    first: &'a Translation<'ctx>,
    second: &'a Translation<'ctx>,
) -> Result<Composed<'a, 'ctx>, CheckError> {
    if first.to != second.from {
        return Err(CheckError::construction(format!(
            "cannot feed {} output ({}) into {} ({})",
            first.stage, first.to, second.stage, second.from
        )));
    }
    Ok(Composed { first, second })
}

impl<'a, 'ctx> Composed<'a, 'ctx> {
    pub fn apply(&self, addr: &Address<'ctx>) -> Result<Address<'ctx>, CheckError> {
        self.second.apply(&self.first.apply(addr)?)
    }
}
