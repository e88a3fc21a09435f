//! Address spaces, symbolic addresses, and page alignment.

use std::fmt;

use z3::ast::{Ast, Bool, BV};
use z3::Context;

use crate::{CheckError, InputDomainError, ModelConfig};

/// The domain an address belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Space {
    Virtual,
    /// Output of stage 1 and input of stage 2 under nested paging.
    Intermediate,
    Physical,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Space::Virtual => "virtual",
            Space::Intermediate => "intermediate-physical",
            Space::Physical => "physical",
        })
    }
}

/// A symbolic address: a bit-vector term tagged with the space it lives in.
///
/// The name is what shows up in constraint listings and witnesses; translated addresses are named
/// after the application that produced them, e.g. `stage1(va)`.
#[derive(Clone, Debug)]
pub struct Address<'ctx> {
    space: Space,
    name: String,
    term: BV<'ctx>,
}

impl<'ctx> Address<'ctx> {
    pub fn declare(ctx: &'ctx Context, space: Space, name: &str, bits: u32) -> Self {
        Address {
            space,
            name: name.to_string(),
            term: BV::new_const(ctx, name, bits),
        }
    }

    pub(crate) fn from_term(space: Space, name: String, term: BV<'ctx>) -> Self {
        Address { space, name, term }
    }

    pub fn space(&self) -> Space {
        self.space
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn term(&self) -> &BV<'ctx> {
        &self.term
    }

    pub fn equals(&self, other: &Address<'ctx>) -> Bool<'ctx> {
        self.term._eq(&other.term)
    }

    pub fn equals_literal(&self, literal: Literal) -> Bool<'ctx> {
        let value = BV::from_u64(self.term.get_ctx(), literal.value(), self.term.get_size());
        self.term._eq(&value)
    }

    /// `self & (page_size - 1) == 0`
    pub fn page_aligned(&self, page_size: u64) -> Bool<'ctx> {
        let ctx = self.term.get_ctx();
        let bits = self.term.get_size();
        let mask = BV::from_u64(ctx, page_size - 1, bits);
        self.term.bvand(&mask)._eq(&BV::from_u64(ctx, 0, bits))
    }

    pub(crate) fn alignment_label(&self, page_size: u64) -> String {
        format!("{} & {:#x} == 0", self.name, page_size - 1)
    }
}

/// A concrete page address that has been checked against the address width and page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Literal(u64);

impl Literal {
    pub fn new(value: u64, config: &ModelConfig) -> Result<Self, CheckError> {
        config.validate()?;
        if config.address_bits < 64 && value >> config.address_bits != 0 {
            return Err(InputDomainError::OutOfRange {
                value,
                bits: config.address_bits,
            }
            .into());
        }
        if value & config.offset_mask() != 0 {
            return Err(InputDomainError::Misaligned {
                value,
                page_size: config.page_size,
            }
            .into());
        }
        Ok(Literal(value))
    }

    /// Validate an alias pair: both literals on their own, then that they differ.
    pub fn pair(first: u64, second: u64, config: &ModelConfig) -> Result<(Self, Self), CheckError> {
        let pair = (Literal::new(first, config)?, Literal::new(second, config)?);
        if first == second {
            return Err(InputDomainError::Coincident { value: second }.into());
        }
        Ok(pair)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
