//! The background symbol declarations shared by every scenario of one paging mode.

use std::fmt;

use z3::ast::Bool;
use z3::Context;

use crate::address::{Address, Literal, Space};
use crate::permission::{Flag, Layer, PermissionTable, PermissionView};
use crate::solver::Z3Backend;
use crate::translation::{compose, Stage, Translation};
use crate::{CheckError, ModelConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Paging {
    /// One stage: the page table maps VA straight to PA.
    Direct,
    /// Two stages: VA to IPA through the guest table, IPA to PA through the hypervisor's.
    Nested,
}

impl fmt::Display for Paging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Paging::Direct => "direct",
            Paging::Nested => "nested",
        })
    }
}

/// Immutable symbol declarations for one paging mode.
///
/// Built once and passed explicitly into every scenario. Scenarios only read from it; the
/// assertions they make live in their own [`crate::ConstraintSet`].
pub struct Model<'ctx> {
    ctx: &'ctx Context,
    config: ModelConfig,
    paging: Paging,
    stage1: Translation<'ctx>,
    stage2: Option<Translation<'ctx>>,
    permissions: PermissionTable<'ctx>,
    write: Bool<'ctx>,
    execute: Bool<'ctx>,
}

impl<'ctx> Model<'ctx> {
    pub fn new(ctx: &'ctx Context, paging: Paging, config: ModelConfig) -> Result<Self, CheckError> {
        config.validate()?;
        let bits = config.address_bits;
        let (stage1, stage2) = match paging {
            Paging::Direct => (
                Translation::declare(ctx, Stage::One, Space::Virtual, Space::Physical, bits),
                None,
            ),
            Paging::Nested => (
                Translation::declare(ctx, Stage::One, Space::Virtual, Space::Intermediate, bits),
                Some(Translation::declare(
                    ctx,
                    Stage::Two,
                    Space::Intermediate,
                    Space::Physical,
                    bits,
                )),
            ),
        };
        Ok(Model {
            ctx,
            config,
            paging,
            stage1,
            stage2,
            permissions: PermissionTable::declare(ctx, bits, paging == Paging::Nested),
            write: Bool::new_const(ctx, "write"),
            execute: Bool::new_const(ctx, "execute"),
        })
    }

    pub fn direct(ctx: &'ctx Context, config: ModelConfig) -> Result<Self, CheckError> {
        Model::new(ctx, Paging::Direct, config)
    }

    pub fn nested(ctx: &'ctx Context, config: ModelConfig) -> Result<Self, CheckError> {
        Model::new(ctx, Paging::Nested, config)
    }

    pub fn ctx(&self) -> &'ctx Context {
        self.ctx
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn paging(&self) -> Paging {
        self.paging
    }

    pub fn page_size(&self) -> u64 {
        self.config.page_size
    }

    pub fn require(&self, paging: Paging) -> Result<(), CheckError> {
        if self.paging != paging {
            return Err(CheckError::construction(format!(
                "scenario needs a {paging} paging model, got {}",
                self.paging
            )));
        }
        Ok(())
    }

    pub fn stage1(&self) -> &Translation<'ctx> {
        &self.stage1
    }

    pub fn stage2(&self) -> Result<&Translation<'ctx>, CheckError> {
        self.stage2
            .as_ref()
            .ok_or_else(|| CheckError::construction("direct paging has no stage-2 translation"))
    }

    /// The frame `addr` finally resolves to.
    pub fn resolve(&self, addr: &Address<'ctx>) -> Result<Address<'ctx>, CheckError> {
        match &self.stage2 {
            None => self.stage1.apply(addr),
            Some(stage2) => compose(&self.stage1, stage2)?.apply(addr),
        }
    }

    pub fn address(&self, space: Space, name: &str) -> Address<'ctx> {
        Address::declare(self.ctx, space, name, self.config.address_bits)
    }

    pub fn literal(&self, value: u64) -> Result<Literal, CheckError> {
        Literal::new(value, &self.config)
    }

    /// Two literals that must name different addresses, as the members of an alias pair do.
    pub fn literal_pair(&self, first: u64, second: u64) -> Result<(Literal, Literal), CheckError> {
        Literal::pair(first, second, &self.config)
    }

    pub fn write(&self) -> &Bool<'ctx> {
        &self.write
    }

    pub fn execute(&self) -> &Bool<'ctx> {
        &self.execute
    }

    /// A solver scope for one query, honoring the configured timeout.
    pub fn backend(&self) -> Z3Backend<'ctx> {
        Z3Backend::new(self.ctx, self.config.timeout)
    }

    /// Both restriction bits of `layer` at `addr`, for witness probes.
    pub fn flags_at(
        &self,
        layer: Layer,
        addr: &Address<'ctx>,
    ) -> Result<Vec<(Flag, Bool<'ctx>)>, CheckError> {
        Flag::ALL
            .iter()
            .map(|&flag| Ok((flag, self.permission(layer, flag, addr)?)))
            .collect()
    }
}

impl<'ctx> PermissionView<'ctx> for Model<'ctx> {
    fn permission(
        &self,
        layer: Layer,
        flag: Flag,
        addr: &Address<'ctx>,
    ) -> Result<Bool<'ctx>, CheckError> {
        self.permissions.permission(layer, flag, addr)
    }
}
