//! Permission predicates and the generators that tie declared bits to physical frames.

use std::fmt;

use z3::ast::{Ast, Bool};
use z3::{Context, FuncDecl, Sort};

use crate::address::{Address, Space};
use crate::constraint::ConstraintSet;
use crate::CheckError;

/// A restriction bit. Set means the access kind is denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    ReadOnly,
    NoExecute,
}

impl Flag {
    pub const ALL: [Flag; 2] = [Flag::ReadOnly, Flag::NoExecute];

    fn suffix(self) -> &'static str {
        match self {
            Flag::ReadOnly => "ro",
            Flag::NoExecute => "nx",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// The authority a permission bit belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    /// Declared by the stage-1 page table, keyed by virtual address.
    Stage1,
    /// Declared by the hypervisor's stage-2 table, keyed by intermediate-physical address.
    Stage2,
    /// Protection state of the frame itself.
    Physical,
}

impl Layer {
    pub fn keyed_by(self) -> Space {
        match self {
            Layer::Stage1 => Space::Virtual,
            Layer::Stage2 => Space::Intermediate,
            Layer::Physical => Space::Physical,
        }
    }

    /// The layer whose bits are indexed by addresses of `space`.
    pub fn for_space(space: Space) -> Layer {
        match space {
            Space::Virtual => Layer::Stage1,
            Space::Intermediate => Layer::Stage2,
            Space::Physical => Layer::Physical,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Layer::Stage1 => "stage1",
            Layer::Stage2 => "stage2",
            Layer::Physical => "phys",
        }
    }
}

/// Label of `layer`'s `flag` bit at `addr`, e.g. `stage1_ro(va)`.
pub fn predicate_label(layer: Layer, flag: Flag, addr: &Address<'_>) -> String {
    format!("{}_{}({})", layer.prefix(), flag.suffix(), addr.name())
}

/// Query surface over permission bits.
///
/// Bits stay abstract predicates rather than table lookups, so a verdict covers every page table
/// that assigns them consistently.
pub trait PermissionView<'ctx> {
    fn permission(
        &self,
        layer: Layer,
        flag: Flag,
        addr: &Address<'ctx>,
    ) -> Result<Bool<'ctx>, CheckError>;

    /// The bit declared by whichever authority translates `addr`.
    fn declared(&self, flag: Flag, addr: &Address<'ctx>) -> Result<Bool<'ctx>, CheckError> {
        match Layer::for_space(addr.space()) {
            Layer::Physical => Err(CheckError::construction(format!(
                "`{}` is a physical frame and carries no declared permission",
                addr.name()
            ))),
            layer => self.permission(layer, flag, addr),
        }
    }

    fn physical(&self, flag: Flag, frame: &Address<'ctx>) -> Result<Bool<'ctx>, CheckError> {
        self.permission(Layer::Physical, flag, frame)
    }
}

struct FlagPair<'ctx> {
    ro: FuncDecl<'ctx>,
    nx: FuncDecl<'ctx>,
}

impl<'ctx> FlagPair<'ctx> {
    fn declare(ctx: &'ctx Context, layer: Layer, bits: u32) -> Self {
        let domain = Sort::bitvector(ctx, bits);
        let range = Sort::bool(ctx);
        let decl = |flag: Flag| {
            FuncDecl::new(
                ctx,
                format!("{}_{}", layer.prefix(), flag.suffix()),
                &[&domain],
                &range,
            )
        };
        FlagPair {
            ro: decl(Flag::ReadOnly),
            nx: decl(Flag::NoExecute),
        }
    }

    fn get(&self, flag: Flag) -> &FuncDecl<'ctx> {
        match flag {
            Flag::ReadOnly => &self.ro,
            Flag::NoExecute => &self.nx,
        }
    }
}

/// The uninterpreted predicate symbols of one model.
pub struct PermissionTable<'ctx> {
    stage1: FlagPair<'ctx>,
    stage2: Option<FlagPair<'ctx>>,
    physical: FlagPair<'ctx>,
}

impl<'ctx> PermissionTable<'ctx> {
    pub fn declare(ctx: &'ctx Context, bits: u32, with_stage2: bool) -> Self {
        PermissionTable {
            stage1: FlagPair::declare(ctx, Layer::Stage1, bits),
            stage2: with_stage2.then(|| FlagPair::declare(ctx, Layer::Stage2, bits)),
            physical: FlagPair::declare(ctx, Layer::Physical, bits),
        }
    }
}

impl<'ctx> PermissionView<'ctx> for PermissionTable<'ctx> {
    fn permission(
        &self,
        layer: Layer,
        flag: Flag,
        addr: &Address<'ctx>,
    ) -> Result<Bool<'ctx>, CheckError> {
        if addr.space() != layer.keyed_by() {
            return Err(CheckError::construction(format!(
                "{} bits are keyed by {} addresses, but `{}` is {}",
                layer.prefix(),
                layer.keyed_by(),
                addr.name(),
                addr.space()
            )));
        }
        let pair = match layer {
            Layer::Stage1 => &self.stage1,
            Layer::Stage2 => self.stage2.as_ref().ok_or_else(|| {
                CheckError::construction("stage-2 permissions exist only under nested paging")
            })?,
            Layer::Physical => &self.physical,
        };
        pair.get(flag)
            .apply(&[addr.term() as &dyn Ast<'ctx>])
            .as_bool()
            .ok_or_else(|| {
                CheckError::construction(format!(
                    "{} did not evaluate to a boolean",
                    predicate_label(layer, flag, addr)
                ))
            })
    }
}

/// Declared bits at `addr` equal the physical bits of `frame`, for each of `flags`.
pub fn synchronize<'ctx>(
    view: &impl PermissionView<'ctx>,
    addr: &Address<'ctx>,
    frame: &Address<'ctx>,
    flags: &[Flag],
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let layer = Layer::for_space(addr.space());
    let mut set = ConstraintSet::new("sync");
    for &flag in flags {
        let declared = view.declared(flag, addr)?;
        let physical = view.physical(flag, frame)?;
        set.assert(
            format!(
                "{} == {}",
                predicate_label(layer, flag, addr),
                predicate_label(Layer::Physical, flag, frame)
            ),
            declared._eq(&physical),
        );
    }
    Ok(set)
}

/// The frame's `flag` bit is the OR of every contributor's declared bit.
///
/// A frame is only as permissive as its most restrictive contributor, so neither a second
/// translation layer nor an alias can widen access.
pub fn least_privilege_combine<'ctx>(
    view: &impl PermissionView<'ctx>,
    frame: &Address<'ctx>,
    flag: Flag,
    contributors: &[Address<'ctx>],
) -> Result<ConstraintSet<'ctx>, CheckError> {
    if contributors.is_empty() {
        return Err(CheckError::construction(format!(
            "least-privilege combination for `{}` has no contributors",
            frame.name()
        )));
    }
    let declared = contributors
        .iter()
        .map(|c| view.declared(flag, c))
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&Bool<'ctx>> = declared.iter().collect();
    let combined = Bool::or(frame.term().get_ctx(), &refs);

    let labels: Vec<String> = contributors
        .iter()
        .map(|c| predicate_label(Layer::for_space(c.space()), flag, c))
        .collect();
    let mut set = ConstraintSet::new("least_privilege");
    set.assert(
        format!(
            "{} == {}",
            predicate_label(Layer::Physical, flag, frame),
            labels.join(" || ")
        ),
        view.physical(flag, frame)?._eq(&combined),
    );
    Ok(set)
}
