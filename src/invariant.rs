//! Assemblers for translation and W^X invariants.
//!
//! W^X is modeled as a two-state classification of each frame: exactly one of read-only and
//! non-executable holds, so a frame is either data or code. Access intents are free booleans;
//! proving that some combination of them is unreachable is the solver's job.

use std::fmt;

use z3::ast::{Ast, Bool};

use crate::address::Address;
use crate::alias;
use crate::constraint::ConstraintSet;
use crate::evaluator::AccessIntent;
use crate::model::{Model, Paging};
use crate::permission::{self, predicate_label, Flag, Layer, PermissionView};
use crate::CheckError;

/// `va` translates to `pa` under direct paging; both page-aligned.
pub fn direct_mapping<'ctx>(
    model: &Model<'ctx>,
    va: &Address<'ctx>,
    pa: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    model.require(Paging::Direct)?;
    let mut set = ConstraintSet::new("mapping");
    let (label, assertion) = model.stage1().maps_to(va, pa)?;
    set.assert(label, assertion);
    for addr in [va, pa] {
        set.assert(
            addr.alignment_label(model.page_size()),
            addr.page_aligned(model.page_size()),
        );
    }
    Ok(set)
}

/// `va` translates to `ipa` at stage 1 and `ipa` to `pa` at stage 2; all page-aligned.
pub fn nested_mapping<'ctx>(
    model: &Model<'ctx>,
    va: &Address<'ctx>,
    ipa: &Address<'ctx>,
    pa: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    model.require(Paging::Nested)?;
    let mut set = ConstraintSet::new("mapping");
    let (label, assertion) = model.stage1().maps_to(va, ipa)?;
    set.assert(label, assertion);
    let (label, assertion) = model.stage2()?.maps_to(ipa, pa)?;
    set.assert(label, assertion);
    for addr in [va, ipa, pa] {
        set.assert(
            addr.alignment_label(model.page_size()),
            addr.page_aligned(model.page_size()),
        );
    }
    Ok(set)
}

/// `phys_ro(frame) != phys_nx(frame)`
pub fn wx_exclusion<'ctx>(
    model: &Model<'ctx>,
    frame: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let ro = model.physical(Flag::ReadOnly, frame)?;
    let nx = model.physical(Flag::NoExecute, frame)?;
    let mut set = ConstraintSet::new("wx");
    set.assert(
        format!(
            "{} != {}",
            predicate_label(Layer::Physical, Flag::ReadOnly, frame),
            predicate_label(Layer::Physical, Flag::NoExecute, frame)
        ),
        Bool::distinct(model.ctx(), &[&ro, &nx]),
    );
    Ok(set)
}

/// An access is only possible when the declared bit agrees with the frame and is clear.
///
/// Both conditions sit under the same implication:
/// `write => declared_ro == phys_ro && !declared_ro`, and likewise for execute and NX.
pub fn access_guards<'ctx>(
    model: &Model<'ctx>,
    declared_at: &Address<'ctx>,
    frame: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let layer = Layer::for_space(declared_at.space());
    let mut set = ConstraintSet::new("guard");
    for (intent, name, flag) in [
        (model.write(), "write", Flag::ReadOnly),
        (model.execute(), "execute", Flag::NoExecute),
    ] {
        let declared = model.declared(flag, declared_at)?;
        let physical = model.physical(flag, frame)?;
        let declared_label = predicate_label(layer, flag, declared_at);
        set.assert(
            format!(
                "{name} => {declared_label} == {} && !{declared_label}",
                predicate_label(Layer::Physical, flag, frame)
            ),
            intent.implies(&Bool::and(
                model.ctx(),
                &[&declared._eq(&physical), &declared.not()],
            )),
        );
    }
    Ok(set)
}

/// The single-stage W^X assembler.
///
/// `members[0]` is the address under test; any further members are aliases of it onto `pa`, and
/// every member's declared bits are synchronized with the frame.
pub fn direct_wx<'ctx>(
    model: &Model<'ctx>,
    members: &[Address<'ctx>],
    pa: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let va = head(members)?;
    let mut set = ConstraintSet::new("direct_wx");
    set.merge(direct_mapping(model, va, pa)?)?;
    if members.len() > 1 {
        set.merge(alias::alias_group(model.stage1(), members, pa, model.page_size())?)?;
        for member in members {
            set.merge(permission::synchronize(model, member, pa, &Flag::ALL)?)?;
        }
    }
    set.merge(wx_exclusion(model, pa)?)?;
    set.merge(access_guards(model, va, pa)?)?;
    Ok(set)
}

/// Stage-1 aliasing of `members` onto `ipa`, with stage 2 forbidding aliasing of their IPAs.
pub fn nested_translation<'ctx>(
    model: &Model<'ctx>,
    members: &[Address<'ctx>],
    ipa: &Address<'ctx>,
    pa: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let va = head(members)?;
    let mut set = ConstraintSet::new("nested_translation");
    set.merge(nested_mapping(model, va, ipa, pa)?)?;
    if members.len() > 1 {
        set.merge(alias::alias_group(model.stage1(), members, ipa, model.page_size())?)?;
        let ipas = intermediates(model, members)?;
        set.merge(alias::forbid_aliasing(model.stage2()?, &ipas)?)?;
    }
    Ok(set)
}

/// The frame's bits are the OR of the stage-1 bits of every member and the stage-2 bits of
/// every member's IPA.
pub fn nested_least_privilege<'ctx>(
    model: &Model<'ctx>,
    members: &[Address<'ctx>],
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let frame = model.resolve(head(members)?)?;
    let mut contributors = members.to_vec();
    contributors.extend(intermediates(model, members)?);

    let mut set = ConstraintSet::new("nested_permissions");
    for flag in Flag::ALL {
        set.merge(permission::least_privilege_combine(
            model,
            &frame,
            flag,
            &contributors,
        )?)?;
    }
    Ok(set)
}

/// The two-stage W^X assembler. Access is granted by the hypervisor's stage-2 bits.
pub fn nested_wx<'ctx>(
    model: &Model<'ctx>,
    members: &[Address<'ctx>],
    ipa: &Address<'ctx>,
    pa: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let va = head(members)?;
    let frame = model.resolve(va)?;
    let mut set = ConstraintSet::new("nested_wx");
    set.merge(nested_translation(model, members, ipa, pa)?)?;
    set.merge(nested_least_privilege(model, members)?)?;
    set.merge(wx_exclusion(model, &frame)?)?;
    set.merge(access_guards(model, &model.stage1().apply(va)?, &frame)?)?;
    Ok(set)
}

/// `declared(flag, a) != declared(flag, b)`
pub fn diverging_declarations<'ctx>(
    model: &Model<'ctx>,
    flag: Flag,
    a: &Address<'ctx>,
    b: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let da = model.declared(flag, a)?;
    let db = model.declared(flag, b)?;
    let mut set = ConstraintSet::new("query");
    set.assert(
        format!(
            "{} != {}",
            predicate_label(Layer::for_space(a.space()), flag, a),
            predicate_label(Layer::for_space(b.space()), flag, b)
        ),
        Bool::distinct(model.ctx(), &[&da, &db]),
    );
    Ok(set)
}

/// The canonical access questions asked of a W^X model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessQuery {
    Writable,
    Executable,
    WritableAndExecutable,
    /// Write through one address while an alias of it declares the page read-only.
    WritableButAliasReadOnly,
    /// Execute through one address while an alias of it declares the page non-executable.
    ExecutableButAliasNx,
}

impl AccessQuery {
    pub const ALL: [AccessQuery; 5] = [
        AccessQuery::Writable,
        AccessQuery::Executable,
        AccessQuery::WritableAndExecutable,
        AccessQuery::WritableButAliasReadOnly,
        AccessQuery::ExecutableButAliasNx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AccessQuery::Writable => "writable",
            AccessQuery::Executable => "executable",
            AccessQuery::WritableAndExecutable => "writable_and_executable",
            AccessQuery::WritableButAliasReadOnly => "writable_but_alias_read_only",
            AccessQuery::ExecutableButAliasNx => "executable_but_alias_nx",
        }
    }

    pub fn intent(self) -> AccessIntent {
        match self {
            AccessQuery::Writable | AccessQuery::WritableButAliasReadOnly => AccessIntent::WRITE,
            AccessQuery::Executable | AccessQuery::ExecutableButAliasNx => AccessIntent::EXECUTE,
            AccessQuery::WritableAndExecutable => AccessIntent::WRITE_EXECUTE,
        }
    }

    /// The restriction an alias would try to contradict, if this is a bypass query.
    pub fn bypassed_flag(self) -> Option<Flag> {
        match self {
            AccessQuery::WritableButAliasReadOnly => Some(Flag::ReadOnly),
            AccessQuery::ExecutableButAliasNx => Some(Flag::NoExecute),
            _ => None,
        }
    }

    /// Whether a correct W^X model admits this access.
    pub fn reachable(self) -> bool {
        matches!(self, AccessQuery::Writable | AccessQuery::Executable)
    }
}

impl fmt::Display for AccessQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The query-specific assertions of `query` against `va`.
///
/// Plain access queries add nothing here; their intent flags are bound by the evaluator. Bypass
/// queries additionally assert that `alias` declares a different bit than `va`.
pub fn access_query<'ctx>(
    model: &Model<'ctx>,
    query: AccessQuery,
    va: &Address<'ctx>,
    alias: Option<&Address<'ctx>>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    match (query.bypassed_flag(), alias) {
        (None, None) => Ok(ConstraintSet::new("query")),
        (Some(flag), Some(alias)) => diverging_declarations(model, flag, alias, va),
        (Some(_), None) => Err(CheckError::construction(format!(
            "`{query}` needs an alias of `{}`",
            va.name()
        ))),
        (None, Some(alias)) => Err(CheckError::construction(format!(
            "`{query}` takes no alias, got `{}`",
            alias.name()
        ))),
    }
}

fn head<'a, 'ctx>(members: &'a [Address<'ctx>]) -> Result<&'a Address<'ctx>, CheckError> {
    members
        .first()
        .ok_or_else(|| CheckError::construction("no address under test"))
}

fn intermediates<'ctx>(
    model: &Model<'ctx>,
    members: &[Address<'ctx>],
) -> Result<Vec<Address<'ctx>>, CheckError> {
    members.iter().map(|m| model.stage1().apply(m)).collect()
}
