//! Scenarios for direct paging, where the stage-1 page table maps VA straight to PA.
//!
//! Every function validates its literals first, builds a fresh constraint set, and checks it in
//! a solver scope of its own.

use crate::address::Space;
use crate::alias;
use crate::evaluator::{Bindings, Bound, Evaluation, Query};
use crate::invariant::{self, AccessQuery};
use crate::model::{Model, Paging};
use crate::permission::{self, Flag};
use crate::CheckError;

/// `va` maps to some page-aligned frame whose bits match the declared ones. Expected: sat.
pub fn basic_mapping(model: &Model<'_>, va: u64) -> Result<Evaluation, CheckError> {
    Ok(plan_basic_mapping(model, va)?.run())
}

/// `va` and `alias` both map to `pa` while declaring different RO bits.
///
/// Expected: sat without synchronization, unsat once every alias's declared bits must match the
/// frame.
pub fn alias_mapping(
    model: &Model<'_>,
    va: u64,
    alias: u64,
    pa: u64,
    synchronized: bool,
) -> Result<Evaluation, CheckError> {
    Ok(plan_alias_mapping(model, Flag::ReadOnly, va, alias, pa, synchronized)?.run())
}

/// [`alias_mapping`] with the NX bit in place of RO.
pub fn alias_mapping_nx(
    model: &Model<'_>,
    va: u64,
    alias: u64,
    pa: u64,
    synchronized: bool,
) -> Result<Evaluation, CheckError> {
    Ok(plan_alias_mapping(model, Flag::NoExecute, va, alias, pa, synchronized)?.run())
}

/// Expected: sat.
pub fn writable(model: &Model<'_>, va: u64) -> Result<Evaluation, CheckError> {
    access(model, AccessQuery::Writable, va, None)
}

/// Expected: sat.
pub fn executable(model: &Model<'_>, va: u64) -> Result<Evaluation, CheckError> {
    access(model, AccessQuery::Executable, va, None)
}

/// Expected: unsat.
pub fn writable_and_executable(model: &Model<'_>, va: u64) -> Result<Evaluation, CheckError> {
    access(model, AccessQuery::WritableAndExecutable, va, None)
}

/// Expected: unsat.
pub fn writable_but_alias_read_only(
    model: &Model<'_>,
    va: u64,
    alias: u64,
) -> Result<Evaluation, CheckError> {
    access(model, AccessQuery::WritableButAliasReadOnly, va, Some(alias))
}

/// Expected: unsat.
pub fn executable_but_alias_nx(
    model: &Model<'_>,
    va: u64,
    alias: u64,
) -> Result<Evaluation, CheckError> {
    access(model, AccessQuery::ExecutableButAliasNx, va, Some(alias))
}

fn access(
    model: &Model<'_>,
    query: AccessQuery,
    va: u64,
    alias: Option<u64>,
) -> Result<Evaluation, CheckError> {
    Ok(plan_access(model, query, va, alias)?.run())
}

pub(crate) fn plan_basic_mapping<'m, 'ctx>(
    model: &'m Model<'ctx>,
    va: u64,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Direct)?;
    let va_value = model.literal(va)?;

    let va = model.address(Space::Virtual, "va");
    let pa = model.address(Space::Physical, "pa");
    let built = Query::new(model, "direct::basic_mapping")
        .build([
            invariant::direct_mapping(model, &va, &pa)?,
            permission::synchronize(model, &va, &pa, &Flag::ALL)?,
        ])?
        .probe_address(&va)
        .probe_address(&pa)
        .probe_flags(&va)?
        .probe_flags(&pa)?;
    built.bind(Bindings::new().address(&va, va_value))
}

pub(crate) fn plan_alias_mapping<'m, 'ctx>(
    model: &'m Model<'ctx>,
    flag: Flag,
    va: u64,
    alias: u64,
    pa: u64,
    synchronized: bool,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Direct)?;
    let (va_value, alias_value) = model.literal_pair(va, alias)?;
    let pa_value = model.literal(pa)?;

    let va = model.address(Space::Virtual, "va");
    let alias = model.address(Space::Virtual, "va1");
    let pa = model.address(Space::Physical, "pa");
    let members = [va.clone(), alias.clone()];

    let mut fragments = vec![
        invariant::direct_mapping(model, &va, &pa)?,
        alias::alias_group(model.stage1(), &members, &pa, model.page_size())?,
    ];
    if synchronized {
        for member in &members {
            fragments.push(permission::synchronize(model, member, &pa, &Flag::ALL)?);
        }
    }
    fragments.push(invariant::diverging_declarations(model, flag, &va, &alias)?);

    let name = format!(
        "direct::alias_mapping[{flag}{}]",
        if synchronized { ", synchronized" } else { "" }
    );
    let built = Query::new(model, name)
        .build(fragments)?
        .probe_address(&va)
        .probe_address(&alias)
        .probe_address(&pa)
        .probe_flags(&va)?
        .probe_flags(&alias)?
        .probe_flags(&pa)?;
    built.bind(
        Bindings::new()
            .address(&va, va_value)
            .address(&alias, alias_value)
            .address(&pa, pa_value),
    )
}

pub(crate) fn plan_access<'m, 'ctx>(
    model: &'m Model<'ctx>,
    query: AccessQuery,
    va: u64,
    alias: Option<u64>,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Direct)?;
    let (va_value, alias_value) = match alias {
        Some(alias) => {
            let (va_value, alias_value) = model.literal_pair(va, alias)?;
            (va_value, Some(alias_value))
        }
        None => (model.literal(va)?, None),
    };

    let va = model.address(Space::Virtual, "va");
    let pa = model.address(Space::Physical, "pa");
    let alias = alias_value.map(|_| model.address(Space::Virtual, "va1"));
    let members: Vec<_> = std::iter::once(va.clone()).chain(alias.clone()).collect();

    let mut built = Query::new(model, format!("direct::{query}"))
        .build([
            invariant::direct_wx(model, &members, &pa)?,
            invariant::access_query(model, query, &va, alias.as_ref())?,
        ])?
        .probe_intent();
    for member in &members {
        built = built.probe_address(member).probe_flags(member)?;
    }
    let built = built.probe_address(&pa).probe_flags(&pa)?;

    let mut bindings = Bindings::new()
        .address(&va, va_value)
        .intent(query.intent());
    if let (Some(alias), Some(value)) = (&alias, alias_value) {
        bindings = bindings.address(alias, value);
    }
    built.bind(bindings)
}
