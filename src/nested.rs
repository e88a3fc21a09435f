//! Scenarios for nested paging under a hypervisor.
//!
//! Stage 1 (guest page table, VA to IPA) may alias; stage 2 (hypervisor table, IPA to PA)
//! forbids it. The frame's RO and NX bits are the OR of every bit declared for it by either stage
//! through either alias, and access is granted by the stage-2 bits.

use crate::address::{Address, Space};
use crate::alias;
use crate::constraint::ConstraintSet;
use crate::evaluator::{Bindings, Bound, Built, Evaluation, Query};
use crate::invariant::{self, AccessQuery};
use crate::model::{Model, Paging};
use crate::permission::Flag;
use crate::CheckError;

/// Expected: sat.
pub fn basic_mapping(model: &Model<'_>, va: u64) -> Result<Evaluation, CheckError> {
    Ok(plan_basic_mapping(model, va)?.run())
}

/// Two VAs alias one IPA with different stage-1 RO bits.
///
/// Expected: sat, since the least-privilege combination absorbs the difference instead of letting
/// it reach the frame.
pub fn alias_mapping(model: &Model<'_>, va: u64, alias: u64) -> Result<Evaluation, CheckError> {
    Ok(plan_alias_mapping(model, va, alias)?.run())
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

/// Two distinct IPAs land on the same frame despite the stage-2 no-alias rule. Expected: unsat.
pub fn stage2_alias(model: &Model<'_>, ipa: u64, alias: u64) -> Result<Evaluation, CheckError> {
    Ok(plan_stage2_alias(model, ipa, alias)?.run())
}

fn access(
    model: &Model<'_>,
    query: AccessQuery,
    va: u64,
    alias: Option<u64>,
) -> Result<Evaluation, CheckError> {
    Ok(plan_access(model, query, va, alias)?.run())
}

struct Symbols<'ctx> {
    va: Address<'ctx>,
    alias: Option<Address<'ctx>>,
    ipa: Address<'ctx>,
    pa: Address<'ctx>,
}

impl<'ctx> Symbols<'ctx> {
    fn declare(model: &Model<'ctx>, with_alias: bool) -> Self {
        Symbols {
            va: model.address(Space::Virtual, "va"),
            alias: with_alias.then(|| model.address(Space::Virtual, "va1")),
            ipa: model.address(Space::Intermediate, "ipa"),
            pa: model.address(Space::Physical, "pa"),
        }
    }

    fn members(&self) -> Vec<Address<'ctx>> {
        std::iter::once(self.va.clone())
            .chain(self.alias.clone())
            .collect()
    }
}

/// Probe every address of the translation chain and the bits each layer holds for it.
fn probe_chain<'m, 'ctx>(
    model: &'m Model<'ctx>,
    mut built: Built<'m, 'ctx>,
    symbols: &Symbols<'ctx>,
) -> Result<Built<'m, 'ctx>, CheckError> {
    for member in symbols.members() {
        built = built.probe_address(&member).probe_flags(&member)?;
    }
    let ipa_of_va = model.stage1().apply(&symbols.va)?;
    built = built
        .probe_address(&symbols.ipa)
        .probe_flags(&ipa_of_va)?
        .probe_address(&symbols.pa)
        .probe_flags(&model.resolve(&symbols.va)?)?;
    Ok(built)
}

pub(crate) fn plan_basic_mapping<'m, 'ctx>(
    model: &'m Model<'ctx>,
    va: u64,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Nested)?;
    let va_value = model.literal(va)?;

    let symbols = Symbols::declare(model, false);
    let members = symbols.members();
    let built = Query::new(model, "nested::basic_mapping").build([
        invariant::nested_translation(model, &members, &symbols.ipa, &symbols.pa)?,
        invariant::nested_least_privilege(model, &members)?,
    ])?;
    let built = probe_chain(model, built, &symbols)?;
    built.bind(Bindings::new().address(&symbols.va, va_value))
}

pub(crate) fn plan_alias_mapping<'m, 'ctx>(
    model: &'m Model<'ctx>,
    va: u64,
    alias: u64,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Nested)?;
    let (va_value, alias_value) = model.literal_pair(va, alias)?;

    let symbols = Symbols::declare(model, true);
    let members = symbols.members();
    let built = Query::new(model, "nested::alias_mapping").build([
        invariant::nested_translation(model, &members, &symbols.ipa, &symbols.pa)?,
        invariant::nested_least_privilege(model, &members)?,
        invariant::diverging_declarations(model, Flag::ReadOnly, &members[0], &members[1])?,
    ])?;
    let built = probe_chain(model, built, &symbols)?;
    built.bind(
        Bindings::new()
            .address(&members[0], va_value)
            .address(&members[1], alias_value),
    )
}

pub(crate) fn plan_access<'m, 'ctx>(
    model: &'m Model<'ctx>,
    query: AccessQuery,
    va: u64,
    alias: Option<u64>,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Nested)?;
    let (va_value, alias_value) = match alias {
        Some(alias) => {
            let (va_value, alias_value) = model.literal_pair(va, alias)?;
            (va_value, Some(alias_value))
        }
        None => (model.literal(va)?, None),
    };

    let symbols = Symbols::declare(model, alias_value.is_some());
    let members = symbols.members();
    let built = Query::new(model, format!("nested::{query}"))
        .build([
            invariant::nested_wx(model, &members, &symbols.ipa, &symbols.pa)?,
            invariant::access_query(model, query, &symbols.va, symbols.alias.as_ref())?,
        ])?
        .probe_intent();
    let built = probe_chain(model, built, &symbols)?;

    let mut bindings = Bindings::new()
        .address(&symbols.va, va_value)
        .intent(query.intent());
    if let (Some(alias), Some(value)) = (&symbols.alias, alias_value) {
        bindings = bindings.address(alias, value);
    }
    built.bind(bindings)
}

pub(crate) fn plan_stage2_alias<'m, 'ctx>(
    model: &'m Model<'ctx>,
    ipa: u64,
    alias: u64,
) -> Result<Bound<'m, 'ctx>, CheckError> {
    model.require(Paging::Nested)?;
    let (ipa_value, alias_value) = model.literal_pair(ipa, alias)?;

    let ipa = model.address(Space::Intermediate, "ipa");
    let alias = model.address(Space::Intermediate, "ipa1");
    let pa = model.address(Space::Physical, "pa");
    let ipas = [ipa.clone(), alias.clone()];
    let stage2 = model.stage2()?;

    let mut mapping = ConstraintSet::new("mapping");
    let (label, assertion) = stage2.maps_to(&ipa, &pa)?;
    mapping.assert(label, assertion);
    mapping.assert(
        pa.alignment_label(model.page_size()),
        pa.page_aligned(model.page_size()),
    );

    // The collision is the question being asked, not a modeling claim, so it is not recorded as
    // an alias of the pair.
    let mut collision = ConstraintSet::new("query");
    let (label, assertion) = stage2.maps_to(&alias, &pa)?;
    collision.assert(label, assertion);

    let built = Query::new(model, "nested::stage2_alias")
        .build([
            alias::distinct(&ipas)?,
            alias::aligned(&ipas, model.page_size()),
            mapping,
            alias::forbid_aliasing(stage2, &ipas)?,
            collision,
        ])?
        .probe_address(&ipa)
        .probe_address(&alias)
        .probe_address(&pa);
    built.bind(
        Bindings::new()
            .address(&ipa, ipa_value)
            .address(&alias, alias_value),
    )
}
