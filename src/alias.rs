//! Alias constraints over sets of addresses in one space.
//!
//! An alias group says "these distinct addresses share one next-stage address" (shared memory).
//! [`forbid_aliasing`] says the opposite for a stage, but only conditionally: distinct inputs must
//! resolve to distinct outputs, which never pins down unrelated addresses the way a global
//! bijection would.

use z3::ast::{Ast, BV};

use crate::address::Address;
use crate::constraint::{ConstraintSet, PairRelation};
use crate::translation::Translation;
use crate::CheckError;

fn names(addrs: &[Address<'_>]) -> String {
    addrs
        .iter()
        .map(|a| a.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn require_group(addrs: &[Address<'_>], what: &str) -> Result<(), CheckError> {
    if addrs.len() < 2 {
        return Err(CheckError::construction(format!(
            "{what} needs at least two addresses, got [{}]",
            names(addrs)
        )));
    }
    if let Some(stray) = addrs.iter().find(|a| a.space() != addrs[0].space()) {
        return Err(CheckError::construction(format!(
            "{what} mixes {} and {} addresses (`{}`)",
            addrs[0].space(),
            stray.space(),
            stray.name()
        )));
    }
    Ok(())
}

fn pairs<'a, 'ctx>(
    addrs: &'a [Address<'ctx>],
) -> impl Iterator<Item = (&'a Address<'ctx>, &'a Address<'ctx>)> {
    addrs
        .iter()
        .enumerate()
        .flat_map(move |(i, a)| addrs[i + 1..].iter().map(move |b| (a, b)))
}

/// Pairwise distinctness.
pub fn distinct<'ctx>(addrs: &[Address<'ctx>]) -> Result<ConstraintSet<'ctx>, CheckError> {
    require_group(addrs, "distinctness")?;
    let terms: Vec<&BV<'ctx>> = addrs.iter().map(|a| a.term()).collect();
    let mut set = ConstraintSet::new("distinct");
    set.assert(
        format!("distinct({})", names(addrs)),
        BV::distinct(addrs[0].term().get_ctx(), &terms),
    );
    Ok(set)
}

/// Every address in `addrs` translates to `target`.
pub fn co_map<'ctx>(
    translation: &Translation<'ctx>,
    addrs: &[Address<'ctx>],
    target: &Address<'ctx>,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    require_group(addrs, "co-mapping")?;
    let mut set = ConstraintSet::new("co_map");
    for addr in addrs {
        let (label, assertion) = translation.maps_to(addr, target)?;
        set.assert(label, assertion);
    }
    for (a, b) in pairs(addrs) {
        set.claim(translation.stage(), a.name(), b.name(), PairRelation::Alias)?;
    }
    Ok(set)
}

pub fn aligned<'ctx>(addrs: &[Address<'ctx>], page_size: u64) -> ConstraintSet<'ctx> {
    let mut set = ConstraintSet::new("align");
    for addr in addrs {
        set.assert(addr.alignment_label(page_size), addr.page_aligned(page_size));
    }
    set
}

/// `a != b => stage(a) != stage(b)` for every pair in `addrs`.
pub fn forbid_aliasing<'ctx>(
    translation: &Translation<'ctx>,
    addrs: &[Address<'ctx>],
) -> Result<ConstraintSet<'ctx>, CheckError> {
    require_group(addrs, "alias prohibition")?;
    let mut set = ConstraintSet::new("no_alias");
    for (a, b) in pairs(addrs) {
        let ta = translation.apply(a)?;
        let tb = translation.apply(b)?;
        set.assert(
            format!(
                "{} != {} => {} != {}",
                a.name(),
                b.name(),
                ta.name(),
                tb.name()
            ),
            a.equals(b).not().implies(&ta.equals(&tb).not()),
        );
        set.claim(translation.stage(), a.name(), b.name(), PairRelation::NoAlias)?;
    }
    Ok(set)
}

/// Distinct, page-aligned addresses that all translate to `target`.
pub fn alias_group<'ctx>(
    translation: &Translation<'ctx>,
    addrs: &[Address<'ctx>],
    target: &Address<'ctx>,
    page_size: u64,
) -> Result<ConstraintSet<'ctx>, CheckError> {
    let mut set = ConstraintSet::new("alias");
    set.merge(distinct(addrs)?)?;
    set.merge(co_map(translation, addrs, target)?)?;
    set.merge(aligned(addrs, page_size))?;
    Ok(set)
}
