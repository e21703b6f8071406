//! Rewriting region expressions into canonical union-of-crossjoins form.
//!
//! Only the canonical form can be flushed branch by branch, so every
//! flush path normalizes first. The rewrite distributes crossjoin over
//! union combinatorially: an input with embedded unions of arities
//! `k_1..k_n` yields exactly `k_1 * .. * k_n` branches.

use std::sync::Arc;

use crate::region::{CellRegion, CrossjoinRegion, UnionRegion};

/// Rewrite a region into a union of crossjoins of atomic regions.
///
/// The result is always a `Union`, even for a single branch. Normalizing
/// an already-normalized region returns a structurally equal tree.
pub fn normalize(region: &CellRegion) -> CellRegion {
    CellRegion::Union(UnionRegion {
        regions: normalized_branches(region),
    })
}

/// The branches of the normalized form: each branch is an atomic region
/// or a crossjoin of atomic regions, none containing a union.
pub(crate) fn normalized_branches(region: &CellRegion) -> Vec<Arc<CellRegion>> {
    let mut branches = Vec::new();
    flatten_unions(&Arc::new(region.clone()), &mut branches);

    // Distribute embedded unions outward, one at a time. Expanding a
    // branch re-scans the same position: the substituted alternatives may
    // themselves contain further unions.
    let mut i = 0;
    while i < branches.len() {
        match distribute_first_union(&branches[i]) {
            Some(expanded) => {
                branches.splice(i..=i, expanded);
            }
            None => i += 1,
        }
    }
    branches
}

/// Collect the branches of arbitrarily nested top-level unions, in order.
fn flatten_unions(region: &Arc<CellRegion>, out: &mut Vec<Arc<CellRegion>>) {
    match &**region {
        CellRegion::Union(union) => {
            for alternative in &union.regions {
                flatten_unions(alternative, out);
            }
        }
        _ => out.push(Arc::clone(region)),
    }
}

/// Expand the first union embedded in a branch, if any.
///
/// Returns one branch copy per union alternative, with the alternative
/// substituted at the component position found during the scan; every
/// other subtree is reused. Crossjoin alternatives are spliced flat to
/// preserve the no-nested-crossjoin invariant.
fn distribute_first_union(branch: &Arc<CellRegion>) -> Option<Vec<Arc<CellRegion>>> {
    let CellRegion::Crossjoin(crossjoin) = &**branch else {
        // Atomic branches cannot embed a union; top-level unions were
        // flattened away before distribution.
        return None;
    };
    let (position, union) = crossjoin.components.iter().enumerate().find_map(
        |(i, component)| match &**component {
            CellRegion::Union(union) => Some((i, union)),
            _ => None,
        },
    )?;
    let expanded = union
        .regions
        .iter()
        .map(|alternative| {
            let mut components =
                Vec::with_capacity(crossjoin.components.len() + 1);
            components.extend_from_slice(&crossjoin.components[..position]);
            match &**alternative {
                CellRegion::Crossjoin(inner) => {
                    components.extend(inner.components.iter().cloned())
                }
                _ => components.push(Arc::clone(alternative)),
            }
            components.extend_from_slice(&crossjoin.components[position + 1..]);
            Arc::new(CellRegion::Crossjoin(CrossjoinRegion { components }))
        })
        .collect();
    Some(expanded)
}
