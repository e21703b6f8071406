//! The member-set algebra: descriptions of concrete member sets within
//! one hierarchy.
//!
//! Unlike [`CellRegion`](crate::CellRegion), which is cross-dimensional,
//! a [`MemberSet`] names members of a single hierarchy. Sets support
//! level filtering (narrowing to the members lying on one level) and
//! visitation (resolving ranges and descendants into concrete members
//! through a [`MemberReader`]).

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::CacheControlError;
use crate::member::Member;
use crate::member_cache::MemberReader;
use crate::schema::{HierarchyId, Level};

/// An enumerated member set, optionally covering all descendants of each
/// listed member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleMemberSet {
    pub(crate) members: Vec<Arc<Member>>,
    pub(crate) descendants: bool,
}

impl SimpleMemberSet {
    /// The listed members.
    pub fn members(&self) -> &[Arc<Member>] {
        &self.members
    }

    /// Whether descendants of the listed members are covered.
    pub fn descendants(&self) -> bool {
        self.descendants
    }
}

/// A bounded range of one level's members, same shape as a cell-region
/// range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMemberSet {
    pub(crate) level: Arc<Level>,
    pub(crate) lower: Option<Arc<Member>>,
    pub(crate) lower_inclusive: bool,
    pub(crate) upper: Option<Arc<Member>>,
    pub(crate) upper_inclusive: bool,
    pub(crate) descendants: bool,
}

impl RangeMemberSet {
    /// The level the bounds lie on.
    pub fn level(&self) -> &Arc<Level> {
        &self.level
    }

    /// Lower bound, if any.
    pub fn lower(&self) -> Option<&Arc<Member>> {
        self.lower.as_ref()
    }

    /// Whether the lower bound is included.
    pub fn lower_inclusive(&self) -> bool {
        self.lower_inclusive
    }

    /// Upper bound, if any.
    pub fn upper(&self) -> Option<&Arc<Member>> {
        self.upper.as_ref()
    }

    /// Whether the upper bound is included.
    pub fn upper_inclusive(&self) -> bool {
        self.upper_inclusive
    }

    /// Whether descendants of the ranged members are covered.
    pub fn descendants(&self) -> bool {
        self.descendants
    }
}

/// A union of member sets of one hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionMemberSet {
    pub(crate) items: Vec<Arc<MemberSet>>,
}

impl UnionMemberSet {
    /// The united sets.
    pub fn items(&self) -> &[Arc<MemberSet>] {
        &self.items
    }
}

/// A description of a set of concrete members within one hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSet {
    /// An enumerated list of members.
    Simple(SimpleMemberSet),
    /// A bounded range of one level's members.
    Range(RangeMemberSet),
    /// A union of sets.
    Union(UnionMemberSet),
    /// The set covering nothing; absorbing under filter and union.
    Empty,
}

impl MemberSet {
    /// The empty set.
    pub fn empty() -> Arc<Self> {
        Arc::new(MemberSet::Empty)
    }

    /// The set covering one member, optionally with its descendants.
    pub fn member(member: &Arc<Member>, descendants: bool) -> Arc<Self> {
        Arc::new(MemberSet::Simple(SimpleMemberSet {
            members: vec![Arc::clone(member)],
            descendants,
        }))
    }

    /// The set enumerating a list of members of one hierarchy.
    ///
    /// An empty list yields [`MemberSet::Empty`].
    pub fn simple(
        members: Vec<Arc<Member>>,
        descendants: bool,
    ) -> Result<Arc<Self>, CacheControlError> {
        let Some(first) = members.first() else {
            return Ok(Self::empty());
        };
        let hierarchy = first.level().hierarchy();
        for member in &members[1..] {
            if member.level().hierarchy() != hierarchy {
                return Err(CacheControlError::MixedHierarchies {
                    first: first.level().name().to_string(),
                    second: member.level().name().to_string(),
                });
            }
        }
        Ok(Arc::new(MemberSet::Simple(SimpleMemberSet {
            members,
            descendants,
        })))
    }

    /// The set covering one level's members between two bounds.
    ///
    /// Same bound rules as a cell-region range: at least one bound, an
    /// absent bound forces its inclusive flag off, present bounds share
    /// one level.
    pub fn range(
        lower: Option<&Arc<Member>>,
        lower_inclusive: bool,
        upper: Option<&Arc<Member>>,
        upper_inclusive: bool,
        descendants: bool,
    ) -> Result<Arc<Self>, CacheControlError> {
        let level = match (lower, upper) {
            (Some(lo), Some(up)) => {
                if lo.level().id() != up.level().id() {
                    return Err(CacheControlError::RangeLevelMismatch {
                        lower: lo.level().name().to_string(),
                        upper: up.level().name().to_string(),
                    });
                }
                Arc::clone(lo.level())
            }
            (Some(lo), None) => Arc::clone(lo.level()),
            (None, Some(up)) => Arc::clone(up.level()),
            (None, None) => return Err(CacheControlError::RangeWithoutBounds),
        };
        Ok(Arc::new(MemberSet::Range(RangeMemberSet {
            level,
            lower: lower.map(Arc::clone),
            lower_inclusive: lower_inclusive && lower.is_some(),
            upper: upper.map(Arc::clone),
            upper_inclusive: upper_inclusive && upper.is_some(),
            descendants,
        })))
    }

    /// The union of member sets of one hierarchy.
    ///
    /// Empty sets are absorbed; a union of nothing is empty and a union
    /// of one set is that set.
    pub fn union(sets: Vec<Arc<MemberSet>>) -> Result<Arc<Self>, CacheControlError> {
        let mut items: Vec<Arc<MemberSet>> = Vec::with_capacity(sets.len());
        for set in sets {
            match &*set {
                MemberSet::Empty => {}
                MemberSet::Union(inner) => items.extend(inner.items.iter().cloned()),
                _ => items.push(set),
            }
        }
        let mut hierarchy: Option<(HierarchyId, String)> = None;
        for item in &items {
            let Some(level) = item.level_hint() else {
                continue;
            };
            match &hierarchy {
                None => hierarchy = Some((level.hierarchy(), level.name().to_string())),
                Some((id, name)) if *id != level.hierarchy() => {
                    return Err(CacheControlError::MixedHierarchies {
                        first: name.clone(),
                        second: level.name().to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(match items.len() {
            0 => Self::empty(),
            1 => items.remove(0),
            _ => Arc::new(MemberSet::Union(UnionMemberSet { items })),
        })
    }

    /// A level identifying this set's hierarchy, if the set covers
    /// anything.
    fn level_hint(&self) -> Option<&Arc<Level>> {
        match self {
            MemberSet::Simple(s) => s.members.first().map(|m| m.level()),
            MemberSet::Range(r) => Some(&r.level),
            MemberSet::Union(u) => u.items.iter().find_map(|i| i.level_hint()),
            MemberSet::Empty => None,
        }
    }
}

/// Narrow a set to the members lying exactly on `level`.
///
/// Returns the input `Arc` unchanged when every element already
/// qualifies. Range sets that cover the level only through their
/// descendants flag are rewritten by walking bounds down one hierarchy
/// level at a time through the reader's ordered children; a present
/// bound without children at any step collapses the set to empty.
pub(crate) fn filter_member_set(
    level: &Arc<Level>,
    set: &Arc<MemberSet>,
    reader: &dyn MemberReader,
    ctx: &ExecutionContext,
) -> Result<Arc<MemberSet>, CacheControlError> {
    match &**set {
        MemberSet::Empty => Ok(Arc::clone(set)),
        MemberSet::Simple(simple) => {
            let kept: Vec<Arc<Member>> = simple
                .members
                .iter()
                .filter(|m| m.level().id() == level.id())
                .cloned()
                .collect();
            if kept.len() == simple.members.len() {
                return Ok(Arc::clone(set));
            }
            if kept.is_empty() {
                return Ok(MemberSet::empty());
            }
            Ok(Arc::new(MemberSet::Simple(SimpleMemberSet {
                members: kept,
                descendants: false,
            })))
        }
        MemberSet::Union(union) => {
            let mut unchanged = true;
            let mut filtered: Vec<Arc<MemberSet>> = Vec::with_capacity(union.items.len());
            for item in &union.items {
                let result = filter_member_set(level, item, reader, ctx)?;
                unchanged = unchanged && Arc::ptr_eq(&result, item);
                if !matches!(&*result, MemberSet::Empty) {
                    filtered.push(result);
                }
            }
            if unchanged {
                return Ok(Arc::clone(set));
            }
            match filtered.len() {
                0 => Ok(MemberSet::empty()),
                1 => Ok(filtered.remove(0)),
                _ => Ok(Arc::new(MemberSet::Union(UnionMemberSet {
                    items: filtered,
                }))),
            }
        }
        MemberSet::Range(range) => {
            if range.level.id() == level.id() {
                return Ok(Arc::clone(set));
            }
            let within_hierarchy = level.hierarchy() == range.level.hierarchy();
            if !range.descendants || !within_hierarchy || level.depth() <= range.level.depth() {
                return Ok(MemberSet::empty());
            }
            let mut lower = range.lower.clone();
            let mut upper = range.upper.clone();
            for _ in range.level.depth()..level.depth() {
                if let Some(bound) = lower.take() {
                    let children = reader
                        .children(&bound, ctx)
                        .map_err(CacheControlError::Collaborator)?;
                    match children.first() {
                        Some(first) => lower = Some(Arc::clone(first)),
                        None => return Ok(MemberSet::empty()),
                    }
                }
                if let Some(bound) = upper.take() {
                    let children = reader
                        .children(&bound, ctx)
                        .map_err(CacheControlError::Collaborator)?;
                    match children.last() {
                        Some(last) => upper = Some(Arc::clone(last)),
                        None => return Ok(MemberSet::empty()),
                    }
                }
            }
            Ok(Arc::new(MemberSet::Range(RangeMemberSet {
                level: Arc::clone(level),
                lower,
                lower_inclusive: range.lower_inclusive,
                upper,
                upper_inclusive: range.upper_inclusive,
                descendants: false,
            })))
        }
    }
}

/// Resolve a set into every concrete member it covers, in visitation
/// order.
pub(crate) fn collect_members(
    set: &MemberSet,
    reader: &dyn MemberReader,
    ctx: &ExecutionContext,
    out: &mut Vec<Arc<Member>>,
) -> Result<(), CacheControlError> {
    match set {
        MemberSet::Empty => Ok(()),
        MemberSet::Simple(simple) => {
            for member in &simple.members {
                out.push(Arc::clone(member));
                if simple.descendants {
                    collect_descendants(member, reader, ctx, out)?;
                }
            }
            Ok(())
        }
        MemberSet::Union(union) => {
            for item in &union.items {
                collect_members(item, reader, ctx, out)?;
            }
            Ok(())
        }
        MemberSet::Range(range) => {
            let members = reader
                .level_members(&range.level, ctx)
                .map_err(CacheControlError::Collaborator)?;
            for member in members {
                if !within_range(&member, range) {
                    continue;
                }
                out.push(Arc::clone(&member));
                if range.descendants {
                    collect_descendants(&member, reader, ctx, out)?;
                }
            }
            Ok(())
        }
    }
}

fn within_range(member: &Arc<Member>, range: &RangeMemberSet) -> bool {
    if let Some(lower) = &range.lower {
        match member.ordinal().cmp(&lower.ordinal()) {
            std::cmp::Ordering::Less => return false,
            std::cmp::Ordering::Equal if !range.lower_inclusive => return false,
            _ => {}
        }
    }
    if let Some(upper) = &range.upper {
        match member.ordinal().cmp(&upper.ordinal()) {
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal if !range.upper_inclusive => return false,
            _ => {}
        }
    }
    true
}

fn collect_descendants(
    member: &Arc<Member>,
    reader: &dyn MemberReader,
    ctx: &ExecutionContext,
    out: &mut Vec<Arc<Member>>,
) -> Result<(), CacheControlError> {
    let children = reader
        .children(member, ctx)
        .map_err(CacheControlError::Collaborator)?;
    for child in children {
        out.push(Arc::clone(&child));
        collect_descendants(&child, reader, ctx, out)?;
    }
    Ok(())
}
