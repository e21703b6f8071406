//! Two-phase member-edit commands.
//!
//! A command computes the cell regions its edit invalidates (`execute`)
//! before the member-navigation cache is touched, then applies the edit
//! (`commit`). Work resolved during `execute`, such as the concrete
//! members of a set or the pre-move cache key, is stashed in the command
//! for `commit` to use. Commands are single-use and driven only by
//! [`CacheControl::execute`](crate::CacheControl::execute), which holds
//! the global member-cache lock across both phases.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::CacheControlError;
use crate::member::Member;
use crate::member_cache::{ChildrenConstraint, MemberCache, MemberCacheKey, MemberReader};
use crate::member_set::{collect_members, MemberSet};
use crate::region::CellRegion;
use crate::schema::Level;

/// Collaborators available while a command resolves its edit.
pub(crate) struct EditContext<'a> {
    /// The member cache, readable but not yet mutated.
    pub cache: &'a dyn MemberCache,
    /// Member navigation for resolving sets.
    pub reader: &'a dyn MemberReader,
    /// Context attributing reader I/O to this edit.
    pub exec: &'a ExecutionContext,
}

/// An edit of the member-navigation cache.
///
/// Obtained from the command constructors on
/// [`CacheControl`](crate::CacheControl) and consumed by
/// [`CacheControl::execute`](crate::CacheControl::execute).
pub enum MemberEditCommand {
    /// Insert a new member under its parent.
    Add(AddCommand),
    /// Remove a set of members and their subtrees.
    Delete(DeleteCommand),
    /// Relink a member under a new parent.
    Move(MoveCommand),
    /// Set properties on a set of members.
    SetProperties(SetPropertiesCommand),
    /// Run several commands as one unit. Not atomic: children that
    /// committed before a failure stay committed.
    Compound(Vec<MemberEditCommand>),
}

impl MemberEditCommand {
    /// Combine commands into one, executed then committed in list order.
    pub fn compound(commands: Vec<MemberEditCommand>) -> Self {
        MemberEditCommand::Compound(commands)
    }

    pub(crate) fn execute(
        &mut self,
        ctx: &EditContext<'_>,
        regions: &mut Vec<CellRegion>,
    ) -> Result<(), CacheControlError> {
        match self {
            MemberEditCommand::Add(c) => c.execute(ctx, regions),
            MemberEditCommand::Delete(c) => c.execute(ctx, regions),
            MemberEditCommand::Move(c) => c.execute(ctx, regions),
            MemberEditCommand::SetProperties(c) => c.execute(ctx, regions),
            MemberEditCommand::Compound(commands) => {
                for command in commands {
                    command.execute(ctx, regions)?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn commit(&mut self, cache: &mut dyn MemberCache) -> Result<(), CacheControlError> {
        match self {
            MemberEditCommand::Add(c) => c.commit(cache),
            MemberEditCommand::Delete(c) => c.commit(cache),
            MemberEditCommand::Move(c) => c.commit(cache),
            MemberEditCommand::SetProperties(c) => c.commit(cache),
            MemberEditCommand::Compound(commands) => {
                for command in commands {
                    command.commit(cache)?;
                }
                Ok(())
            }
        }
    }
}

fn reject_parent_child(member: &Member) -> Result<(), CacheControlError> {
    if member.level().is_parent_child() {
        return Err(CacheControlError::ParentChildHierarchy {
            member: member.unique_name(),
        });
    }
    Ok(())
}

/// Insert `member` into the caches that enumerate it: the parent's
/// unconstrained children list and the level-members list, when cached.
/// Cached lists are ordinal-ordered, so insertion keeps that order.
fn add_member_bookkeeping(cache: &mut dyn MemberCache, member: &Arc<Member>, parent: &Arc<Member>) {
    if let Some(mut children) = cache.children(parent, &ChildrenConstraint::Unconstrained) {
        insert_by_ordinal(&mut children, member);
        cache.put_children(parent, ChildrenConstraint::Unconstrained, children);
    }
    if let Some(mut members) =
        cache.level_members(member.level(), &ChildrenConstraint::Unconstrained)
    {
        insert_by_ordinal(&mut members, member);
        cache.put_level_members(member.level(), ChildrenConstraint::Unconstrained, members);
    }
    cache.put_member(MemberCacheKey::of(member), Arc::clone(member));
}

fn insert_by_ordinal(list: &mut Vec<Arc<Member>>, member: &Arc<Member>) {
    let position = list
        .iter()
        .position(|m| m.ordinal() > member.ordinal())
        .unwrap_or(list.len());
    list.insert(position, Arc::clone(member));
}

/// Splice `member` out of every cache that enumerates it. `key` is the
/// key the member was cached under, which for a moved member is not the
/// key its current parent link would produce.
fn delete_member_bookkeeping(
    cache: &mut dyn MemberCache,
    member: &Arc<Member>,
    key: &MemberCacheKey,
    parent: Option<&Arc<Member>>,
) {
    if let Some(parent) = parent {
        if let Some(mut children) = cache.children(parent, &ChildrenConstraint::Unconstrained) {
            children.retain(|c| c.id() != member.id());
            cache.put_children(parent, ChildrenConstraint::Unconstrained, children);
        }
        // Name-constrained entries may hide the removed member under any
        // name; drop them wholesale.
        cache.drop_constrained_children(parent);
    }
    if let Some(mut members) =
        cache.level_members(member.level(), &ChildrenConstraint::Unconstrained)
    {
        members.retain(|m| m.id() != member.id());
        cache.put_level_members(member.level(), ChildrenConstraint::Unconstrained, members);
    }
    cache.remove_member(key);
}

/// Insert one member under its parent.
pub struct AddCommand {
    member: Arc<Member>,
    parent: Arc<Member>,
}

impl AddCommand {
    pub(crate) fn new(member: &Arc<Member>) -> Result<Self, CacheControlError> {
        reject_parent_child(member)?;
        let parent = member
            .parent()
            .ok_or_else(|| CacheControlError::AddWithoutParent {
                member: member.unique_name(),
            })?;
        Ok(Self {
            member: Arc::clone(member),
            parent,
        })
    }

    fn execute(
        &mut self,
        _ctx: &EditContext<'_>,
        regions: &mut Vec<CellRegion>,
    ) -> Result<(), CacheControlError> {
        // A new sibling changes everything rolled up under the parent;
        // the insertion itself waits for commit.
        regions.push(CellRegion::member(&self.parent, false)?);
        Ok(())
    }

    fn commit(&mut self, cache: &mut dyn MemberCache) -> Result<(), CacheControlError> {
        add_member_bookkeeping(cache, &self.member, &self.parent);
        Ok(())
    }
}

struct PreparedDelete {
    member: Arc<Member>,
    key: MemberCacheKey,
    parent: Option<Arc<Member>>,
}

/// Remove a set of members, each with its subtree.
pub struct DeleteCommand {
    set: Arc<MemberSet>,
    prepared: Option<Vec<PreparedDelete>>,
}

impl DeleteCommand {
    pub(crate) fn new(set: &Arc<MemberSet>) -> Self {
        Self {
            set: Arc::clone(set),
            prepared: None,
        }
    }

    pub(crate) fn for_member(member: &Arc<Member>) -> Result<Self, CacheControlError> {
        reject_parent_child(member)?;
        Ok(Self::new(&MemberSet::member(member, false)))
    }

    fn execute(
        &mut self,
        ctx: &EditContext<'_>,
        regions: &mut Vec<CellRegion>,
    ) -> Result<(), CacheControlError> {
        let mut members = Vec::new();
        collect_members(&self.set, ctx.reader, ctx.exec, &mut members)?;
        let mut prepared = Vec::with_capacity(members.len());
        for member in members {
            reject_parent_child(&member)?;
            // Deleting a subtree invalidates everything under it, the
            // member included.
            regions.push(CellRegion::member(&member, true)?);
            prepared.push(PreparedDelete {
                key: MemberCacheKey::of(&member),
                parent: member.parent(),
                member,
            });
        }
        self.prepared = Some(prepared);
        Ok(())
    }

    fn commit(&mut self, cache: &mut dyn MemberCache) -> Result<(), CacheControlError> {
        for delete in self.prepared.take().unwrap_or_default() {
            delete_member_bookkeeping(cache, &delete.member, &delete.key, delete.parent.as_ref());
        }
        Ok(())
    }
}

struct PreparedMove {
    old_parent: Option<Arc<Member>>,
    old_key: MemberCacheKey,
}

/// Relink one member under a new parent.
pub struct MoveCommand {
    member: Arc<Member>,
    new_parent: Arc<Member>,
    prepared: Option<PreparedMove>,
}

impl MoveCommand {
    pub(crate) fn new(
        member: &Arc<Member>,
        new_parent: &Arc<Member>,
    ) -> Result<Self, CacheControlError> {
        reject_parent_child(member)?;
        reject_parent_child(new_parent)?;
        let level = member.level();
        let target = new_parent.level();
        if target.hierarchy() != level.hierarchy() || target.depth() + 1 != level.depth() {
            return Err(CacheControlError::MoveTargetMismatch {
                member: member.unique_name(),
                new_parent: new_parent.unique_name(),
            });
        }
        Ok(Self {
            member: Arc::clone(member),
            new_parent: Arc::clone(new_parent),
            prepared: None,
        })
    }

    fn execute(
        &mut self,
        _ctx: &EditContext<'_>,
        regions: &mut Vec<CellRegion>,
    ) -> Result<(), CacheControlError> {
        // Delete-from-old-parent plus add-under-new-parent.
        regions.push(CellRegion::member(&self.member, true)?);
        regions.push(CellRegion::member(&self.new_parent, false)?);
        self.prepared = Some(PreparedMove {
            old_parent: self.member.parent(),
            old_key: MemberCacheKey::of(&self.member),
        });
        Ok(())
    }

    fn commit(&mut self, cache: &mut dyn MemberCache) -> Result<(), CacheControlError> {
        let prepared = self.prepared.take().ok_or_else(|| {
            CacheControlError::Internal("move command committed before execute".to_string())
        })?;
        // Relink first; the delete bookkeeping then runs against the old
        // parent with the pre-move key, the add against the new parent
        // with the key the new link produces.
        self.member.set_parent(Some(Arc::clone(&self.new_parent)));
        delete_member_bookkeeping(cache, &self.member, &prepared.old_key, prepared.old_parent.as_ref());
        add_member_bookkeeping(cache, &self.member, &self.new_parent);
        Ok(())
    }
}

/// Set properties on every member of a set.
pub struct SetPropertiesCommand {
    set: Arc<MemberSet>,
    properties: BTreeMap<String, String>,
    prepared: Option<Vec<Arc<Member>>>,
}

impl SetPropertiesCommand {
    pub(crate) fn new(set: &Arc<MemberSet>, properties: BTreeMap<String, String>) -> Self {
        Self {
            set: Arc::clone(set),
            properties,
            prepared: None,
        }
    }

    fn execute(
        &mut self,
        ctx: &EditContext<'_>,
        _regions: &mut Vec<CellRegion>,
    ) -> Result<(), CacheControlError> {
        // Property changes do not invalidate aggregated cell data, so no
        // regions are contributed.
        let level = validate_same_level(&self.set)?;
        if let Some(level) = &level {
            if set_covers_descendants(&self.set) && !level.is_leaf() {
                return Err(CacheControlError::MembersNotSameLevel {
                    first: level.name().to_string(),
                    second: format!("descendants below {}", level.name()),
                });
            }
            if level.is_parent_child() {
                return Err(CacheControlError::ParentChildHierarchy {
                    member: level.name().to_string(),
                });
            }
        }
        let mut members = Vec::new();
        collect_members(&self.set, ctx.reader, ctx.exec, &mut members)?;
        self.prepared = Some(members);
        Ok(())
    }

    fn commit(&mut self, cache: &mut dyn MemberCache) -> Result<(), CacheControlError> {
        for member in self.prepared.take().unwrap_or_default() {
            // The member may have been evicted since execute; property
            // changes on a member nothing caches are a no-op.
            let Some(cached) = cache.member(&MemberCacheKey::of(&member)) else {
                continue;
            };
            for (name, value) in &self.properties {
                cached.set_property(name, value);
            }
        }
        Ok(())
    }
}

/// The single level every member of `set` lies on, or an error naming
/// the two levels that disagree. `None` for a set covering nothing.
fn validate_same_level(set: &MemberSet) -> Result<Option<Arc<Level>>, CacheControlError> {
    fn merge(
        current: Option<Arc<Level>>,
        found: &Arc<Level>,
    ) -> Result<Option<Arc<Level>>, CacheControlError> {
        match current {
            None => Ok(Some(Arc::clone(found))),
            Some(level) if level.id() == found.id() => Ok(Some(level)),
            Some(level) => Err(CacheControlError::MembersNotSameLevel {
                first: level.name().to_string(),
                second: found.name().to_string(),
            }),
        }
    }

    match set {
        MemberSet::Empty => Ok(None),
        MemberSet::Range(range) => Ok(Some(Arc::clone(range.level()))),
        MemberSet::Simple(simple) => {
            let mut level = None;
            for member in simple.members() {
                level = merge(level, member.level())?;
            }
            Ok(level)
        }
        MemberSet::Union(union) => {
            let mut level = None;
            for item in union.items() {
                if let Some(found) = validate_same_level(item)? {
                    level = merge(level, &found)?;
                }
            }
            Ok(level)
        }
    }
}

fn set_covers_descendants(set: &MemberSet) -> bool {
    match set {
        MemberSet::Empty => false,
        MemberSet::Simple(simple) => simple.descendants(),
        MemberSet::Range(range) => range.descendants(),
        MemberSet::Union(union) => union.items().iter().any(|i| set_covers_descendants(i)),
    }
}
