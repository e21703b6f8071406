//! The member-navigation cache seam: cache keys, the cache and reader
//! traits, an in-memory cache, and the manager owning the global lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::context::ExecutionContext;
use crate::member::{KeyValue, Member, MemberId};
use crate::schema::{Level, LevelId};

/// Cache key of one member: its level, its parent, and its key value.
///
/// Derived from the member's current parent link, so a moved member keys
/// differently before and after the move, which is why delete
/// bookkeeping captures the key it needs before the relink happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberCacheKey {
    level: LevelId,
    parent: Option<MemberId>,
    key: KeyValue,
}

impl MemberCacheKey {
    /// Build a key from its parts.
    pub fn new(level: LevelId, parent: Option<MemberId>, key: KeyValue) -> Self {
        Self { level, parent, key }
    }

    /// The key under which the member is currently cached.
    pub fn of(member: &Member) -> Self {
        Self {
            level: member.level().id(),
            parent: member.parent().map(|p| p.id()),
            key: member.key().clone(),
        }
    }
}

/// Which children-list cache entry a lookup or store refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildrenConstraint {
    /// The full, ordered children list.
    Unconstrained,
    /// A children list narrowed to one child name.
    ByName(String),
}

/// The member-navigation cache.
///
/// Storage layout and eviction are the implementation's business; this
/// trait is the narrow surface the flush engine and the edit commands
/// mutate through. All calls happen under the [`MemberCacheManager`]
/// lock, so implementations need no internal synchronization.
pub trait MemberCache: Send {
    /// Look up a member by cache key.
    fn member(&self, key: &MemberCacheKey) -> Option<Arc<Member>>;

    /// Insert a member under its cache key.
    fn put_member(&mut self, key: MemberCacheKey, member: Arc<Member>);

    /// Remove a member by cache key, returning it if it was cached.
    fn remove_member(&mut self, key: &MemberCacheKey) -> Option<Arc<Member>>;

    /// Look up a cached children list of `parent`.
    fn children(
        &self,
        parent: &Member,
        constraint: &ChildrenConstraint,
    ) -> Option<Vec<Arc<Member>>>;

    /// Cache a children list of `parent`.
    fn put_children(
        &mut self,
        parent: &Member,
        constraint: ChildrenConstraint,
        children: Vec<Arc<Member>>,
    );

    /// Drop one cached children list of `parent`.
    fn remove_children(&mut self, parent: &Member, constraint: &ChildrenConstraint);

    /// Drop every name-constrained children list of `parent`, keeping the
    /// unconstrained list.
    fn drop_constrained_children(&mut self, parent: &Member);

    /// Look up a cached members list of `level`.
    fn level_members(
        &self,
        level: &Level,
        constraint: &ChildrenConstraint,
    ) -> Option<Vec<Arc<Member>>>;

    /// Cache a members list of `level`.
    fn put_level_members(
        &mut self,
        level: &Level,
        constraint: ChildrenConstraint,
        members: Vec<Arc<Member>>,
    );

    /// Drop everything.
    fn clear(&mut self);
}

/// A plain hash-map member cache.
#[derive(Default)]
pub struct HashMemberCache {
    members: HashMap<MemberCacheKey, Arc<Member>>,
    children: HashMap<(MemberId, ChildrenConstraint), Vec<Arc<Member>>>,
    level_members: HashMap<(LevelId, ChildrenConstraint), Vec<Arc<Member>>>,
}

impl HashMemberCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemberCache for HashMemberCache {
    fn member(&self, key: &MemberCacheKey) -> Option<Arc<Member>> {
        self.members.get(key).cloned()
    }

    fn put_member(&mut self, key: MemberCacheKey, member: Arc<Member>) {
        self.members.insert(key, member);
    }

    fn remove_member(&mut self, key: &MemberCacheKey) -> Option<Arc<Member>> {
        self.members.remove(key)
    }

    fn children(
        &self,
        parent: &Member,
        constraint: &ChildrenConstraint,
    ) -> Option<Vec<Arc<Member>>> {
        self.children
            .get(&(parent.id(), constraint.clone()))
            .cloned()
    }

    fn put_children(
        &mut self,
        parent: &Member,
        constraint: ChildrenConstraint,
        children: Vec<Arc<Member>>,
    ) {
        self.children.insert((parent.id(), constraint), children);
    }

    fn remove_children(&mut self, parent: &Member, constraint: &ChildrenConstraint) {
        self.children.remove(&(parent.id(), constraint.clone()));
    }

    fn drop_constrained_children(&mut self, parent: &Member) {
        self.children.retain(|(id, constraint), _| {
            *id != parent.id() || *constraint == ChildrenConstraint::Unconstrained
        });
    }

    fn level_members(
        &self,
        level: &Level,
        constraint: &ChildrenConstraint,
    ) -> Option<Vec<Arc<Member>>> {
        self.level_members
            .get(&(level.id(), constraint.clone()))
            .cloned()
    }

    fn put_level_members(
        &mut self,
        level: &Level,
        constraint: ChildrenConstraint,
        members: Vec<Arc<Member>>,
    ) {
        self.level_members.insert((level.id(), constraint), members);
    }

    fn clear(&mut self) {
        self.members.clear();
        self.children.clear();
        self.level_members.clear();
    }
}

/// Source of ordered member navigation data.
///
/// Implementations typically read the warehouse; the execution context
/// attributes that work to the triggering cache operation.
pub trait MemberReader: Send + Sync {
    /// The ordered children of a member.
    fn children(
        &self,
        member: &Member,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<Vec<Arc<Member>>>;

    /// The ordered members of a level.
    fn level_members(
        &self,
        level: &Level,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<Vec<Arc<Member>>>;
}

/// Owner of the member-navigation cache and of the one lock serializing
/// every structural mutation of it.
///
/// The cache's invariants (parent/children consistency, level-members
/// consistency, key-to-member mapping) span multiple entries that must
/// change as one unit, so mutation is all-or-nothing under a single
/// non-reentrant mutex rather than per-entry locks. Region-based cell
/// flushes never take this lock.
pub struct MemberCacheManager {
    cache: Mutex<Box<dyn MemberCache>>,
    reader: Arc<dyn MemberReader>,
}

impl MemberCacheManager {
    /// Create a manager over a cache implementation and a reader.
    pub fn new(cache: Box<dyn MemberCache>, reader: Arc<dyn MemberReader>) -> Self {
        Self {
            cache: Mutex::new(cache),
            reader,
        }
    }

    /// Acquire the global lock, blocking until it is free.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn MemberCache>> {
        self.cache.lock()
    }

    /// The reader navigation queries go through.
    pub fn reader(&self) -> &Arc<dyn MemberReader> {
        &self.reader
    }

    /// Run a closure against the cache under the global lock. This is how
    /// the surrounding engine seeds or inspects cache entries.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut dyn MemberCache) -> R) -> R {
        let mut guard = self.cache.lock();
        f(&mut **guard)
    }
}
