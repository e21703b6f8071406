#![deny(missing_docs)]
//! Cube-Flush: precise cache invalidation for dimensional (OLAP) caches.
//!
//! An OLAP engine caches two expensive things: aggregated cell values
//! (the segment cache) and member navigation (the member cache). When
//! warehouse data changes, the engine must invalidate exactly the cached
//! state the change touches: no less, or results go stale; no more, or
//! the caches are useless. This crate is that invalidation core.
//!
//! # Key pieces
//!
//! - **[`CellRegion`]**: an algebra describing sets of cached cell
//!   coordinates: member lists, member ranges, crossjoins, unions. Built
//!   bottom-up, validated at construction, immutable and shareable.
//! - **[`normalize`]**: rewrites any region into the canonical
//!   union-of-crossjoins form, the only form that can be flushed branch
//!   by branch.
//! - **[`MemberSet`]**: describes concrete members of one hierarchy,
//!   with level filtering and visitation.
//! - **[`CacheControl`]**: the facade: flushes regions against the
//!   segment cache, flushes member sets against the member cache, and
//!   runs two-phase [`MemberEditCommand`]s that mutate cached members
//!   and invalidate the cells built over them.
//!
//! # Example
//!
//! ```ignore
//! use cube_flush::{CacheControl, CellRegion};
//!
//! // Invalidate every cached cell for measure values of 1997.
//! let region = CellRegion::crossjoin(vec![
//!     CellRegion::measures(&cube)?,
//!     CellRegion::member(&year_1997, true)?,
//! ])?;
//! control.flush(&region)?;
//! ```
//!
//! # Concurrency
//!
//! The core is synchronous and multi-threaded. One non-reentrant lock,
//! owned by [`MemberCacheManager`], serializes every structural mutation
//! of the member cache; region flushes bypass it and rely on the segment
//! cache's own synchronization.

mod command;
mod config;
mod context;
mod error;
mod flush;
mod member;
mod member_cache;
mod member_set;
mod normalize;
mod region;
mod schema;
mod segment;

pub use command::{
    AddCommand, DeleteCommand, MemberEditCommand, MoveCommand, SetPropertiesCommand,
};
pub use config::CacheConfig;
pub use context::ExecutionContext;
pub use error::CacheControlError;
pub use flush::CacheControl;
pub use member::{KeyValue, Member, MemberId};
pub use member_cache::{
    ChildrenConstraint, HashMemberCache, MemberCache, MemberCacheKey, MemberCacheManager,
    MemberReader,
};
pub use member_set::{MemberSet, RangeMemberSet, SimpleMemberSet, UnionMemberSet};
pub use normalize::normalize;
pub use region::{
    CellRegion, CrossjoinRegion, Dimensionality, MemberRangeRegion, MemberRegion, UnionRegion,
};
pub use schema::{
    AggregationStore, ColumnId, Cube, Dimension, DimensionId, HierarchyId, Level, LevelId,
    NativeRegistry, NoopNativeRegistry, Schema, SchemaKey, SchemaPool, StoreId,
};
pub use segment::{AxisConstraint, AxisValues, SegmentCacheManager};
