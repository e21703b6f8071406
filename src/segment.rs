//! The segment-cache seam: axis constraints and the manager trait.

use std::fmt;
use std::sync::Arc;

use crate::member::KeyValue;
use crate::schema::{Cube, ColumnId};

/// The values admitted on one axis of a flushed branch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisValues {
    /// The axis is unconstrained.
    Wildcard,
    /// The axis admits exactly these values, sorted and deduplicated.
    Values(Vec<KeyValue>),
}

/// Constraint on one physical key column of a flushed branch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisConstraint {
    /// The constrained column.
    pub column: ColumnId,
    /// The admitted values.
    pub values: AxisValues,
}

/// The external cache of precomputed aggregated values.
///
/// Owns its own synchronization; this core treats it as an opaque,
/// thread-safe sink and never holds the member-cache lock on its behalf.
pub trait SegmentCacheManager: Send + Sync {
    /// Invalidate every segment of `cube`'s store whose coordinates fall
    /// inside the given axis constraints.
    fn flush_region(&self, cube: &Arc<Cube>, constraints: &[AxisConstraint])
        -> anyhow::Result<()>;

    /// Describe the cached segments the given constraints would touch.
    fn print_region_state(
        &self,
        cube: &Arc<Cube>,
        constraints: &[AxisConstraint],
        out: &mut dyn fmt::Write,
    ) -> anyhow::Result<()>;
}
