//! Error types for region construction, flushing, and member editing.

use thiserror::Error;

/// Errors raised by the cache-control surface.
///
/// Construction-time variants (`TooFewRegions`, `DimensionsInCommon`, ...)
/// are caller errors raised before any object escapes. `MemberNotFound` is
/// the one variant that callers iterating over cubes are expected to
/// recognize and skip; it is matched by variant, never by message text.
#[derive(Debug, Error)]
pub enum CacheControlError {
    /// A crossjoin or union was built from fewer than two regions.
    #[error("at least two regions are required, got {got}")]
    TooFewRegions {
        /// Number of regions actually supplied.
        got: usize,
    },

    /// A member region was built from an empty member list.
    #[error("a member region requires at least one member")]
    EmptyMemberList,

    /// The members of a member region span more than one dimension.
    #[error("members of a region must belong to one dimension, found '{first}' and '{second}'")]
    MixedDimensions {
        /// Dimension of the first member.
        first: String,
        /// The other dimension encountered.
        second: String,
    },

    /// The members of a member set span more than one hierarchy.
    #[error("members of a set must belong to one hierarchy, found '{first}' and '{second}'")]
    MixedHierarchies {
        /// Hierarchy of the first member.
        first: String,
        /// The other hierarchy encountered.
        second: String,
    },

    /// A member range was built without any bound.
    #[error("a member range requires at least one bound")]
    RangeWithoutBounds,

    /// The bounds of a member range lie on different levels.
    #[error("range bounds must belong to one level, found '{lower}' and '{upper}'")]
    RangeLevelMismatch {
        /// Level of the lower bound.
        lower: String,
        /// Level of the upper bound.
        upper: String,
    },

    /// Two crossjoin components constrain an overlapping set of dimensions.
    #[error("crossjoin components must constrain disjoint dimensions: {first} overlaps {second}")]
    DimensionsInCommon {
        /// Dimensionality of the regions accepted so far.
        first: String,
        /// Dimensionality of the offending region.
        second: String,
    },

    /// A union was built from regions of differing dimensionality.
    #[error("union regions must share one dimensionality: expected {expected}, found {found}")]
    DimensionalityMismatch {
        /// Dimensionality of the first region.
        expected: String,
        /// Dimensionality of the offending region.
        found: String,
    },

    /// A region without the Measures dimension was handed to `flush`.
    ///
    /// Such a region cannot identify which cached aggregates it touches;
    /// the caller must cross it with a measures region first.
    #[error("flush region must contain the Measures dimension, found {dimensionality}")]
    RegionMustContainMeasures {
        /// Dimensionality of the rejected region.
        dimensionality: String,
    },

    /// A flushed region names a dimension the target cube does not have.
    ///
    /// Expected during cross-cube flush expansion; callers looping over
    /// cubes skip this variant and continue with the next cube.
    #[error("member of dimension '{dimension}' not found in cube '{cube}'")]
    MemberNotFound {
        /// Name of the dimension missing from the cube.
        dimension: String,
        /// Name of the cube being flushed.
        cube: String,
    },

    /// A set-property command covers members of more than one level.
    #[error("set-property members must lie on one level, found '{first}' and '{second}'")]
    MembersNotSameLevel {
        /// Level of the first member.
        first: String,
        /// The other level encountered.
        second: String,
    },

    /// A member of a parent-child hierarchy was handed to an edit command.
    #[error("cannot edit member '{member}' of a parent-child hierarchy")]
    ParentChildHierarchy {
        /// Unique name of the rejected member.
        member: String,
    },

    /// An add command received a member without a parent.
    #[error("cannot add root member '{member}'")]
    AddWithoutParent {
        /// Unique name of the rejected member.
        member: String,
    },

    /// A move target is not one level above the moved member, or lies in a
    /// different hierarchy.
    #[error("member '{member}' cannot move under '{new_parent}'")]
    MoveTargetMismatch {
        /// Unique name of the member being moved.
        member: String,
        /// Unique name of the rejected target parent.
        new_parent: String,
    },

    /// Member editing is rejected while the cube member cache is enabled.
    #[error("member edits are disabled while the cube member cache is enabled")]
    EditsDisabledByConfig,

    /// The operation is a documented no-op extension point.
    #[error("{operation} is not supported")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },

    /// Writing diagnostic output failed.
    #[error("failed to write cache state")]
    Format(#[from] std::fmt::Error),

    /// An invariant the engine itself maintains was broken.
    #[error("internal error: {0}")]
    Internal(String),

    /// A downstream collaborator (segment cache, member reader) failed.
    #[error("cache collaborator failure")]
    Collaborator(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_not_found_is_matched_by_variant() {
        let err = CacheControlError::MemberNotFound {
            dimension: "Gender".to_string(),
            cube: "Warehouse".to_string(),
        };
        assert!(matches!(err, CacheControlError::MemberNotFound { .. }));
    }

    #[test]
    fn messages_name_the_offenders() {
        let err = CacheControlError::DimensionsInCommon {
            first: "[Time]".to_string(),
            second: "[Time, Store]".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("[Time]"));
        assert!(message.contains("[Time, Store]"));
    }
}
