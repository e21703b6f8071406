//! The cell-region algebra: algebraic descriptions of cached cell sets.
//!
//! A [`CellRegion`] describes a set of aggregated-cell coordinates over
//! the dimensions of a schema. Regions are immutable value trees built
//! bottom-up from members and ranges, composed by crossjoin and union,
//! and validated at construction so that no ill-formed region ever
//! escapes. Composite regions hold their children behind `Arc` so that
//! normalization can rebuild trees while physically reusing untouched
//! subtrees.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CacheControlError;
use crate::member::Member;
use crate::schema::{Cube, Dimension, DimensionId, Level};

/// The set of dimensions a region constrains.
///
/// Order-irrelevant; iteration is by dimension id for deterministic
/// diagnostics.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Dimensionality(BTreeMap<DimensionId, Arc<Dimension>>);

impl Dimensionality {
    /// The empty dimensionality.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The dimensionality constraining exactly one dimension.
    pub fn of(dimension: &Arc<Dimension>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(dimension.id(), Arc::clone(dimension));
        Self(map)
    }

    /// Number of dimensions constrained.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no dimension is constrained.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the given dimension is constrained.
    pub fn contains(&self, id: DimensionId) -> bool {
        self.0.contains_key(&id)
    }

    /// Whether the Measures dimension is constrained.
    pub fn contains_measures(&self) -> bool {
        self.0.values().any(|d| d.is_measures())
    }

    /// Whether any dimension is constrained by both sets.
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.keys().any(|id| other.0.contains_key(id))
    }

    /// The union of two dimensionalities.
    pub fn union(&self, other: &Self) -> Self {
        let mut map = self.0.clone();
        for (id, dimension) in &other.0 {
            map.insert(*id, Arc::clone(dimension));
        }
        Self(map)
    }

    /// Iterate over the constrained dimensions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Dimension>> {
        self.0.values()
    }
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dimension) in self.0.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dimension.name())?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An enumerated-member region: a list of members of one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRegion {
    pub(crate) members: Vec<Arc<Member>>,
    pub(crate) dimension: Arc<Dimension>,
}

impl MemberRegion {
    /// The members enumerated by this region.
    pub fn members(&self) -> &[Arc<Member>] {
        &self.members
    }

    /// The dimension all members belong to.
    pub fn dimension(&self) -> &Arc<Dimension> {
        &self.dimension
    }
}

/// A range region: the members of one level between two bounds,
/// optionally with all their descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRangeRegion {
    pub(crate) level: Arc<Level>,
    pub(crate) lower: Option<Arc<Member>>,
    pub(crate) lower_inclusive: bool,
    pub(crate) upper: Option<Arc<Member>>,
    pub(crate) upper_inclusive: bool,
    pub(crate) descendants: bool,
}

impl MemberRangeRegion {
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

    /// Whether descendants of the ranged members are included.
    pub fn descendants(&self) -> bool {
        self.descendants
    }
}

/// A crossjoin region: the cartesian product of regions constraining
/// pairwise-disjoint dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossjoinRegion {
    pub(crate) components: Vec<Arc<CellRegion>>,
}

impl CrossjoinRegion {
    /// The components of this crossjoin. Never themselves crossjoins.
    pub fn components(&self) -> &[Arc<CellRegion>] {
        &self.components
    }
}

/// A union region: alternatives sharing one dimensionality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionRegion {
    pub(crate) regions: Vec<Arc<CellRegion>>,
}

impl UnionRegion {
    /// The alternatives of this union.
    pub fn regions(&self) -> &[Arc<CellRegion>] {
        &self.regions
    }
}

/// A description of a set of cached aggregated-cell coordinates.
///
/// Build regions through the constructors ([`CellRegion::member`],
/// [`CellRegion::crossjoin`], ...); they enforce the variant invariants
/// at creation time. The enum is open for matching but its payloads can
/// only be read, so an ill-formed region cannot be assembled by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRegion {
    /// An enumerated list of members of one dimension.
    Member(MemberRegion),
    /// A bounded range of one level's members.
    Range(MemberRangeRegion),
    /// A cartesian product over disjoint dimensions.
    Crossjoin(CrossjoinRegion),
    /// Alternatives sharing one dimensionality.
    Union(UnionRegion),
    /// The region constraining nothing.
    Empty,
}

impl CellRegion {
    /// A region covering a single member, or, with `descendants`, the
    /// member and everything below it (the degenerate range `[m, m]`).
    pub fn member(member: &Arc<Member>, descendants: bool) -> Result<Self, CacheControlError> {
        if descendants {
            Self::member_range(Some(member), true, Some(member), true, true)
        } else {
            Self::member_list(vec![Arc::clone(member)])
        }
    }

    /// A region enumerating a non-empty list of members of one dimension.
    pub fn member_list(members: Vec<Arc<Member>>) -> Result<Self, CacheControlError> {
        let first = members.first().ok_or(CacheControlError::EmptyMemberList)?;
        let dimension = Arc::clone(first.level().dimension());
        for member in &members[1..] {
            let other = member.level().dimension();
            if other.id() != dimension.id() {
                return Err(CacheControlError::MixedDimensions {
                    first: dimension.name().to_string(),
                    second: other.name().to_string(),
                });
            }
        }
        Ok(CellRegion::Member(MemberRegion { members, dimension }))
    }

    /// A region covering the members of one level between two bounds.
    ///
    /// At least one bound must be present; an absent bound forces its
    /// inclusive flag to false; present bounds must share one level.
    pub fn member_range(
        lower: Option<&Arc<Member>>,
        lower_inclusive: bool,
        upper: Option<&Arc<Member>>,
        upper_inclusive: bool,
        descendants: bool,
    ) -> Result<Self, CacheControlError> {
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
        Ok(CellRegion::Range(MemberRangeRegion {
            level,
            lower: lower.map(Arc::clone),
            lower_inclusive: lower_inclusive && lower.is_some(),
            upper: upper.map(Arc::clone),
            upper_inclusive: upper_inclusive && upper.is_some(),
            descendants,
        }))
    }

    /// The cartesian product of two or more regions.
    ///
    /// Nested crossjoins are flattened. Fails with `DimensionsInCommon`
    /// if any dimension would be constrained by more than one component.
    pub fn crossjoin(regions: Vec<CellRegion>) -> Result<Self, CacheControlError> {
        if regions.len() < 2 {
            return Err(CacheControlError::TooFewRegions { got: regions.len() });
        }
        let mut components: Vec<Arc<CellRegion>> = Vec::with_capacity(regions.len());
        for region in regions {
            match region {
                CellRegion::Crossjoin(inner) => components.extend(inner.components),
                other => components.push(Arc::new(other)),
            }
        }
        // Incremental disjointness: the union must grow by exactly each
        // component's dimensionality size.
        let mut seen = Dimensionality::empty();
        for component in &components {
            let dimensionality = component.dimensionality();
            let combined = seen.union(&dimensionality);
            if combined.len() != seen.len() + dimensionality.len() {
                return Err(CacheControlError::DimensionsInCommon {
                    first: seen.to_string(),
                    second: dimensionality.to_string(),
                });
            }
            seen = combined;
        }
        Ok(CellRegion::Crossjoin(CrossjoinRegion { components }))
    }

    /// The union of two or more regions of identical dimensionality.
    pub fn union(regions: Vec<CellRegion>) -> Result<Self, CacheControlError> {
        if regions.len() < 2 {
            return Err(CacheControlError::TooFewRegions { got: regions.len() });
        }
        let expected = regions[0].dimensionality();
        for region in &regions[1..] {
            let found = region.dimensionality();
            if found != expected {
                return Err(CacheControlError::DimensionalityMismatch {
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(CellRegion::Union(UnionRegion {
            regions: regions.into_iter().map(Arc::new).collect(),
        }))
    }

    /// The region covering every measure of the given cube.
    ///
    /// Returns [`CellRegion::Empty`] for a cube without measures.
    pub fn measures(cube: &Cube) -> Result<Self, CacheControlError> {
        let dimension = cube.measures_dimension().ok_or_else(|| {
            CacheControlError::Internal(format!("cube '{}' has no measures dimension", cube.name()))
        })?;
        if cube.measures().is_empty() {
            return Ok(CellRegion::Empty);
        }
        Ok(CellRegion::Member(MemberRegion {
            members: cube.measures().to_vec(),
            dimension: Arc::clone(dimension),
        }))
    }

    /// The set of dimensions this region constrains.
    pub fn dimensionality(&self) -> Dimensionality {
        match self {
            CellRegion::Member(r) => Dimensionality::of(&r.dimension),
            CellRegion::Range(r) => Dimensionality::of(r.level.dimension()),
            CellRegion::Crossjoin(r) => r
                .components
                .iter()
                .fold(Dimensionality::empty(), |acc, c| {
                    acc.union(&c.dimensionality())
                }),
            // Construction guarantees all alternatives agree.
            CellRegion::Union(r) => r.regions[0].dimensionality(),
            CellRegion::Empty => Dimensionality::empty(),
        }
    }
}
