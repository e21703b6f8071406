//! The flush engine: mapping regions and member sets to the minimal set
//! of downstream invalidations, plus the public cache-control facade.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::command::{
    AddCommand, DeleteCommand, EditContext, MemberEditCommand, MoveCommand, SetPropertiesCommand,
};
use crate::config::CacheConfig;
use crate::context::ExecutionContext;
use crate::error::CacheControlError;
use crate::member::{KeyValue, Member};
use crate::member_cache::{MemberCacheKey, MemberCacheManager};
use crate::member_set::{collect_members, filter_member_set, MemberSet};
use crate::normalize::normalized_branches;
use crate::region::{CellRegion, Dimensionality};
use crate::schema::{ColumnId, Cube, Level, Schema};
use crate::segment::{AxisConstraint, AxisValues, SegmentCacheManager};

/// The cache-control facade of one schema.
///
/// Owns the member-cache manager (and with it the global mutation lock)
/// and talks to the segment cache through its manager trait. Region
/// flushes never take the member lock; member-set flushes and edit
/// commands always do.
pub struct CacheControl {
    schema: Arc<Schema>,
    segment: Arc<dyn SegmentCacheManager>,
    members: MemberCacheManager,
    config: CacheConfig,
}

impl CacheControl {
    /// Create the cache control for a schema.
    pub fn new(
        schema: Arc<Schema>,
        segment: Arc<dyn SegmentCacheManager>,
        members: MemberCacheManager,
        config: CacheConfig,
    ) -> Self {
        Self {
            schema,
            segment,
            members,
            config,
        }
    }

    /// The schema this control serves.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The member-cache manager, for seeding and inspecting the
    /// member-navigation cache.
    pub fn member_cache(&self) -> &MemberCacheManager {
        &self.members
    }

    /// Invalidate the cached cells a region covers.
    ///
    /// The region must constrain the Measures dimension; a region over
    /// member dimensions alone cannot identify which cached aggregates it
    /// touches. The region is normalized and each resulting crossjoin
    /// branch is flushed against every aggregation store whose measures
    /// the branch mentions.
    pub fn flush(&self, region: &CellRegion) -> Result<(), CacheControlError> {
        if matches!(region, CellRegion::Empty) {
            return Ok(());
        }
        let dimensionality = region.dimensionality();
        if !dimensionality.contains_measures() {
            return Err(CacheControlError::RegionMustContainMeasures {
                dimensionality: dimensionality.to_string(),
            });
        }
        tracing::debug!(region = ?region, "flushing cell region");
        for branch in normalized_branches(region) {
            self.flush_branch(&branch)?;
        }
        Ok(())
    }

    fn flush_branch(&self, branch: &CellRegion) -> Result<(), CacheControlError> {
        let mut cubes = Vec::new();
        self.collect_measure_cubes(branch, &mut cubes);
        let (dimensions, constraints) = branch_constraints(branch);
        for cube in &cubes {
            for dimension in dimensions.iter() {
                if !cube.has_dimension(dimension.id()) {
                    return Err(CacheControlError::MemberNotFound {
                        dimension: dimension.name().to_string(),
                        cube: cube.name().to_string(),
                    });
                }
            }
            self.segment
                .flush_region(cube, &constraints)
                .map_err(CacheControlError::Collaborator)?;
            tracing::trace!(
                cube = cube.name(),
                axes = constraints.len(),
                "flushed branch against store"
            );
        }
        Ok(())
    }

    /// Flush the union of `regions`.
    ///
    /// A union that does not constrain Measures is ambiguous as to which
    /// cube's cache it affects, so it is crossed with every cube's
    /// measures region and flushed per cube; cubes lacking one of the
    /// union's dimensions are skipped.
    pub fn flush_region_list(&self, mut regions: Vec<CellRegion>) -> Result<(), CacheControlError> {
        let region = match regions.len() {
            0 => return Ok(()),
            1 => regions.remove(0),
            _ => CellRegion::union(regions)?,
        };
        if region.dimensionality().contains_measures() {
            return self.flush(&region);
        }
        for cube in self.schema.cubes() {
            let measures = CellRegion::measures(cube)?;
            if matches!(measures, CellRegion::Empty) {
                continue;
            }
            let crossed = CellRegion::crossjoin(vec![measures, region.clone()])?;
            match self.flush(&crossed) {
                Err(CacheControlError::MemberNotFound { dimension, cube }) => {
                    tracing::trace!(%dimension, %cube, "dimension not in cube, skipping");
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Remove every member a set covers from the member-navigation cache
    /// and invalidate the cells built over them.
    ///
    /// Takes the global member-cache lock for the whole operation. Native
    /// sets are not individually addressable, so the schema's native-set
    /// cache is dropped wholesale first.
    pub fn flush_member_set(&self, set: &MemberSet) -> Result<(), CacheControlError> {
        let mut cache = self.members.lock();
        let ctx = ExecutionContext::new("flush_member_set");
        let _span = ctx.enter();
        self.schema.native_registry().flush_all_native_set_cache();
        let mut members = Vec::new();
        collect_members(set, self.members.reader().as_ref(), &ctx, &mut members)?;
        tracing::debug!(members = members.len(), "flushing member set");
        let mut regions = Vec::with_capacity(members.len());
        for member in members {
            cache.remove_member(&MemberCacheKey::of(&member));
            regions.push(CellRegion::member(&member, false)?);
        }
        self.flush_region_list(regions)
    }

    /// Drop every cache attached to this control's schema: the member
    /// cache, the native-set cache, and each cube's aggregations.
    pub fn flush_schema_cache(&self) {
        self.members.with_cache(|cache| cache.clear());
        self.schema.clear_caches();
        tracing::debug!(schema = self.schema.name(), "flushed schema caches");
    }

    /// Narrow a member set to the members lying exactly on `level`.
    ///
    /// Returns the input unchanged when every element already qualifies;
    /// range sets covering the level through descendants are walked down
    /// through the member reader.
    pub fn filter(
        &self,
        level: &Arc<Level>,
        set: &Arc<MemberSet>,
    ) -> Result<Arc<MemberSet>, CacheControlError> {
        let ctx = ExecutionContext::new("filter_member_set");
        let _span = ctx.enter();
        filter_member_set(level, set, self.members.reader().as_ref(), &ctx)
    }

    /// Describe the cached segments a region touches.
    pub fn print_cache_state(
        &self,
        out: &mut dyn fmt::Write,
        region: &CellRegion,
    ) -> Result<(), CacheControlError> {
        let branches = normalized_branches(region);
        writeln!(out, "region: {:?}", region)?;
        for branch in &branches {
            let mut cubes = Vec::new();
            self.collect_measure_cubes(branch, &mut cubes);
            let (_, constraints) = branch_constraints(branch);
            for cube in &cubes {
                self.segment
                    .print_region_state(cube, &constraints, out)
                    .map_err(CacheControlError::Collaborator)?;
            }
        }
        Ok(())
    }

    /// Describing member-cache state per set is an unimplemented
    /// extension point.
    pub fn print_member_state(
        &self,
        _out: &mut dyn fmt::Write,
        _set: &MemberSet,
    ) -> Result<(), CacheControlError> {
        Err(CacheControlError::Unsupported {
            operation: "print_member_state",
        })
    }

    /// Command inserting `member` under its parent.
    pub fn add_command(
        &self,
        member: &Arc<Member>,
    ) -> Result<MemberEditCommand, CacheControlError> {
        AddCommand::new(member).map(MemberEditCommand::Add)
    }

    /// Command deleting `member` and its subtree.
    pub fn delete_command(
        &self,
        member: &Arc<Member>,
    ) -> Result<MemberEditCommand, CacheControlError> {
        DeleteCommand::for_member(member).map(MemberEditCommand::Delete)
    }

    /// Command deleting every member of a set, each with its subtree.
    pub fn delete_set_command(&self, set: &Arc<MemberSet>) -> MemberEditCommand {
        MemberEditCommand::Delete(DeleteCommand::new(set))
    }

    /// Command relinking `member` under `new_parent`.
    pub fn move_command(
        &self,
        member: &Arc<Member>,
        new_parent: &Arc<Member>,
    ) -> Result<MemberEditCommand, CacheControlError> {
        MoveCommand::new(member, new_parent).map(MemberEditCommand::Move)
    }

    /// Command setting properties on one member.
    pub fn set_property_command(
        &self,
        member: &Arc<Member>,
        properties: BTreeMap<String, String>,
    ) -> MemberEditCommand {
        MemberEditCommand::SetProperties(SetPropertiesCommand::new(
            &MemberSet::member(member, false),
            properties,
        ))
    }

    /// Command setting properties on every member of a set.
    pub fn set_property_set_command(
        &self,
        set: &Arc<MemberSet>,
        properties: BTreeMap<String, String>,
    ) -> MemberEditCommand {
        MemberEditCommand::SetProperties(SetPropertiesCommand::new(set, properties))
    }

    /// Run a member-edit command: compute the regions it invalidates,
    /// flush them, then mutate the member-navigation cache.
    ///
    /// Holds the global member-cache lock for the whole call. Each
    /// affected region is crossed with every cube's measures region and
    /// flushed; a cube lacking one of the region's dimensions is skipped,
    /// any other flush failure aborts the call before `commit` runs.
    pub fn execute(&self, mut command: MemberEditCommand) -> Result<(), CacheControlError> {
        if self.config.cube_member_cache_enabled {
            return Err(CacheControlError::EditsDisabledByConfig);
        }
        let mut cache = self.members.lock();
        let exec = ExecutionContext::new("execute_member_edit");
        let _span = exec.enter();
        let mut regions = Vec::new();
        {
            let ctx = EditContext {
                cache: &**cache,
                reader: self.members.reader().as_ref(),
                exec: &exec,
            };
            command.execute(&ctx, &mut regions)?;
        }
        for region in &regions {
            for dimension in region.dimensionality().iter() {
                tracing::trace!(dimension = dimension.name(), "flushing affected region");
                for cube in self.schema.cubes() {
                    let measures = CellRegion::measures(cube)?;
                    if matches!(measures, CellRegion::Empty) {
                        continue;
                    }
                    let crossed = CellRegion::crossjoin(vec![measures, region.clone()])?;
                    match self.flush(&crossed) {
                        Err(CacheControlError::MemberNotFound { dimension, cube }) => {
                            tracing::trace!(%dimension, %cube, "dimension not in cube, skipping");
                        }
                        other => other?,
                    }
                }
            }
        }
        command.commit(&mut **cache)
    }

    /// Record the cubes whose measures a region mentions, deduplicated by
    /// store identity in discovery order.
    fn collect_measure_cubes(&self, region: &CellRegion, out: &mut Vec<Arc<Cube>>) {
        match region {
            CellRegion::Member(member_region) if member_region.dimension().is_measures() => {
                for measure in member_region.members() {
                    let Some(cube) = self.schema.cube_for_measure(measure.id()) else {
                        tracing::trace!(
                            measure = %measure.unique_name(),
                            "measure not registered with any cube"
                        );
                        continue;
                    };
                    if !out.iter().any(|c| c.store().id() == cube.store().id()) {
                        out.push(Arc::clone(cube));
                    }
                }
            }
            CellRegion::Crossjoin(crossjoin) => {
                for component in crossjoin.components() {
                    self.collect_measure_cubes(component, out);
                }
            }
            CellRegion::Union(union) => {
                for alternative in union.regions() {
                    self.collect_measure_cubes(alternative, out);
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct Axis {
    wildcard: bool,
    values: BTreeSet<KeyValue>,
}

/// Translate the non-measure atomic sub-regions of a normalized branch
/// into axis constraints, and report the dimensions they constrain.
///
/// A member region contributes, per key column met while walking each
/// member's ancestry up to (and excluding) the "all" member, the sorted
/// set of key values seen; a range always widens its level's column to a
/// wildcard rather than being narrowed to literal values.
fn branch_constraints(branch: &CellRegion) -> (Dimensionality, Vec<AxisConstraint>) {
    let mut dimensions = Dimensionality::empty();
    let mut axes: BTreeMap<ColumnId, Axis> = BTreeMap::new();
    walk_branch(branch, &mut dimensions, &mut axes);
    let constraints = axes
        .into_iter()
        .map(|(column, axis)| {
            let only_all = axis.values.iter().all(|v| matches!(v, KeyValue::All));
            let values = if axis.wildcard || only_all {
                AxisValues::Wildcard
            } else {
                AxisValues::Values(axis.values.into_iter().collect())
            };
            AxisConstraint { column, values }
        })
        .collect();
    (dimensions, constraints)
}

fn walk_branch(
    region: &CellRegion,
    dimensions: &mut Dimensionality,
    axes: &mut BTreeMap<ColumnId, Axis>,
) {
    match region {
        CellRegion::Member(member_region) => {
            if member_region.dimension().is_measures() {
                return;
            }
            *dimensions = dimensions.union(&Dimensionality::of(member_region.dimension()));
            for member in member_region.members() {
                let mut current = Some(Arc::clone(member));
                while let Some(m) = current {
                    if m.is_all() {
                        break;
                    }
                    axes.entry(m.level().key_column())
                        .or_default()
                        .values
                        .insert(m.key().clone());
                    current = m.parent();
                }
            }
        }
        CellRegion::Range(range) => {
            if range.level().dimension().is_measures() {
                return;
            }
            *dimensions = dimensions.union(&Dimensionality::of(range.level().dimension()));
            axes.entry(range.level().key_column()).or_default().wildcard = true;
        }
        CellRegion::Crossjoin(crossjoin) => {
            for component in crossjoin.components() {
                walk_branch(component, dimensions, axes);
            }
        }
        CellRegion::Union(_) => unreachable!("unions are distributed before flushing"),
        CellRegion::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::tests::model;

    #[test]
    fn member_region_constrains_ancestor_columns() {
        let m = model();
        let region = CellRegion::member(&m.q1, false).unwrap();
        let (dimensions, constraints) = branch_constraints(&region);
        assert!(dimensions.contains(m.time.id()));
        // Q1's own column plus its year's column.
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].column, m.year.key_column());
        assert_eq!(
            constraints[0].values,
            AxisValues::Values(vec![KeyValue::Int(1997)])
        );
        assert_eq!(constraints[1].column, m.quarter.key_column());
        assert_eq!(
            constraints[1].values,
            AxisValues::Values(vec![KeyValue::Str("Q1".to_string())])
        );
    }

    #[test]
    fn range_region_widens_its_column_to_wildcard() {
        let m = model();
        let region =
            CellRegion::member_range(Some(&m.y1997), true, Some(&m.y1998), true, false).unwrap();
        let (_, constraints) = branch_constraints(&region);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].column, m.year.key_column());
        assert_eq!(constraints[0].values, AxisValues::Wildcard);
    }

    #[test]
    fn all_marker_only_column_becomes_wildcard() {
        let m = model();
        let degenerate = Arc::new(crate::member::Member::new(
            crate::member::MemberId(99),
            "1997",
            KeyValue::All,
            m.year.clone(),
            None,
        ));
        let region = CellRegion::member(&degenerate, false).unwrap();
        let (_, constraints) = branch_constraints(&region);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].values, AxisValues::Wildcard);
    }

    #[test]
    fn values_are_sorted_and_deduplicated() {
        let m = model();
        let region = CellRegion::member_list(vec![
            m.y1998.clone(),
            m.y1997.clone(),
            m.y1998.clone(),
        ])
        .unwrap();
        let (_, constraints) = branch_constraints(&region);
        assert_eq!(
            constraints[0].values,
            AxisValues::Values(vec![KeyValue::Int(1997), KeyValue::Int(1998)])
        );
    }
}
