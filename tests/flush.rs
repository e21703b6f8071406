//! Flush-engine behavior against the recording collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use cube_flush::{
    AxisValues, CacheControlError, CellRegion, ChildrenConstraint, KeyValue, MemberCacheKey,
    MemberSet,
};

use common::fixture;

#[test]
fn empty_region_flush_is_a_no_op() {
    let f = fixture();
    f.control.flush(&CellRegion::Empty).unwrap();
    assert!(f.segment.flushes.lock().is_empty());
}

#[test]
fn flush_requires_the_measures_dimension() {
    let f = fixture();
    let region = CellRegion::member(&f.y1997, false).unwrap();
    assert!(matches!(
        f.control.flush(&region),
        Err(CacheControlError::RegionMustContainMeasures { .. })
    ));
    assert!(f.segment.flushes.lock().is_empty());
}

#[test]
fn crossed_with_measures_flush_succeeds() {
    let f = fixture();
    let sales = &f.schema.cubes()[0];
    let region = CellRegion::crossjoin(vec![
        CellRegion::measures(sales).unwrap(),
        CellRegion::member(&f.q1, false).unwrap(),
    ])
    .unwrap();
    f.control.flush(&region).unwrap();

    let flushes = f.segment.flushes.lock();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].cube, "Sales");
    // Q1 constrains its own column and its year's column; the all member
    // above the year contributes nothing.
    let constraints = &flushes[0].constraints;
    assert_eq!(constraints.len(), 2);
    assert_eq!(constraints[0].column, f.year.key_column());
    assert_eq!(
        constraints[0].values,
        AxisValues::Values(vec![KeyValue::Int(1997)])
    );
    assert_eq!(constraints[1].column, f.quarter.key_column());
    assert_eq!(
        constraints[1].values,
        AxisValues::Values(vec![KeyValue::Str("Q1".to_string())])
    );
}

#[test]
fn range_flushes_as_a_wildcard_axis() {
    let f = fixture();
    let sales = &f.schema.cubes()[0];
    let region = CellRegion::crossjoin(vec![
        CellRegion::measures(sales).unwrap(),
        CellRegion::member_range(Some(&f.q1), true, Some(&f.q4), true, false).unwrap(),
    ])
    .unwrap();
    f.control.flush(&region).unwrap();

    let flushes = f.segment.flushes.lock();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].constraints.len(), 1);
    assert_eq!(flushes[0].constraints[0].column, f.quarter.key_column());
    assert_eq!(flushes[0].constraints[0].values, AxisValues::Wildcard);
}

#[test]
fn union_flushes_one_call_per_branch() {
    let f = fixture();
    let sales = &f.schema.cubes()[0];
    let region = CellRegion::crossjoin(vec![
        CellRegion::measures(sales).unwrap(),
        CellRegion::union(vec![
            CellRegion::member(&f.y1997, false).unwrap(),
            CellRegion::member(&f.y1998, false).unwrap(),
        ])
        .unwrap(),
    ])
    .unwrap();
    f.control.flush(&region).unwrap();
    assert_eq!(f.segment.flushes.lock().len(), 2);
}

#[test]
fn region_list_without_measures_expands_across_cubes() {
    let f = fixture();
    let region = CellRegion::member(&f.y1997, false).unwrap();
    f.control.flush_region_list(vec![region]).unwrap();

    // Time applies to both cubes: exactly one flush per cube, each
    // carrying the year constraint.
    assert_eq!(f.segment.cube_names(), vec!["Sales", "Warehouse"]);
    for call in f.segment.flushes.lock().iter() {
        assert_eq!(call.constraints.len(), 1);
        assert_eq!(
            call.constraints[0].values,
            AxisValues::Values(vec![KeyValue::Int(1997)])
        );
    }
}

#[test]
fn region_list_skips_cubes_lacking_the_dimension() {
    let f = fixture();
    let region = CellRegion::member(&f.gender_m, false).unwrap();
    f.control.flush_region_list(vec![region]).unwrap();

    // Warehouse has no Gender dimension; only Sales is flushed.
    assert_eq!(f.segment.cube_names(), vec!["Sales"]);
}

#[test]
fn region_list_with_measures_flushes_directly() {
    let f = fixture();
    let sales = &f.schema.cubes()[0];
    let region = CellRegion::crossjoin(vec![
        CellRegion::measures(sales).unwrap(),
        CellRegion::member(&f.y1997, false).unwrap(),
    ])
    .unwrap();
    f.control.flush_region_list(vec![region]).unwrap();
    assert_eq!(f.segment.cube_names(), vec!["Sales"]);
}

#[test]
fn collaborator_failures_propagate() {
    let f = fixture();
    let failing = common::FailingSegmentCache;
    let control = cube_flush::CacheControl::new(
        f.schema.clone(),
        Arc::new(failing),
        cube_flush::MemberCacheManager::new(
            Box::new(cube_flush::HashMemberCache::new()),
            f.control.member_cache().reader().clone(),
        ),
        Default::default(),
    );
    let sales = &f.schema.cubes()[0];
    let region = CellRegion::crossjoin(vec![
        CellRegion::measures(sales).unwrap(),
        CellRegion::member(&f.y1997, false).unwrap(),
    ])
    .unwrap();
    assert!(matches!(
        control.flush(&region),
        Err(CacheControlError::Collaborator(_))
    ));
}

#[test]
fn member_set_flush_drops_members_and_native_sets() {
    let f = fixture();
    // Seed the member cache with Q1 and Q2.
    f.control.member_cache().with_cache(|cache| {
        cache.put_member(MemberCacheKey::of(&f.q1), f.q1.clone());
        cache.put_member(MemberCacheKey::of(&f.q2), f.q2.clone());
    });

    let set = MemberSet::simple(vec![f.q1.clone(), f.q2.clone()], false).unwrap();
    f.control.flush_member_set(&set).unwrap();

    assert_eq!(f.native.flushed.load(Ordering::SeqCst), 1);
    f.control.member_cache().with_cache(|cache| {
        assert!(cache.member(&MemberCacheKey::of(&f.q1)).is_none());
        assert!(cache.member(&MemberCacheKey::of(&f.q2)).is_none());
    });
    // The accumulated single-member regions union on Time and expand
    // across both cubes, one branch per member.
    assert_eq!(
        f.segment.cube_names(),
        vec!["Sales", "Sales", "Warehouse", "Warehouse"]
    );
}

#[test]
fn member_set_flush_resolves_descendants() {
    let f = fixture();
    f.control.member_cache().with_cache(|cache| {
        cache.put_member(MemberCacheKey::of(&f.q3), f.q3.clone());
    });
    let set = MemberSet::member(&f.y1997, true);
    f.control.flush_member_set(&set).unwrap();
    // Q3 is a descendant of 1997 and gets evicted with it.
    f.control.member_cache().with_cache(|cache| {
        assert!(cache.member(&MemberCacheKey::of(&f.q3)).is_none());
    });
}

#[test]
fn schema_cache_flush_clears_every_layer() {
    let f = fixture();
    f.control.member_cache().with_cache(|cache| {
        cache.put_member(MemberCacheKey::of(&f.q1), f.q1.clone());
        cache.put_children(
            &f.y1997,
            ChildrenConstraint::Unconstrained,
            vec![f.q1.clone()],
        );
    });
    f.control.flush_schema_cache();

    f.control.member_cache().with_cache(|cache| {
        assert!(cache.member(&MemberCacheKey::of(&f.q1)).is_none());
        assert!(cache
            .children(&f.y1997, &ChildrenConstraint::Unconstrained)
            .is_none());
    });
    assert_eq!(f.native.flushed.load(Ordering::SeqCst), 1);
    assert_eq!(f.sales_store.cleared.load(Ordering::SeqCst), 1);
    assert_eq!(f.warehouse_store.cleared.load(Ordering::SeqCst), 1);
}

#[test]
fn print_cache_state_describes_each_store() {
    let f = fixture();
    let sales = &f.schema.cubes()[0];
    let region = CellRegion::crossjoin(vec![
        CellRegion::measures(sales).unwrap(),
        CellRegion::member(&f.y1997, false).unwrap(),
    ])
    .unwrap();
    let mut out = String::new();
    f.control.print_cache_state(&mut out, &region).unwrap();
    assert!(out.starts_with("region:"));
    assert!(out.contains("cube Sales: 1 axes"));
}

#[test]
fn print_member_state_is_explicitly_unsupported() {
    let f = fixture();
    let mut out = String::new();
    let set = MemberSet::member(&f.q1, false);
    assert!(matches!(
        f.control.print_member_state(&mut out, &set),
        Err(CacheControlError::Unsupported { .. })
    ));
}
