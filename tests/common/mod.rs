//! Shared fixture: a two-cube FoodMart-style schema with recording
//! collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use cube_flush::{
    AggregationStore, AxisConstraint, CacheConfig, CacheControl, ColumnId, Cube, Dimension,
    DimensionId, ExecutionContext, HashMemberCache, HierarchyId, KeyValue, Level, LevelId, Member,
    MemberCacheManager, MemberId, MemberReader, NativeRegistry, Schema, SegmentCacheManager,
    StoreId,
};

/// One recorded `flush_region` call.
#[derive(Debug, Clone)]
pub struct FlushCall {
    pub cube: String,
    pub constraints: Vec<AxisConstraint>,
}

/// Segment cache that records flushes instead of performing them.
#[derive(Default)]
pub struct RecordingSegmentCache {
    pub flushes: Mutex<Vec<FlushCall>>,
}

impl RecordingSegmentCache {
    pub fn cube_names(&self) -> Vec<String> {
        self.flushes.lock().iter().map(|f| f.cube.clone()).collect()
    }
}

impl SegmentCacheManager for RecordingSegmentCache {
    fn flush_region(
        &self,
        cube: &Arc<Cube>,
        constraints: &[AxisConstraint],
    ) -> anyhow::Result<()> {
        self.flushes.lock().push(FlushCall {
            cube: cube.name().to_string(),
            constraints: constraints.to_vec(),
        });
        Ok(())
    }

    fn print_region_state(
        &self,
        cube: &Arc<Cube>,
        constraints: &[AxisConstraint],
        out: &mut dyn fmt::Write,
    ) -> anyhow::Result<()> {
        writeln!(out, "cube {}: {} axes", cube.name(), constraints.len())?;
        Ok(())
    }
}

/// Segment cache that fails every flush.
pub struct FailingSegmentCache;

impl SegmentCacheManager for FailingSegmentCache {
    fn flush_region(&self, _: &Arc<Cube>, _: &[AxisConstraint]) -> anyhow::Result<()> {
        anyhow::bail!("segment backend unavailable")
    }

    fn print_region_state(
        &self,
        _: &Arc<Cube>,
        _: &[AxisConstraint],
        _: &mut dyn fmt::Write,
    ) -> anyhow::Result<()> {
        anyhow::bail!("segment backend unavailable")
    }
}

#[derive(Default)]
pub struct CountingNativeRegistry {
    pub flushed: AtomicUsize,
}

impl NativeRegistry for CountingNativeRegistry {
    fn flush_all_native_set_cache(&self) {
        self.flushed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct CountingStore {
    pub id: StoreId,
    pub cleared: AtomicUsize,
}

impl AggregationStore for CountingStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn clear_cached_aggregations(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reader over fixed children and level tables.
#[derive(Default)]
pub struct TableReader {
    pub children: HashMap<MemberId, Vec<Arc<Member>>>,
    pub levels: HashMap<LevelId, Vec<Arc<Member>>>,
}

impl MemberReader for TableReader {
    fn children(
        &self,
        member: &Member,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<Vec<Arc<Member>>> {
        Ok(self.children.get(&member.id()).cloned().unwrap_or_default())
    }

    fn level_members(
        &self,
        level: &Level,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<Vec<Arc<Member>>> {
        Ok(self.levels.get(&level.id()).cloned().unwrap_or_default())
    }
}

/// A Sales + Warehouse schema over Time and Gender, with a parent-child
/// Employee hierarchy off to the side for rejection tests.
pub struct Fixture {
    pub control: CacheControl,
    pub schema: Arc<Schema>,
    pub segment: Arc<RecordingSegmentCache>,
    pub native: Arc<CountingNativeRegistry>,
    pub sales_store: Arc<CountingStore>,
    pub warehouse_store: Arc<CountingStore>,

    pub year: Arc<Level>,
    pub quarter: Arc<Level>,
    pub gender_level: Arc<Level>,

    pub all_time: Arc<Member>,
    pub y1997: Arc<Member>,
    pub y1998: Arc<Member>,
    pub q1: Arc<Member>,
    pub q2: Arc<Member>,
    pub q3: Arc<Member>,
    pub q4: Arc<Member>,
    pub q1_98: Arc<Member>,
    pub gender_m: Arc<Member>,
    pub gender_f: Arc<Member>,
    pub employee: Arc<Member>,

    pub unit_sales: Arc<Member>,
    pub store_cost: Arc<Member>,
    pub warehouse_sales: Arc<Member>,
}

pub fn fixture() -> Fixture {
    fixture_with_config(CacheConfig::default())
}

pub fn fixture_with_config(config: CacheConfig) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let time = Dimension::new(DimensionId(1), "Time");
    let gender = Dimension::new(DimensionId(2), "Gender");
    let employee_dim = Dimension::new(DimensionId(3), "Employees");
    let sales_measures = Dimension::measures(DimensionId(10), "Measures");
    let warehouse_measures = Dimension::measures(DimensionId(11), "Measures");

    let all_time_level = Arc::new(Level::new(
        LevelId(9),
        HierarchyId(1),
        time.clone(),
        "(All)",
        0,
        ColumnId(9),
    ));
    let year = Arc::new(Level::new(
        LevelId(1),
        HierarchyId(1),
        time.clone(),
        "Year",
        1,
        ColumnId(10),
    ));
    let quarter = Arc::new(
        Level::new(
            LevelId(2),
            HierarchyId(1),
            time.clone(),
            "Quarter",
            2,
            ColumnId(11),
        )
        .leaf(),
    );
    let gender_level = Arc::new(
        Level::new(
            LevelId(3),
            HierarchyId(2),
            gender.clone(),
            "Gender",
            1,
            ColumnId(20),
        )
        .leaf(),
    );
    let employee_level = Arc::new(
        Level::new(
            LevelId(4),
            HierarchyId(3),
            employee_dim.clone(),
            "Employee",
            1,
            ColumnId(30),
        )
        .parent_child(),
    );
    let sales_measures_level = Arc::new(Level::new(
        LevelId(20),
        HierarchyId(20),
        sales_measures.clone(),
        "MeasuresLevel",
        0,
        ColumnId(90),
    ));
    let warehouse_measures_level = Arc::new(Level::new(
        LevelId(21),
        HierarchyId(21),
        warehouse_measures.clone(),
        "MeasuresLevel",
        0,
        ColumnId(91),
    ));

    let all_time = Arc::new(
        Member::new(
            MemberId(1),
            "All Time",
            KeyValue::All,
            all_time_level,
            None,
        )
        .as_all(),
    );
    let y1997 = Arc::new(
        Member::new(
            MemberId(2),
            "1997",
            KeyValue::Int(1997),
            year.clone(),
            Some(all_time.clone()),
        )
        .with_ordinal(1997),
    );
    let y1998 = Arc::new(
        Member::new(
            MemberId(3),
            "1998",
            KeyValue::Int(1998),
            year.clone(),
            Some(all_time.clone()),
        )
        .with_ordinal(1998),
    );
    let quarter_member = |id: u64, name: &str, parent: &Arc<Member>, ordinal: i64| {
        Arc::new(
            Member::new(
                MemberId(id),
                name,
                KeyValue::Str(name.to_string()),
                quarter.clone(),
                Some(parent.clone()),
            )
            .with_ordinal(ordinal),
        )
    };
    let q1 = quarter_member(4, "Q1", &y1997, 1);
    let q2 = quarter_member(5, "Q2", &y1997, 2);
    let q3 = quarter_member(6, "Q3", &y1997, 3);
    let q4 = quarter_member(7, "Q4", &y1997, 4);
    let q1_98 = quarter_member(8, "Q1", &y1998, 5);

    let gender_m = Arc::new(
        Member::new(
            MemberId(10),
            "M",
            KeyValue::Str("M".to_string()),
            gender_level.clone(),
            None,
        )
        .with_ordinal(1),
    );
    let gender_f = Arc::new(
        Member::new(
            MemberId(11),
            "F",
            KeyValue::Str("F".to_string()),
            gender_level.clone(),
            None,
        )
        .with_ordinal(2),
    );
    let employee = Arc::new(Member::new(
        MemberId(12),
        "Sheri",
        KeyValue::Str("Sheri".to_string()),
        employee_level,
        None,
    ));

    let unit_sales = Arc::new(Member::new(
        MemberId(20),
        "Unit Sales",
        KeyValue::Str("Unit Sales".to_string()),
        sales_measures_level.clone(),
        None,
    ));
    let store_cost = Arc::new(Member::new(
        MemberId(21),
        "Store Cost",
        KeyValue::Str("Store Cost".to_string()),
        sales_measures_level,
        None,
    ));
    let warehouse_sales = Arc::new(Member::new(
        MemberId(22),
        "Warehouse Sales",
        KeyValue::Str("Warehouse Sales".to_string()),
        warehouse_measures_level,
        None,
    ));

    let sales_store = Arc::new(CountingStore {
        id: StoreId(1),
        cleared: AtomicUsize::new(0),
    });
    let warehouse_store = Arc::new(CountingStore {
        id: StoreId(2),
        cleared: AtomicUsize::new(0),
    });

    let sales = Cube::new(
        "Sales",
        vec![time.clone(), gender, sales_measures],
        vec![unit_sales.clone(), store_cost.clone()],
        sales_store.clone() as Arc<dyn AggregationStore>,
    );
    let warehouse = Cube::new(
        "Warehouse",
        vec![time, warehouse_measures],
        vec![warehouse_sales.clone()],
        warehouse_store.clone() as Arc<dyn AggregationStore>,
    );

    let native = Arc::new(CountingNativeRegistry::default());
    let schema = Schema::new(
        "FoodMart",
        vec![sales, warehouse],
        native.clone() as Arc<dyn NativeRegistry>,
    );

    let mut reader = TableReader::default();
    reader
        .children
        .insert(all_time.id(), vec![y1997.clone(), y1998.clone()]);
    reader.children.insert(
        y1997.id(),
        vec![q1.clone(), q2.clone(), q3.clone(), q4.clone()],
    );
    reader.children.insert(y1998.id(), vec![q1_98.clone()]);
    reader
        .levels
        .insert(year.id(), vec![y1997.clone(), y1998.clone()]);
    reader.levels.insert(
        quarter.id(),
        vec![q1.clone(), q2.clone(), q3.clone(), q4.clone(), q1_98.clone()],
    );
    reader
        .levels
        .insert(gender_level.id(), vec![gender_m.clone(), gender_f.clone()]);

    let segment = Arc::new(RecordingSegmentCache::default());
    let members = MemberCacheManager::new(Box::new(HashMemberCache::new()), Arc::new(reader));
    let control = CacheControl::new(
        schema.clone(),
        segment.clone() as Arc<dyn SegmentCacheManager>,
        members,
        config,
    );

    Fixture {
        control,
        schema,
        segment,
        native,
        sales_store,
        warehouse_store,
        year,
        quarter,
        gender_level,
        all_time,
        y1997,
        y1998,
        q1,
        q2,
        q3,
        q4,
        q1_98,
        gender_m,
        gender_f,
        employee,
        unit_sales,
        store_cost,
        warehouse_sales,
    }
}
