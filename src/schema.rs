//! Dimensional metadata: dimensions, levels, cubes, and schemas.
//!
//! Loading this metadata from configuration is the surrounding engine's
//! job; the types here are the minimal immutable model the region and
//! member-set algebras operate over. Identity-bearing types (dimensions,
//! levels) compare and hash by id so that shared metadata can be passed
//! around freely as `Arc`s.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::member::{Member, MemberId};

/// Unique identifier for a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DimensionId(pub u64);

/// Unique identifier for a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchyId(pub u64);

/// Unique identifier for a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelId(pub u64);

/// Identity of a physical key column backing a level.
///
/// Axis constraints handed to the segment cache are keyed by column
/// identity, not by level: two levels mapped onto the same column
/// contribute to the same axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnId(pub u64);

/// Unique identifier for an aggregation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoreId(pub u64);

/// A dimension of the dimensional model.
///
/// The distinguished Measures dimension carries `measures: true`; every
/// cube synthesizes exactly one.
#[derive(Debug, Clone)]
pub struct Dimension {
    id: DimensionId,
    name: String,
    measures: bool,
}

impl Dimension {
    /// Create a regular dimension.
    pub fn new(id: DimensionId, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            measures: false,
        })
    }

    /// Create the Measures dimension of a cube.
    pub fn measures(id: DimensionId, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            measures: true,
        })
    }

    /// Identifier of this dimension.
    pub fn id(&self) -> DimensionId {
        self.id
    }

    /// Name of this dimension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the Measures dimension.
    pub fn is_measures(&self) -> bool {
        self.measures
    }
}

// Identity by id; the name is display metadata.
impl PartialEq for Dimension {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Dimension {}

impl Hash for Dimension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A level within a hierarchy.
///
/// Levels know their depth within the owning hierarchy; descendant
/// resolution walks depth arithmetic rather than child pointers.
#[derive(Debug, Clone)]
pub struct Level {
    id: LevelId,
    hierarchy: HierarchyId,
    dimension: Arc<Dimension>,
    name: String,
    depth: u32,
    leaf: bool,
    parent_child: bool,
    key_column: ColumnId,
}

impl Level {
    /// Create a level. Marker methods ([`Level::leaf`],
    /// [`Level::parent_child`]) refine it before it is shared.
    pub fn new(
        id: LevelId,
        hierarchy: HierarchyId,
        dimension: Arc<Dimension>,
        name: impl Into<String>,
        depth: u32,
        key_column: ColumnId,
    ) -> Self {
        Self {
            id,
            hierarchy,
            dimension,
            name: name.into(),
            depth,
            leaf: false,
            parent_child: false,
            key_column,
        }
    }

    /// Mark this level as the deepest of its hierarchy.
    pub fn leaf(mut self) -> Self {
        self.leaf = true;
        self
    }

    /// Mark this level as parent-child (members parent other members of
    /// the same level). Such members cannot be edited through the
    /// member-edit subsystem.
    pub fn parent_child(mut self) -> Self {
        self.parent_child = true;
        self
    }

    /// Identifier of this level.
    pub fn id(&self) -> LevelId {
        self.id
    }

    /// Hierarchy this level belongs to.
    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }

    /// Dimension this level belongs to.
    pub fn dimension(&self) -> &Arc<Dimension> {
        &self.dimension
    }

    /// Name of this level.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based depth below the hierarchy root.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether this level has no child level.
    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// Whether this level is parent-child.
    pub fn is_parent_child(&self) -> bool {
        self.parent_child
    }

    /// Physical key column backing this level.
    pub fn key_column(&self) -> ColumnId {
        self.key_column
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Level {}

impl Hash for Level {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The per-cube physical store of precomputed aggregations.
///
/// Its internal storage and eviction policy are external; this core only
/// ever asks it to drop everything during a whole-schema flush.
pub trait AggregationStore: Send + Sync {
    /// Identity of this store, used to deduplicate flush targets.
    fn id(&self) -> StoreId;

    /// Drop every cached aggregation held by this store.
    fn clear_cached_aggregations(&self);
}

/// Registry of cached native-set evaluations.
///
/// Native sets are not individually addressable, so member-level flushes
/// drop the whole registry.
pub trait NativeRegistry: Send + Sync {
    /// Drop every cached native-set evaluation.
    fn flush_all_native_set_cache(&self);
}

/// A [`NativeRegistry`] that holds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNativeRegistry;

impl NativeRegistry for NoopNativeRegistry {
    fn flush_all_native_set_cache(&self) {}
}

/// A cube: a named set of dimensions plus measures over one store.
pub struct Cube {
    name: String,
    dimensions: Vec<Arc<Dimension>>,
    measures: Vec<Arc<Member>>,
    store: Arc<dyn AggregationStore>,
}

impl Cube {
    /// Create a cube. `dimensions` must include the cube's Measures
    /// dimension; `measures` are the members of that dimension.
    pub fn new(
        name: impl Into<String>,
        dimensions: Vec<Arc<Dimension>>,
        measures: Vec<Arc<Member>>,
        store: Arc<dyn AggregationStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            dimensions,
            measures,
            store,
        })
    }

    /// Name of this cube.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimensions of this cube, Measures included.
    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dimensions
    }

    /// The measure members of this cube.
    pub fn measures(&self) -> &[Arc<Member>] {
        &self.measures
    }

    /// The aggregation store backing this cube.
    pub fn store(&self) -> &Arc<dyn AggregationStore> {
        &self.store
    }

    /// The cube's Measures dimension, if present. Well-formed cubes always
    /// have one; the lookup is fallible so that the caller can surface a
    /// broken model instead of panicking.
    pub fn measures_dimension(&self) -> Option<&Arc<Dimension>> {
        self.dimensions.iter().find(|d| d.is_measures())
    }

    /// Whether this cube carries the given dimension.
    pub fn has_dimension(&self, id: DimensionId) -> bool {
        self.dimensions.iter().any(|d| d.id() == id)
    }
}

impl fmt::Debug for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cube")
            .field("name", &self.name)
            .field("dimensions", &self.dimensions)
            .field("measures", &self.measures.len())
            .finish()
    }
}

/// A schema: the set of cubes sharing one dimensional model, plus the
/// native-set registry attached to it.
pub struct Schema {
    name: String,
    cubes: Vec<Arc<Cube>>,
    native_registry: Arc<dyn NativeRegistry>,
    measure_cubes: HashMap<MemberId, usize>,
}

impl Schema {
    /// Create a schema over the given cubes.
    pub fn new(
        name: impl Into<String>,
        cubes: Vec<Arc<Cube>>,
        native_registry: Arc<dyn NativeRegistry>,
    ) -> Arc<Self> {
        let mut measure_cubes = HashMap::new();
        for (index, cube) in cubes.iter().enumerate() {
            for measure in cube.measures() {
                measure_cubes.insert(measure.id(), index);
            }
        }
        Arc::new(Self {
            name: name.into(),
            cubes,
            native_registry,
            measure_cubes,
        })
    }

    /// Name of this schema.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every cube of this schema.
    pub fn cubes(&self) -> &[Arc<Cube>] {
        &self.cubes
    }

    /// The native-set registry attached to this schema.
    pub fn native_registry(&self) -> &Arc<dyn NativeRegistry> {
        &self.native_registry
    }

    /// The cube owning the given measure member.
    pub fn cube_for_measure(&self, measure: MemberId) -> Option<&Arc<Cube>> {
        self.measure_cubes.get(&measure).map(|i| &self.cubes[*i])
    }

    /// Drop every schema-level cache: the native-set registry and each
    /// cube's cached aggregations.
    pub fn clear_caches(&self) {
        self.native_registry.flush_all_native_set_cache();
        for cube in &self.cubes {
            cube.store().clear_cached_aggregations();
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("cubes", &self.cubes)
            .finish()
    }
}

/// Identity of a loaded schema within a [`SchemaPool`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaKey {
    /// Schema name.
    pub name: String,
    /// Catalog the schema was loaded from.
    pub catalog: String,
}

/// Registry of live schemas, keyed by identity.
///
/// Flushing a schema evicts it from the pool and drops its caches, so the
/// next connection reloads it from scratch.
#[derive(Default)]
pub struct SchemaPool {
    schemas: Mutex<HashMap<SchemaKey, Arc<Schema>>>,
}

impl SchemaPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its identity, replacing any previous entry.
    pub fn register(&self, key: SchemaKey, schema: Arc<Schema>) {
        self.schemas.lock().insert(key, schema);
    }

    /// Look up a schema by identity.
    pub fn get(&self, key: &SchemaKey) -> Option<Arc<Schema>> {
        self.schemas.lock().get(key).cloned()
    }

    /// Evict the schema with the given identity and drop its caches.
    /// Returns false if no such schema is pooled.
    pub fn flush_schema(&self, key: &SchemaKey) -> bool {
        let removed = self.schemas.lock().remove(key);
        match removed {
            Some(schema) => {
                schema.clear_caches();
                tracing::debug!(schema = schema.name(), "evicted schema from pool");
                true
            }
            None => false,
        }
    }

    /// Evict every pooled schema and drop all their caches.
    pub fn flush_all(&self) {
        let drained: Vec<_> = self.schemas.lock().drain().collect();
        for (_, schema) in drained {
            schema.clear_caches();
        }
    }
}
