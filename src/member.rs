//! Members: the concrete values populating hierarchy levels.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::schema::Level;

/// Unique identifier for a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemberId(pub u64);

/// The key value of a member on its level's key column.
///
/// `All` is the synthetic marker carried by "all" members; an axis whose
/// only collected value is `All` is unconstrained. The ordering is used
/// when axis value sets are handed to the segment cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyValue {
    /// The synthetic "all" marker.
    All,
    /// An integral key.
    Int(i64),
    /// A textual key.
    Str(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::All => write!(f, "(all)"),
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

/// One value within a hierarchy level.
///
/// Members compare and hash by id. The parent link and the property map
/// sit behind locks solely so that move and set-property commands can
/// mutate them while holding the global member-cache lock; everything
/// else about a member is immutable.
pub struct Member {
    id: MemberId,
    name: String,
    key: KeyValue,
    level: Arc<Level>,
    parent: RwLock<Option<Arc<Member>>>,
    all: bool,
    ordinal: i64,
    properties: RwLock<BTreeMap<String, String>>,
}

impl Member {
    /// Create a member under the given parent (`None` for roots).
    pub fn new(
        id: MemberId,
        name: impl Into<String>,
        key: KeyValue,
        level: Arc<Level>,
        parent: Option<Arc<Member>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            key,
            level,
            parent: RwLock::new(parent),
            all: false,
            ordinal: 0,
            properties: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mark this member as the synthetic "all" member of its hierarchy.
    pub fn as_all(mut self) -> Self {
        self.all = true;
        self
    }

    /// Set the ordinal ordering this member among its level's members.
    pub fn with_ordinal(mut self, ordinal: i64) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Identifier of this member.
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Name of this member.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key value of this member on its level's key column.
    pub fn key(&self) -> &KeyValue {
        &self.key
    }

    /// Level this member lies on.
    pub fn level(&self) -> &Arc<Level> {
        &self.level
    }

    /// Current parent of this member, if any.
    pub fn parent(&self) -> Option<Arc<Member>> {
        self.parent.read().clone()
    }

    /// Relink this member under a new parent. Only the move command calls
    /// this, under the global member-cache lock.
    pub(crate) fn set_parent(&self, parent: Option<Arc<Member>>) {
        *self.parent.write() = parent;
    }

    /// Whether this is the synthetic "all" member.
    pub fn is_all(&self) -> bool {
        self.all
    }

    /// Ordinal of this member within its level.
    pub fn ordinal(&self) -> i64 {
        self.ordinal
    }

    /// Read a property value.
    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.read().get(name).cloned()
    }

    /// Set a property value. Only the set-property command calls this,
    /// under the global member-cache lock.
    pub(crate) fn set_property(&self, name: &str, value: &str) {
        self.properties
            .write()
            .insert(name.to_string(), value.to_string());
    }

    /// The bracketed unique name of this member, e.g. `[Time].[1997].[Q1]`.
    pub fn unique_name(&self) -> String {
        let mut segments = vec![self.name.clone()];
        let mut parent = self.parent();
        while let Some(member) = parent {
            segments.push(member.name().to_string());
            parent = member.parent();
        }
        segments.push(self.level.dimension().name().to_string());
        segments.reverse();
        let mut out = String::new();
        for segment in segments {
            out.push('[');
            out.push_str(&segment);
            out.push(']');
            out.push('.');
        }
        out.pop();
        out
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unique_name())
    }
}
