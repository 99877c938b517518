//! Row value model.
//!
//! A [`RowValue`] is a tree of scalar leaves and positional records. Every
//! scalar [`Leaf`] carries, besides its value:
//!
//! - a [`ValueQuality`] flag telling downstream consumers whether the
//!   value can be trusted (`Normal`), must not be compared or written
//!   (`Unknown`), or is an explicit null synthesized by outer-join
//!   padding (`NullModified` / `NullPreserve`);
//! - a [`Provenance`]: the set of [`OriginHandle`]s of the tracked
//!   objects the value came from (empty for synthesized values);
//! - a per-pass [`LeafId`] identity, stamped when the leaf is seeded from
//!   an extracted change. Join key merging rewrites leaves by identity.
//!
//! Records carry no field names; their child count and order follow the
//! [`RowShape`](crate::propagate::shape::RowShape) of the view node that
//! produced them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

// ── Identities ──────────────────────────────────────────────────────────

/// Opaque reference to a tracked object of the caller's object graph.
///
/// Only used for diagnostics: errors report the handles of every object
/// involved in a failing key group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginHandle(pub u64);

impl fmt::Display for OriginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a scalar leaf within one propagation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LeafId(pub u64);

impl LeafId {
    /// Leaves built by callers or synthesized from placeholders.
    pub const UNSTAMPED: LeafId = LeafId(0);

    pub fn is_stamped(self) -> bool {
        self != LeafId::UNSTAMPED
    }
}

// ── Scalars ─────────────────────────────────────────────────────────────

/// A scalar column value.
///
/// Scalars are totally ordered and hashable so they can key the ordered
/// per-join row maps. Floats compare by `f64::total_cmp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int(_) => 2,
            Scalar::Float(_) => 3,
            Scalar::Text(_) => 4,
            Scalar::Bytes(_) => 5,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Int(i) => i.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::Text(s) => s.hash(state),
            Scalar::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Scalar::Bytes(b) => {
                write!(f, "x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, "'")
            }
        }
    }
}

// ── Quality flags and provenance ────────────────────────────────────────

/// How far a leaf value can be trusted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ValueQuality {
    /// A concrete value taken from an extracted change.
    #[default]
    Normal,
    /// Stands in for an existing value this pass did not see. Must not be
    /// compared or written.
    Unknown,
    /// Explicit null replacing a value that changed away (outer-join
    /// padding on the insert side).
    NullModified,
    /// Explicit null for a value that was already absent.
    NullPreserve,
}

impl ValueQuality {
    /// True for the two explicit-null padding flags.
    pub fn is_null_extended(self) -> bool {
        matches!(self, ValueQuality::NullModified | ValueQuality::NullPreserve)
    }
}

/// Originating tracked objects of a value. Empty means synthetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Provenance(BTreeSet<OriginHandle>);

impl Provenance {
    pub fn synthetic() -> Self {
        Provenance(BTreeSet::new())
    }

    pub fn single(origin: OriginHandle) -> Self {
        Provenance(BTreeSet::from([origin]))
    }

    pub fn is_synthetic(&self) -> bool {
        self.0.is_empty()
    }

    /// Union of both provenance sets.
    pub fn union(&self, other: &Provenance) -> Provenance {
        Provenance(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = OriginHandle> + '_ {
        self.0.iter().copied()
    }
}

// ── Leaves and rows ─────────────────────────────────────────────────────

/// A scalar leaf of a row value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    pub value: Scalar,
    pub quality: ValueQuality,
    pub provenance: Provenance,
    #[serde(skip)]
    pub id: LeafId,
}

impl Leaf {
    /// A normal, synthetic, unstamped leaf.
    pub fn new(value: Scalar) -> Self {
        Leaf {
            value,
            quality: ValueQuality::Normal,
            provenance: Provenance::synthetic(),
            id: LeafId::UNSTAMPED,
        }
    }

    pub fn with_quality(value: Scalar, quality: ValueQuality) -> Self {
        Leaf {
            quality,
            ..Leaf::new(value)
        }
    }

    /// Value and quality equality; provenance and identity are ignored.
    pub fn same_content(&self, other: &Leaf) -> bool {
        self.value == other.value && self.quality == other.quality
    }
}

/// A structural row value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RowValue {
    Scalar(Leaf),
    Record(Vec<RowValue>),
    /// An outer-join stand-in for a missing side: explicit nulls under
    /// `quality`, except for key leaves copied from the partner. Such a
    /// sub-row is not a member of its join.
    NullExtended {
        quality: ValueQuality,
        children: Vec<RowValue>,
    },
}

impl RowValue {
    pub fn scalar(value: Scalar) -> Self {
        RowValue::Scalar(Leaf::new(value))
    }

    pub fn int(i: i64) -> Self {
        RowValue::scalar(Scalar::Int(i))
    }

    pub fn text(s: &str) -> Self {
        RowValue::scalar(Scalar::Text(s.to_string()))
    }

    pub fn null() -> Self {
        RowValue::scalar(Scalar::Null)
    }

    pub fn record(children: Vec<RowValue>) -> Self {
        RowValue::Record(children)
    }

    /// Mark this record as outer-join padding. Scalars are returned
    /// unchanged.
    pub fn into_null_extended(self, quality: ValueQuality) -> Self {
        match self {
            RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                RowValue::NullExtended { quality, children }
            }
            scalar @ RowValue::Scalar(_) => scalar,
        }
    }

    /// A flat record of normal scalar leaves.
    pub fn from_scalars(values: impl IntoIterator<Item = Scalar>) -> Self {
        RowValue::Record(values.into_iter().map(RowValue::scalar).collect())
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            RowValue::Scalar(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn children(&self) -> &[RowValue] {
        match self {
            RowValue::Scalar(_) => &[],
            RowValue::Record(children) | RowValue::NullExtended { children, .. } => children,
        }
    }

    /// Follow a positional path into the row.
    pub fn get(&self, path: &[usize]) -> Option<&RowValue> {
        let mut current = self;
        for &idx in path {
            match current {
                RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                    current = children.get(idx)?
                }
                RowValue::Scalar(_) => return None,
            }
        }
        Some(current)
    }

    pub fn leaf_at(&self, path: &[usize]) -> Option<&Leaf> {
        self.get(path).and_then(RowValue::as_leaf)
    }

    /// Replace the sub-value at `path`. Returns false if the path does not
    /// exist.
    pub fn replace_at(&mut self, path: &[usize], value: RowValue) -> bool {
        let mut current = self;
        for &idx in path {
            let child = match current {
                RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                    children.get_mut(idx)
                }
                RowValue::Scalar(_) => None,
            };
            match child {
                Some(child) => current = child,
                None => return false,
            }
        }
        *current = value;
        true
    }

    /// Visit every leaf in depth-first order.
    pub fn for_each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a Leaf)) {
        match self {
            RowValue::Scalar(leaf) => f(leaf),
            RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                for child in children {
                    child.for_each_leaf(f);
                }
            }
        }
    }

    /// Mutably visit every leaf in depth-first order.
    pub fn for_each_leaf_mut(&mut self, f: &mut impl FnMut(&mut Leaf)) {
        match self {
            RowValue::Scalar(leaf) => f(leaf),
            RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                for child in children {
                    child.for_each_leaf_mut(f);
                }
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        let mut n = 0;
        self.for_each_leaf(&mut |_| n += 1);
        n
    }

    pub fn is_null_extended(&self) -> bool {
        matches!(self, RowValue::NullExtended { .. })
    }

    /// The padding quality of the outermost null-extended row on `path`,
    /// the row itself and the value at the end of the path included.
    pub fn padding_at(&self, path: &[usize]) -> Option<ValueQuality> {
        let mut current = self;
        for &idx in path {
            if let RowValue::NullExtended { quality, .. } = current {
                return Some(*quality);
            }
            current = current.children().get(idx)?;
        }
        match current {
            RowValue::NullExtended { quality, .. } => Some(*quality),
            _ => None,
        }
    }

    /// Union of the provenance of every leaf.
    pub fn origins(&self) -> BTreeSet<OriginHandle> {
        let mut out = BTreeSet::new();
        self.for_each_leaf(&mut |leaf| out.extend(leaf.provenance.iter()));
        out
    }

    /// Value and quality equality over the whole tree.
    pub fn same_content(&self, other: &RowValue) -> bool {
        match (self, other) {
            (RowValue::Scalar(a), RowValue::Scalar(b)) => a.same_content(b),
            (RowValue::Record(a), RowValue::Record(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
            }
            (
                RowValue::NullExtended { quality: qa, children: a },
                RowValue::NullExtended { quality: qb, children: b },
            ) => {
                qa == qb && a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
            }
            _ => false,
        }
    }

    /// The scalar values of the row in depth-first order.
    pub fn scalars(&self) -> Vec<Scalar> {
        let mut out = Vec::new();
        self.for_each_leaf(&mut |leaf| out.push(leaf.value.clone()));
        out
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Scalar(leaf) => match leaf.quality {
                ValueQuality::Normal => write!(f, "{}", leaf.value),
                ValueQuality::Unknown => write!(f, "?"),
                ValueQuality::NullModified => write!(f, "NULL!"),
                ValueQuality::NullPreserve => write!(f, "NULL="),
            },
            RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}
