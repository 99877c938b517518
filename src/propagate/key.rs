//! Composite join keys.
//!
//! A [`CompositeKey`] is the ordered vector of values a row yields for the
//! key selectors of a join. Keys compare by value only; each component
//! also remembers the leaf it was read from and whether it came from a
//! real row, a synthesized placeholder, or a merge of two real rows.
//!
//! Merging two equal keys keeps, per position, the non-synthetic
//! component, and unions the provenance of two real components. The
//! join propagator merges the keys of the two rows it combines and then
//! rewrites both rows' key leaves to the merged component, so ancestors
//! see a single key identity carrying the provenance of both sides.

use crate::error::PropagationError;
use crate::propagate::value::{Leaf, OriginHandle, RowValue, Scalar};
use std::collections::BTreeSet;
use std::fmt;

/// Where a key component came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySource {
    /// Read from a row seeded from an extracted change.
    Real,
    /// Copied into a synthesized placeholder row.
    Synthetic,
    /// The merge of two real components.
    Merged,
}

/// One evaluated key-selector value.
#[derive(Debug, Clone)]
pub struct KeyComponent {
    pub leaf: Leaf,
    pub source: KeySource,
}

impl KeyComponent {
    pub fn is_synthetic(&self) -> bool {
        self.source == KeySource::Synthetic
    }
}

/// Value-only view of a key, usable as an ordered map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyValues(pub Vec<Scalar>);

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// Ordered vector of key components.
#[derive(Debug, Clone)]
pub struct CompositeKey {
    components: Vec<KeyComponent>,
}

impl CompositeKey {
    pub fn new(components: Vec<KeyComponent>) -> Self {
        CompositeKey { components }
    }

    pub fn components(&self) -> &[KeyComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn values(&self) -> KeyValues {
        KeyValues(self.components.iter().map(|c| c.leaf.value.clone()).collect())
    }

    /// True when no component is synthetic.
    pub fn is_real(&self) -> bool {
        self.components.iter().all(|c| !c.is_synthetic())
    }

    /// The same key re-tagged as belonging to a synthesized row.
    pub fn to_synthetic(&self) -> CompositeKey {
        CompositeKey {
            components: self
                .components
                .iter()
                .map(|c| KeyComponent {
                    leaf: c.leaf.clone(),
                    source: KeySource::Synthetic,
                })
                .collect(),
        }
    }

    /// True when both keys were read from the very same leaves.
    pub fn same_identity(&self, other: &CompositeKey) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.leaf.id.is_stamped() && a.leaf.id == b.leaf.id)
    }

    /// Merge two equal keys.
    ///
    /// Per position the non-synthetic component wins; two real components
    /// with different provenance or identity become one `Merged` component
    /// carrying the union of both provenances and the left identity.
    /// `k.merge(&k)` is structurally `k`.
    pub fn merge(&self, other: &CompositeKey) -> Result<CompositeKey, PropagationError> {
        if self != other {
            return Err(PropagationError::InternalError(format!(
                "cannot merge unequal keys {} and {}",
                self.values(),
                other.values()
            )));
        }
        let components = self
            .components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| match (a.source, b.source) {
                (KeySource::Synthetic, KeySource::Synthetic) => a.clone(),
                (KeySource::Synthetic, _) => b.clone(),
                (_, KeySource::Synthetic) => a.clone(),
                _ if a.leaf.id == b.leaf.id && a.leaf.provenance == b.leaf.provenance => a.clone(),
                _ => KeyComponent {
                    leaf: Leaf {
                        value: a.leaf.value.clone(),
                        quality: a.leaf.quality,
                        provenance: a.leaf.provenance.union(&b.leaf.provenance),
                        id: a.leaf.id,
                    },
                    source: KeySource::Merged,
                },
            })
            .collect();
        Ok(CompositeKey { components })
    }

    /// Origins of every component.
    pub fn origins(&self) -> BTreeSet<OriginHandle> {
        self.components
            .iter()
            .flat_map(|c| c.leaf.provenance.iter())
            .collect()
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.leaf.value == b.leaf.value)
    }
}

impl Eq for CompositeKey {}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values())
    }
}

// ── Key selectors ───────────────────────────────────────────────────────

/// A pure projection of a row, resolved against the row's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySelector {
    /// Positional path to a scalar leaf.
    Path(Vec<usize>),
    Constant(Scalar),
}

impl KeySelector {
    pub fn path(&self) -> Option<&[usize]> {
        match self {
            KeySelector::Path(p) => Some(p),
            KeySelector::Constant(_) => None,
        }
    }
}

/// Evaluate each selector against `row`.
///
/// Components read from leaves with provenance are `Real`; constants and
/// leaves without provenance are `Synthetic`. Fails if a selector names a
/// position the row does not have.
pub fn extract_key(row: &RowValue, selectors: &[KeySelector]) -> Result<CompositeKey, PropagationError> {
    let components = selectors
        .iter()
        .map(|selector| match selector {
            KeySelector::Path(path) => {
                let leaf = row.leaf_at(path).ok_or_else(|| {
                    PropagationError::MissingSlot(format!(
                        "key selector {path:?} is not a scalar of row {row}"
                    ))
                })?;
                let source = if leaf.provenance.is_synthetic() {
                    KeySource::Synthetic
                } else {
                    KeySource::Real
                };
                Ok(KeyComponent {
                    leaf: leaf.clone(),
                    source,
                })
            }
            KeySelector::Constant(value) => Ok(KeyComponent {
                leaf: Leaf::new(value.clone()),
                source: KeySource::Synthetic,
            }),
        })
        .collect::<Result<Vec<_>, PropagationError>>()?;
    Ok(CompositeKey { components })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::value::{LeafId, Provenance};

    fn stamped(values: &[i64], origin: u64, first_id: u64) -> RowValue {
        let mut row = RowValue::from_scalars(values.iter().map(|v| Scalar::Int(*v)));
        let mut id = first_id;
        row.for_each_leaf_mut(&mut |leaf| {
            leaf.provenance = Provenance::single(OriginHandle(origin));
            leaf.id = LeafId(id);
            id += 1;
        });
        row
    }

    #[test]
    fn test_extract_key_in_selector_order() {
        let row = stamped(&[10, 20, 30], 1, 1);
        let key = extract_key(
            &row,
            &[KeySelector::Path(vec![2]), KeySelector::Path(vec![0])],
        )
        .unwrap();
        assert_eq!(key.values(), KeyValues(vec![Scalar::Int(30), Scalar::Int(10)]));
        assert!(key.is_real());
    }

    #[test]
    fn test_extract_key_missing_slot_is_error() {
        let row = stamped(&[1], 1, 1);
        let err = extract_key(&row, &[KeySelector::Path(vec![3])]).unwrap_err();
        assert!(matches!(err, PropagationError::MissingSlot(_)));
    }

    #[test]
    fn test_constant_selector_is_synthetic() {
        let row = stamped(&[1], 1, 1);
        let key = extract_key(&row, &[KeySelector::Constant(Scalar::Int(5))]).unwrap();
        assert!(!key.is_real());
        assert_eq!(key.values().0, vec![Scalar::Int(5)]);
    }

    #[test]
    fn test_key_equality_ignores_provenance() {
        let a = extract_key(&stamped(&[7], 1, 1), &[KeySelector::Path(vec![0])]).unwrap();
        let b = extract_key(&stamped(&[7], 2, 9), &[KeySelector::Path(vec![0])]).unwrap();
        let c = extract_key(&stamped(&[8], 2, 9), &[KeySelector::Path(vec![0])]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_equality_requires_same_arity() {
        let row = stamped(&[7, 7], 1, 1);
        let one = extract_key(&row, &[KeySelector::Path(vec![0])]).unwrap();
        let two = extract_key(
            &row,
            &[KeySelector::Path(vec![0]), KeySelector::Path(vec![1])],
        )
        .unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn test_merge_unions_real_provenance() {
        let a = extract_key(&stamped(&[7], 1, 1), &[KeySelector::Path(vec![0])]).unwrap();
        let b = extract_key(&stamped(&[7], 2, 5), &[KeySelector::Path(vec![0])]).unwrap();
        let m = a.merge(&b).unwrap();
        assert_eq!(m.components()[0].source, KeySource::Merged);
        assert_eq!(m.components()[0].leaf.id, LeafId(1));
        let origins: Vec<_> = m.origins().into_iter().collect();
        assert_eq!(origins, vec![OriginHandle(1), OriginHandle(2)]);
    }

    #[test]
    fn test_merge_prefers_real_over_synthetic() {
        let real = extract_key(&stamped(&[7], 3, 1), &[KeySelector::Path(vec![0])]).unwrap();
        let other = extract_key(&stamped(&[7], 4, 2), &[KeySelector::Path(vec![0])]).unwrap();
        let synthetic = other.to_synthetic();
        let m1 = real.merge(&synthetic).unwrap();
        let m2 = synthetic.merge(&real).unwrap();
        for m in [m1, m2] {
            assert_eq!(m.components()[0].source, KeySource::Real);
            assert_eq!(m.origins().into_iter().collect::<Vec<_>>(), vec![OriginHandle(3)]);
        }
    }

    #[test]
    fn test_merge_self_is_identity() {
        let k = extract_key(&stamped(&[1, 2], 1, 1), &[
            KeySelector::Path(vec![0]),
            KeySelector::Path(vec![1]),
        ])
        .unwrap();
        let m = k.merge(&k).unwrap();
        assert_eq!(m, k);
        assert!(m.same_identity(&k));
        assert_eq!(m.origins(), k.origins());
        assert!(m.components().iter().all(|c| c.source == KeySource::Real));
    }

    #[test]
    fn test_merge_unequal_keys_is_error() {
        let a = extract_key(&stamped(&[1], 1, 1), &[KeySelector::Path(vec![0])]).unwrap();
        let b = extract_key(&stamped(&[2], 1, 2), &[KeySelector::Path(vec![0])]).unwrap();
        assert!(matches!(
            a.merge(&b),
            Err(PropagationError::InternalError(_))
        ));
    }
}
