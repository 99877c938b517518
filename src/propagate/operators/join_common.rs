//! Shared helpers for join propagation.
//!
//! Provides join-condition analysis (key selector extraction) and
//! placeholder synthesis. Used by the join propagator and by slot
//! resolution, which needs to know a join's key slots.

use crate::error::PropagationError;
use crate::propagate::key::{CompositeKey, KeySelector};
use crate::propagate::shape::{RowShape, SlotId};
use crate::propagate::value::{RowValue, Scalar, ValueQuality};
use crate::propagate::view::{Expr, JoinSide};
use std::collections::BTreeSet;

// ── Join condition analysis ─────────────────────────────────────────────

/// Split an equi-join condition into left and right key selectors.
///
/// The condition must be a single `Eq` or an `And` of `Eq`s, each
/// comparing one left-input property with one right-input property (in
/// either order). Selectors come back in conjunct order, left and right
/// vectors aligned.
pub fn analyze_join_condition(
    condition: &Expr,
    left_shape: &RowShape,
    right_shape: &RowShape,
) -> Result<(Vec<KeySelector>, Vec<KeySelector>), PropagationError> {
    let conjuncts: Vec<&Expr> = match condition {
        Expr::Eq(..) => vec![condition],
        Expr::And(items) if !items.is_empty() => items.iter().collect(),
        _ => {
            return Err(PropagationError::MalformedJoinCondition(format!(
                "expected a conjunction of equalities, got {condition}"
            )));
        }
    };

    let mut left_keys = Vec::with_capacity(conjuncts.len());
    let mut right_keys = Vec::with_capacity(conjuncts.len());
    for conjunct in conjuncts {
        let (a, b) = match conjunct {
            Expr::Eq(a, b) => (a.as_ref(), b.as_ref()),
            other => {
                return Err(PropagationError::MalformedJoinCondition(format!(
                    "conjunct {other} is not an equality"
                )));
            }
        };
        let (l, r) = match (property(a), property(b)) {
            (Some((JoinSide::Left, l)), Some((JoinSide::Right, r)))
            | (Some((JoinSide::Right, r)), Some((JoinSide::Left, l))) => (l, r),
            _ => {
                return Err(PropagationError::MalformedJoinCondition(format!(
                    "equality {conjunct} must compare a left property with a right property"
                )));
            }
        };
        left_keys.push(resolve_selector(left_shape, l, JoinSide::Left)?);
        right_keys.push(resolve_selector(right_shape, r, JoinSide::Right)?);
    }
    Ok((left_keys, right_keys))
}

fn property(expr: &Expr) -> Option<(JoinSide, &[String])> {
    match expr {
        Expr::Property { input, path } => Some((*input, path.as_slice())),
        _ => None,
    }
}

fn resolve_selector(
    shape: &RowShape,
    names: &[String],
    side: JoinSide,
) -> Result<KeySelector, PropagationError> {
    shape
        .resolve_path(names)
        .filter(|path| shape.slot_at(path).is_some())
        .map(KeySelector::Path)
        .ok_or_else(|| {
            PropagationError::MissingSlot(format!(
                "join key {side}.{} is not a scalar of the {side} input",
                names.join(".")
            ))
        })
}

/// Slots read by the key selectors of a join on either side.
pub fn key_slots(
    left_keys: &[KeySelector],
    right_keys: &[KeySelector],
    left_shape: &RowShape,
    right_shape: &RowShape,
) -> BTreeSet<SlotId> {
    let left = left_keys
        .iter()
        .filter_map(|k| k.path().and_then(|p| left_shape.slot_at(p)));
    let right = right_keys
        .iter()
        .filter_map(|k| k.path().and_then(|p| right_shape.slot_at(p)));
    left.chain(right).collect()
}

// ── Placeholder synthesis ───────────────────────────────────────────────

/// How a synthesized stand-in row is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateMode {
    /// The placeholder as is: every non-key value Unknown.
    Unknown,
    /// Explicit nulls overwriting the previous values.
    NullModified,
    /// Explicit nulls for values that were already absent.
    NullPreserve,
}

impl PopulateMode {
    fn null_quality(self) -> Option<ValueQuality> {
        match self {
            PopulateMode::Unknown => None,
            PopulateMode::NullModified => Some(ValueQuality::NullModified),
            PopulateMode::NullPreserve => Some(ValueQuality::NullPreserve),
        }
    }
}

/// Build a stand-in row for one side of a join from its placeholder.
///
/// The key leaves are copied from `key` (the partner's key) so the
/// stand-in matches its partner; the returned key is the same key tagged
/// synthetic.
pub fn synthesize_row(
    placeholder: &RowValue,
    mode: PopulateMode,
    selectors: &[KeySelector],
    key: &CompositeKey,
) -> Result<(RowValue, CompositeKey), PropagationError> {
    let mut row = placeholder.clone();
    if let Some(quality) = mode.null_quality() {
        row.for_each_leaf_mut(&mut |leaf| {
            leaf.value = Scalar::Null;
            leaf.quality = quality;
        });
        row = row.into_null_extended(quality);
    }
    for (selector, component) in selectors.iter().zip(key.components()) {
        if let KeySelector::Path(path) = selector {
            if !row.replace_at(path, RowValue::Scalar(component.leaf.clone())) {
                return Err(PropagationError::MissingSlot(format!(
                    "placeholder {placeholder} has no key position {path:?}"
                )));
            }
        }
    }
    Ok((row, key.to_synthetic()))
}
