//! Join propagation (inner and left outer).
//!
//! Both children's change nodes are bucketed by join key into four ordered
//! maps: left inserts, left deletes, right inserts, right deletes. For
//! each distinct key the presence of the four buckets forms a 4-bit input
//! mask, which selects one insert rule and one delete rule from the join
//! kind's rule table (see [`crate::propagate::rules`]). A rule names the
//! rows to combine into the output, possibly asking for a synthesized
//! stand-in on one side:
//!
//! - an *Unknown* stand-in is the side's placeholder, for a row that
//!   exists but was not part of this batch;
//! - a *NullModified* / *NullPreserve* stand-in is outer-join padding.
//!
//! Stand-ins take their key leaves from the partner row, so both halves
//! of an output row agree on the key. When both halves carry real keys
//! from different rows, the keys are merged and every key leaf is
//! rewritten to the merged component, so ancestors see one key identity
//! carrying the provenance of both sides.
//!
//! A key whose mask is unsupported aborts the whole pass with an
//! `UnsupportedChangeCombination` naming the objects behind every row of
//! that key group.

use crate::error::PropagationError;
use crate::propagate::change_node::ChangeNode;
use crate::propagate::key::{CompositeKey, KeySelector, KeyValues, extract_key};
use crate::propagate::operators::join_common::{PopulateMode, analyze_join_condition, synthesize_row};
use crate::propagate::rules::{Ops, RuleTable, rules_for};
use crate::propagate::shape::RowShape;
use crate::propagate::value::{Leaf, LeafId, OriginHandle, RowValue};
use crate::propagate::view::{Expr, JoinKind};
use crate::propagate::walk::PropagationContext;
use std::collections::{BTreeMap, BTreeSet, HashMap};

type KeyedRows = BTreeMap<KeyValues, (CompositeKey, RowValue)>;

/// One side of an output row: the row and the key it was matched on.
type Half = (RowValue, CompositeKey);

/// Combines two child change nodes across an equi-join.
#[derive(Debug)]
pub struct JoinPropagator {
    kind: JoinKind,
    label: String,
    rules: &'static RuleTable,
    left: ChangeNode,
    right: ChangeNode,
    left_keys: Vec<KeySelector>,
    right_keys: Vec<KeySelector>,
}

/// Which bucket pair a rule is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Insert,
    Delete,
}

impl JoinPropagator {
    /// Analyze the join condition against the children's shapes.
    ///
    /// Fails with `MalformedJoinCondition` unless the condition is a
    /// conjunction of left/right property equalities, and with
    /// `MissingSlot` if a property does not resolve.
    pub fn new(
        kind: JoinKind,
        condition: &Expr,
        left: ChangeNode,
        right: ChangeNode,
        left_shape: &RowShape,
        right_shape: &RowShape,
    ) -> Result<Self, PropagationError> {
        let (left_keys, right_keys) = analyze_join_condition(condition, left_shape, right_shape)?;
        Ok(JoinPropagator {
            kind,
            label: format!("{kind} ON {condition}"),
            rules: rules_for(kind),
            left,
            right,
            left_keys,
            right_keys,
        })
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    /// The output placeholder: both children's placeholders side by side.
    pub fn placeholder(&self) -> RowValue {
        RowValue::record(vec![
            self.left.placeholder.clone(),
            self.right.placeholder.clone(),
        ])
    }

    /// Combine the children's changes into the join's change node.
    pub fn propagate(self, ctx: &PropagationContext) -> Result<ChangeNode, PropagationError> {
        let left_inserts = index_by_key(self.left.inserted(), &self.left_keys)?;
        let left_deletes = index_by_key(self.left.deleted(), &self.left_keys)?;
        let right_inserts = index_by_key(self.right.inserted(), &self.right_keys)?;
        let right_deletes = index_by_key(self.right.deleted(), &self.right_keys)?;

        let keys: BTreeSet<&KeyValues> = left_inserts
            .keys()
            .chain(left_deletes.keys())
            .chain(right_inserts.keys())
            .chain(right_deletes.keys())
            .collect();

        let mut out = ChangeNode::new(self.placeholder(), ctx.config.deduplicate_rows);

        for key in keys {
            let li = left_inserts.get(key);
            let ld = left_deletes.get(key);
            let ri = right_inserts.get(key);
            let rd = right_deletes.get(key);

            let input = Ops::from_presence(li.is_some(), ld.is_some(), ri.is_some(), rd.is_some());
            let insert_rule = self.rules.insert_rule(input);
            let delete_rule = self.rules.delete_rule(input);

            if ctx.config.trace_key_groups {
                tracing::trace!(
                    join = %self.label,
                    %key,
                    %input,
                    insert = %insert_rule,
                    delete = %delete_rule,
                    "join key group"
                );
            }

            if insert_rule.is_unsupported() || delete_rule.is_unsupported() {
                let origins: BTreeSet<OriginHandle> = [li, ld, ri, rd]
                    .into_iter()
                    .flatten()
                    .flat_map(|(_, row)| row.origins())
                    .collect();
                let origins: Vec<OriginHandle> = origins.into_iter().collect();
                tracing::warn!(
                    join = %self.label,
                    %key,
                    %input,
                    origins = ?origins,
                    "unsupported change combination"
                );
                return Err(PropagationError::UnsupportedChangeCombination {
                    join: self.label.clone(),
                    ops: input,
                    key: key.to_string(),
                    origins,
                });
            }

            let group_key = [li, ld, ri, rd]
                .into_iter()
                .flatten()
                .map(|(k, _)| k)
                .next()
                .ok_or_else(|| {
                    PropagationError::InternalError(format!("key {key} has no rows"))
                })?;
            if let Some(row) = self.combine(Side::Insert, insert_rule, li, ri, group_key)? {
                out.push_inserted(row);
            }
            if let Some(row) = self.combine(Side::Delete, delete_rule, ld, rd, group_key)? {
                out.push_deleted(row);
            }
        }
        Ok(out)
    }

    /// Build the output row a rule asks for, or `None` for an empty rule.
    ///
    /// A stand-in takes its key from the real row on the other side, or
    /// from `group_key` when neither side of this rule is real.
    fn combine(
        &self,
        side: Side,
        rule: Ops,
        left_entry: Option<&(CompositeKey, RowValue)>,
        right_entry: Option<&(CompositeKey, RowValue)>,
        group_key: &CompositeKey,
    ) -> Result<Option<RowValue>, PropagationError> {
        if rule.is_empty() {
            return Ok(None);
        }
        let (left_real, right_real) = match side {
            Side::Insert => (Ops::LEFT_INSERT, Ops::RIGHT_INSERT),
            Side::Delete => (Ops::LEFT_DELETE, Ops::RIGHT_DELETE),
        };

        let left: Option<Half> = if rule.contains(left_real) {
            Some(real_half(left_entry, rule)?)
        } else {
            None
        };
        let right: Option<Half> = if rule.contains(right_real) {
            Some(real_half(right_entry, rule)?)
        } else {
            None
        };

        let left = match left {
            Some(l) => l,
            None if rule.contains(Ops::LEFT_UNKNOWN) => {
                let partner = right.as_ref().map_or(group_key, |(_, key)| key);
                synthesize_row(
                    &self.left.placeholder,
                    PopulateMode::Unknown,
                    &self.left_keys,
                    partner,
                )?
            }
            None => return Err(incomplete_rule(rule)),
        };

        let right = match right {
            Some(r) => r,
            None => {
                let mode = if rule.contains(Ops::RIGHT_UNKNOWN) {
                    PopulateMode::Unknown
                } else if rule.contains(Ops::RIGHT_NULL_MODIFIED) {
                    PopulateMode::NullModified
                } else if rule.contains(Ops::RIGHT_NULL_PRESERVE) {
                    PopulateMode::NullPreserve
                } else {
                    return Err(incomplete_rule(rule));
                };
                synthesize_row(&self.right.placeholder, mode, &self.right_keys, &left.1)?
            }
        };

        create_result_tuple(left, right).map(Some)
    }
}

fn real_half(entry: Option<&(CompositeKey, RowValue)>, rule: Ops) -> Result<Half, PropagationError> {
    entry
        .map(|(key, row)| (row.clone(), key.clone()))
        .ok_or_else(|| {
            PropagationError::InternalError(format!("rule {rule} names a bucket with no row"))
        })
}

fn incomplete_rule(rule: Ops) -> PropagationError {
    PropagationError::InternalError(format!("rule {rule} does not produce both join inputs"))
}

fn index_by_key(rows: &[RowValue], selectors: &[KeySelector]) -> Result<KeyedRows, PropagationError> {
    let mut map = BTreeMap::new();
    for row in rows {
        let key = extract_key(row, selectors)?;
        map.insert(key.values(), (key, row.clone()));
    }
    Ok(map)
}

/// Pair two matched rows into a `[left, right]` record.
///
/// When both keys are real and were read from different leaves they are
/// merged, and every leaf that was a component of either key is replaced
/// by the merged component.
pub fn create_result_tuple(left: Half, right: Half) -> Result<RowValue, PropagationError> {
    let (mut left_row, left_key) = left;
    let (mut right_row, right_key) = right;

    if left_key.is_real() && right_key.is_real() && !left_key.same_identity(&right_key) {
        let merged = left_key.merge(&right_key)?;
        let mut rewrites: HashMap<LeafId, Leaf> = HashMap::new();
        for (i, component) in merged.components().iter().enumerate() {
            for key in [&left_key, &right_key] {
                let id = key.components()[i].leaf.id;
                if id.is_stamped() {
                    rewrites.insert(id, component.leaf.clone());
                }
            }
        }
        for row in [&mut left_row, &mut right_row] {
            row.for_each_leaf_mut(&mut |leaf| {
                if let Some(merged_leaf) = rewrites.get(&leaf.id) {
                    *leaf = merged_leaf.clone();
                }
            });
        }
    }
    Ok(RowValue::record(vec![left_row, right_row]))
}
