//! Slot resolution.
//!
//! Every view node projects some of the global layout slots. Resolving a
//! slot against a node yields a [`ProjectedSlot`]: a small expression over
//! the node's own rows that computes the slot's value. Resolution is done
//! once per (node, slot) and evaluated per row.
//!
//! Resolution rules:
//!
//! - a leaf projects its declared value fields as columns and its own
//!   indicator slot as the constant `true`;
//! - a union projects every slot of its flat shape as a column;
//! - a join combines the contributions of its two children (paths
//!   prefixed with the child position). Key slots take the first
//!   contributor. For an inner join the last contributor that is not a
//!   null constant wins. For a left outer join a single contributor is
//!   used directly; several become a `Case` guarded by each child's
//!   membership, later branches overriding earlier ones, defaulting to the
//!   slot's padding value. Constants on the nullable side are guarded by
//!   that side's membership, and indicator slots are wrapped in
//!   `NotNull` so a padded indicator reads `false`.

use crate::error::PropagationError;
use crate::propagate::operators::join_common::{analyze_join_condition, key_slots};
use crate::propagate::shape::{SlotId, SlotLayout};
use crate::propagate::value::{Leaf, RowValue, Scalar, ValueQuality};
use crate::propagate::view::{JoinKind, ViewNode};
use std::fmt;

/// Expression computing one slot from a row of a view node.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedSlot {
    NotProjected,
    /// The scalar at a positional path.
    Column { path: Vec<usize> },
    Constant(Scalar),
    /// The value of the last branch whose member sub-row is present and
    /// not inside a null-extended row; `default` when none is.
    Case {
        branches: Vec<(Vec<usize>, ProjectedSlot)>,
        default: Scalar,
    },
    /// Null becomes `false`.
    NotNull(Box<ProjectedSlot>),
}

impl ProjectedSlot {
    pub fn is_projected(&self) -> bool {
        !matches!(self, ProjectedSlot::NotProjected)
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, ProjectedSlot::Constant(Scalar::Null))
    }

    /// The same expression over the parent row, where this node's row is
    /// child `idx`.
    pub fn prefixed(self, idx: usize) -> ProjectedSlot {
        match self {
            ProjectedSlot::NotProjected | ProjectedSlot::Constant(_) => self,
            ProjectedSlot::Column { mut path } => {
                path.insert(0, idx);
                ProjectedSlot::Column { path }
            }
            ProjectedSlot::Case { branches, default } => ProjectedSlot::Case {
                branches: branches
                    .into_iter()
                    .map(|(mut member, value)| {
                        member.insert(0, idx);
                        (member, value.prefixed(idx))
                    })
                    .collect(),
                default,
            },
            ProjectedSlot::NotNull(inner) => ProjectedSlot::NotNull(Box::new(inner.prefixed(idx))),
        }
    }

    /// Guard constants by the membership of the sub-row at `member`.
    fn guarded_by(self, member: &[usize]) -> ProjectedSlot {
        match self {
            ProjectedSlot::Constant(value) => ProjectedSlot::Case {
                branches: vec![(member.to_vec(), ProjectedSlot::Constant(value))],
                default: Scalar::Null,
            },
            ProjectedSlot::NotNull(inner) => {
                ProjectedSlot::NotNull(Box::new(inner.guarded_by(member)))
            }
            other => other,
        }
    }

    /// Evaluate against a row of the node this expression was resolved
    /// for.
    pub fn evaluate(&self, row: &RowValue) -> Result<Leaf, PropagationError> {
        match self {
            ProjectedSlot::NotProjected => Err(PropagationError::MissingSlot(format!(
                "slot is not projected by row {row}"
            ))),
            ProjectedSlot::Column { path } => row.leaf_at(path).cloned().ok_or_else(|| {
                PropagationError::MissingSlot(format!("no scalar at {path:?} in row {row}"))
            }),
            ProjectedSlot::Constant(value) => Ok(Leaf::new(value.clone())),
            ProjectedSlot::Case { branches, default } => {
                let mut chosen = None;
                let mut null_modified = false;
                for (member, value) in branches {
                    if row.get(member).is_none() {
                        continue;
                    }
                    match row.padding_at(member) {
                        None => chosen = Some(value),
                        Some(quality) => null_modified |= quality == ValueQuality::NullModified,
                    }
                }
                match chosen {
                    Some(value) => value.evaluate(row),
                    None => {
                        let quality = if null_modified {
                            ValueQuality::NullModified
                        } else {
                            ValueQuality::NullPreserve
                        };
                        Ok(Leaf::with_quality(default.clone(), quality))
                    }
                }
            }
            ProjectedSlot::NotNull(inner) => {
                let mut leaf = inner.evaluate(row)?;
                if leaf.value.is_null() {
                    leaf.value = Scalar::Bool(false);
                }
                Ok(leaf)
            }
        }
    }
}

impl fmt::Display for ProjectedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectedSlot::NotProjected => write!(f, "-"),
            ProjectedSlot::Column { path } => write!(f, "col{path:?}"),
            ProjectedSlot::Constant(value) => write!(f, "{value}"),
            ProjectedSlot::Case { branches, default } => {
                write!(f, "CASE")?;
                for (member, value) in branches {
                    write!(f, " WHEN member{member:?} THEN {value}")?;
                }
                write!(f, " ELSE {default} END")
            }
            ProjectedSlot::NotNull(inner) => write!(f, "COALESCE({inner}, false)"),
        }
    }
}

/// Resolve `slot` against `node`.
pub fn resolve_slot(
    node: &ViewNode,
    slot: SlotId,
    layout: &SlotLayout,
) -> Result<ProjectedSlot, PropagationError> {
    if !layout.contains(slot) {
        return Err(PropagationError::MissingSlot(format!(
            "{slot} is outside the layout ({} slots)",
            layout.len()
        )));
    }
    match node {
        ViewNode::Leaf(cell) => {
            if layout.indicator_slot(cell.cell)? == slot {
                return Ok(ProjectedSlot::Constant(Scalar::Bool(true)));
            }
            Ok(cell
                .shape
                .top_level_path(slot)
                .map_or(ProjectedSlot::NotProjected, |path| ProjectedSlot::Column { path }))
        }
        ViewNode::Union { .. } => {
            let slots = node.projected_slots(layout)?;
            Ok(slots
                .iter()
                .position(|s| *s == slot)
                .map_or(ProjectedSlot::NotProjected, |idx| ProjectedSlot::Column {
                    path: vec![idx],
                }))
        }
        ViewNode::Join {
            kind,
            condition,
            left,
            right,
        } => {
            let left_shape = left.shape(layout)?;
            let right_shape = right.shape(layout)?;
            let (left_keys, right_keys) =
                analyze_join_condition(condition, &left_shape, &right_shape)?;
            let is_key = key_slots(&left_keys, &right_keys, &left_shape, &right_shape)
                .contains(&slot);

            let from_left = resolve_slot(left, slot, layout)?.prefixed(0);
            let mut from_right = resolve_slot(right, slot, layout)?.prefixed(1);
            if *kind == JoinKind::LeftOuter {
                from_right = from_right.guarded_by(&[1]);
            }

            let contributors: Vec<(usize, ProjectedSlot)> = [from_left, from_right]
                .into_iter()
                .enumerate()
                .filter(|(_, c)| c.is_projected())
                .collect();
            if contributors.is_empty() {
                return Ok(ProjectedSlot::NotProjected);
            }

            let resolved = if is_key {
                contributors[0].1.clone()
            } else {
                match kind {
                    JoinKind::Inner => {
                        pick_inner_contributor(contributors.into_iter().map(|(_, c)| c))
                    }
                    JoinKind::LeftOuter if contributors.len() == 1 => contributors[0].1.clone(),
                    JoinKind::LeftOuter => ProjectedSlot::Case {
                        branches: contributors
                            .into_iter()
                            .map(|(idx, c)| (vec![idx], c))
                            .collect(),
                        default: layout.padding_value(slot),
                    },
                }
            };

            Ok(match (kind, resolved) {
                (JoinKind::LeftOuter, r @ ProjectedSlot::NotNull(_)) => r,
                (JoinKind::LeftOuter, r) if layout.is_indicator(slot) => {
                    ProjectedSlot::NotNull(Box::new(r))
                }
                (_, r) => r,
            })
        }
    }
}

/// Under an inner join both children are present, so the last contributor
/// wins unless it is a null constant and something else is projected.
fn pick_inner_contributor(contributors: impl IntoIterator<Item = ProjectedSlot>) -> ProjectedSlot {
    let mut result = ProjectedSlot::NotProjected;
    for c in contributors {
        if !result.is_projected() || !c.is_null_constant() {
            result = c;
        }
    }
    result
}

/// Resolve every slot of `slots` against `node`, in order.
pub fn resolve_slots(
    node: &ViewNode,
    slots: &[SlotId],
    layout: &SlotLayout,
) -> Result<Vec<(SlotId, ProjectedSlot)>, PropagationError> {
    slots
        .iter()
        .map(|&slot| Ok((slot, resolve_slot(node, slot, layout)?)))
        .collect()
}

/// Project `row` into a flat record with one scalar per resolved slot.
///
/// Slots the node does not project are padded with the slot's padding
/// value, flagged NullPreserve.
pub fn project_row(
    row: &RowValue,
    resolved: &[(SlotId, ProjectedSlot)],
    layout: &SlotLayout,
) -> Result<RowValue, PropagationError> {
    resolved
        .iter()
        .map(|(slot, projected)| {
            if projected.is_projected() {
                projected.evaluate(row).map(RowValue::Scalar)
            } else {
                Ok(RowValue::Scalar(Leaf::with_quality(
                    layout.padding_value(*slot),
                    ValueQuality::NullPreserve,
                )))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(RowValue::Record)
}
