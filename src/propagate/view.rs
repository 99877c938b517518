//! Mapping view trees.
//!
//! A [`MappingView`] describes how one store table is assembled from
//! conceptual extents: a tree of [`ViewNode`]s whose leaves are per-cell
//! queries over an extent, combined by inner joins, left outer joins and
//! unions. The tree is produced by an upstream view generator and is
//! treated here as immutable, pre-validated input.

use crate::error::PropagationError;
use crate::propagate::shape::{RowShape, SlotId, SlotLayout};
use crate::propagate::value::{Leaf, RowValue, Scalar};
use std::collections::BTreeSet;
use std::fmt;

// ── Expressions ─────────────────────────────────────────────────────────

/// Which input of a join a property reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

/// Join condition expression.
///
/// Only conjunctions of `Eq(left property, right property)` are accepted
/// by the join propagator; the remaining variants exist so that
/// malformed conditions can be represented and rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Pure projection of one join input: a (possibly nested) property.
    Property { input: JoinSide, path: Vec<String> },
    Constant(Scalar),
    Eq(Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

impl Expr {
    pub fn left(path: &str) -> Expr {
        Expr::Property {
            input: JoinSide::Left,
            path: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn right(path: &str) -> Expr {
        Expr::Property {
            input: JoinSide::Right,
            path: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn eq(a: Expr, b: Expr) -> Expr {
        Expr::Eq(Box::new(a), Box::new(b))
    }

    /// `left.a = right.b AND ...` for each `(a, b)` pair.
    pub fn equi(pairs: &[(&str, &str)]) -> Expr {
        let mut eqs: Vec<Expr> = pairs
            .iter()
            .map(|(l, r)| Expr::eq(Expr::left(l), Expr::right(r)))
            .collect();
        if eqs.len() == 1 {
            eqs.remove(0)
        } else {
            Expr::And(eqs)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Property { input, path } => write!(f, "{input}.{}", path.join(".")),
            Expr::Constant(s) => write!(f, "{s}"),
            Expr::Eq(a, b) => write!(f, "{a} = {b}"),
            Expr::And(items) => write_joined(f, items, " AND "),
            Expr::Or(items) => write_joined(f, items, " OR "),
            Expr::Not(e) => write!(f, "NOT ({e})"),
            Expr::IsNull(e) => write!(f, "{e} IS NULL"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

// ── Cell predicates ─────────────────────────────────────────────────────

/// Row filter of a cell query: which rows of the extent the cell covers.
#[derive(Debug, Clone, PartialEq)]
pub enum CellPredicate {
    True,
    FieldEquals { path: Vec<String>, value: Scalar },
    IsNull { path: Vec<String> },
    Not(Box<CellPredicate>),
    And(Vec<CellPredicate>),
    Or(Vec<CellPredicate>),
}

impl CellPredicate {
    pub fn field_equals(path: &str, value: Scalar) -> Self {
        CellPredicate::FieldEquals {
            path: path.split('.').map(str::to_string).collect(),
            value,
        }
    }

    /// Evaluate against a row of `shape`.
    pub fn evaluate(&self, row: &RowValue, shape: &RowShape) -> Result<bool, PropagationError> {
        match self {
            CellPredicate::True => Ok(true),
            CellPredicate::FieldEquals { path, value } => {
                Ok(lookup(row, shape, path)?.value == *value)
            }
            CellPredicate::IsNull { path } => Ok(lookup(row, shape, path)?.value.is_null()),
            CellPredicate::Not(inner) => Ok(!inner.evaluate(row, shape)?),
            CellPredicate::And(items) => {
                for item in items {
                    if !item.evaluate(row, shape)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            CellPredicate::Or(items) => {
                for item in items {
                    if item.evaluate(row, shape)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn lookup<'a>(
    row: &'a RowValue,
    shape: &RowShape,
    path: &[String],
) -> Result<&'a Leaf, PropagationError> {
    shape
        .resolve_path(path)
        .and_then(|p| row.leaf_at(&p))
        .ok_or_else(|| {
            PropagationError::MissingSlot(format!(
                "cell predicate references '{}' which is not in the row",
                path.join(".")
            ))
        })
}

// ── View tree ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::LeftOuter => write!(f, "LEFT OUTER JOIN"),
        }
    }
}

/// A per-table fragment of the mapping over one extent.
#[derive(Debug, Clone, PartialEq)]
pub struct CellQuery {
    /// Cell number; selects the cell's indicator slot.
    pub cell: usize,
    /// Conceptual extent (entity or association set) the cell reads.
    pub extent: String,
    pub predicate: CellPredicate,
    pub shape: RowShape,
}

/// Node of a mapping view tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Leaf(CellQuery),
    Join {
        kind: JoinKind,
        condition: Expr,
        left: Box<ViewNode>,
        right: Box<ViewNode>,
    },
    Union {
        children: Vec<ViewNode>,
    },
}

impl ViewNode {
    /// Short name of the node kind, for diagnostics.
    pub fn node_kind(&self) -> &'static str {
        match self {
            ViewNode::Leaf(_) => "leaf",
            ViewNode::Join {
                kind: JoinKind::Inner,
                ..
            } => "inner join",
            ViewNode::Join {
                kind: JoinKind::LeftOuter,
                ..
            } => "left outer join",
            ViewNode::Union { .. } => "union",
        }
    }

    /// Declared shape of the rows this node produces.
    pub fn shape(&self, layout: &SlotLayout) -> Result<RowShape, PropagationError> {
        match self {
            ViewNode::Leaf(cell) => Ok(cell.shape.clone()),
            ViewNode::Join { left, right, .. } => {
                Ok(RowShape::join(&left.shape(layout)?, &right.shape(layout)?))
            }
            ViewNode::Union { .. } => {
                let slots: Vec<SlotId> = self.projected_slots(layout)?.into_iter().collect();
                Ok(RowShape::of_slots(layout, &slots))
            }
        }
    }

    /// Every slot this node projects, including the indicator slots of
    /// the cells beneath it.
    pub fn projected_slots(&self, layout: &SlotLayout) -> Result<BTreeSet<SlotId>, PropagationError> {
        match self {
            ViewNode::Leaf(cell) => {
                let mut slots: BTreeSet<SlotId> =
                    cell.shape.slot_paths().into_iter().map(|(s, _)| s).collect();
                slots.insert(layout.indicator_slot(cell.cell)?);
                Ok(slots)
            }
            ViewNode::Join { left, right, .. } => {
                let mut slots = left.projected_slots(layout)?;
                slots.extend(right.projected_slots(layout)?);
                Ok(slots)
            }
            ViewNode::Union { children } => {
                let mut slots = BTreeSet::new();
                for child in children {
                    slots.extend(child.projected_slots(layout)?);
                }
                Ok(slots)
            }
        }
    }

    /// Cell queries beneath this node, left to right.
    pub fn cells(&self) -> Vec<&CellQuery> {
        let mut out = Vec::new();
        self.collect_cells(&mut out);
        out
    }

    fn collect_cells<'a>(&'a self, out: &mut Vec<&'a CellQuery>) {
        match self {
            ViewNode::Leaf(cell) => out.push(cell),
            ViewNode::Join { left, right, .. } => {
                left.collect_cells(out);
                right.collect_cells(out);
            }
            ViewNode::Union { children } => {
                for child in children {
                    child.collect_cells(out);
                }
            }
        }
    }

    /// Names of the extents read anywhere beneath this node.
    pub fn extents(&self) -> BTreeSet<&str> {
        self.cells().into_iter().map(|c| c.extent.as_str()).collect()
    }
}

/// A store table column and the slot it is populated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub slot: SlotId,
}

/// The update view of one store table.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingView {
    pub table: String,
    pub columns: Vec<TableColumn>,
    pub root: ViewNode,
}

impl MappingView {
    /// Build a view whose columns are the named value slots of `layout`.
    pub fn new(
        table: &str,
        layout: &SlotLayout,
        columns: &[&str],
        root: ViewNode,
    ) -> Result<Self, PropagationError> {
        let columns = columns
            .iter()
            .map(|name| {
                layout
                    .value_slot(name)
                    .map(|slot| TableColumn {
                        name: name.to_string(),
                        slot,
                    })
                    .ok_or_else(|| {
                        PropagationError::InvalidMapping(format!(
                            "table {table}: column '{name}' has no slot in the layout"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MappingView {
            table: table.to_string(),
            columns,
            root,
        })
    }
}
