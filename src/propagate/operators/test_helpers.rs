//! Shared test helpers for operator unit tests.
//!
//! Provides a small fixed mapping (customers joined to details on `id`),
//! row builders that stamp provenance the way leaf seeding does, and
//! a standalone `PropagationContext` constructor.

use crate::config::PropagatorConfig;
use crate::propagate::extract::ExtractedChange;
use crate::propagate::key::{KeySelector, extract_key};
use crate::propagate::operators::join_common::{PopulateMode, synthesize_row};
use crate::propagate::shape::{RowShape, ShapeField, SlotId, SlotLayout};
use crate::propagate::value::{LeafId, OriginHandle, Provenance, RowValue, Scalar};
use crate::propagate::view::{CellPredicate, CellQuery, Expr, JoinKind, ViewNode};
use crate::propagate::walk::PropagationContext;
use std::sync::atomic::{AtomicU64, Ordering};

// ── Layout and shapes ───────────────────────────────────────────────────

/// Slots `id`, `name`, `detail` and two cells (`_from0`, `_from1`).
pub fn test_layout() -> SlotLayout {
    SlotLayout::new(&["id", "name", "detail"], 2)
}

/// `[id, name]` over slots 0 and 1.
pub fn customer_shape() -> RowShape {
    RowShape::new(vec![
        ShapeField::value("id", SlotId(0)),
        ShapeField::value("name", SlotId(1)),
    ])
}

/// `[id, detail]` over slots 0 and 2.
pub fn detail_shape() -> RowShape {
    RowShape::new(vec![
        ShapeField::value("id", SlotId(0)),
        ShapeField::value("detail", SlotId(2)),
    ])
}

// ── ViewNode builders ───────────────────────────────────────────────────

/// Build a leaf over `extent` with value fields `(name, slot)`.
pub fn leaf_node(cell: usize, extent: &str, fields: &[(&str, usize)]) -> ViewNode {
    ViewNode::Leaf(CellQuery {
        cell,
        extent: extent.to_string(),
        predicate: CellPredicate::True,
        shape: RowShape::new(
            fields
                .iter()
                .map(|(name, slot)| ShapeField::value(name, SlotId(*slot)))
                .collect(),
        ),
    })
}

pub fn customer_leaf() -> ViewNode {
    ViewNode::Leaf(CellQuery {
        cell: 0,
        extent: "Customers".to_string(),
        predicate: CellPredicate::True,
        shape: customer_shape(),
    })
}

pub fn detail_leaf() -> ViewNode {
    ViewNode::Leaf(CellQuery {
        cell: 1,
        extent: "Details".to_string(),
        predicate: CellPredicate::True,
        shape: detail_shape(),
    })
}

/// `Customers ⋈ Details ON left.id = right.id`.
pub fn customer_detail_join(kind: JoinKind) -> ViewNode {
    ViewNode::Join {
        kind,
        condition: Expr::equi(&[("id", "id")]),
        left: Box::new(customer_leaf()),
        right: Box::new(detail_leaf()),
    }
}

// ── Rows and changes ────────────────────────────────────────────────────

static NEXT_TEST_LEAF: AtomicU64 = AtomicU64::new(1_000_000);

/// Stamp every leaf with `origin` and a fresh identity.
pub fn stamp(mut row: RowValue, origin: u64) -> RowValue {
    row.for_each_leaf_mut(&mut |leaf| {
        leaf.provenance = Provenance::single(OriginHandle(origin));
        leaf.id = LeafId(NEXT_TEST_LEAF.fetch_add(1, Ordering::Relaxed));
    });
    row
}

pub fn customer_row(id: i64, name: &str) -> RowValue {
    RowValue::from_scalars([Scalar::Int(id), Scalar::Text(name.to_string())])
}

pub fn detail_row(id: i64, detail: &str) -> RowValue {
    RowValue::from_scalars([Scalar::Int(id), Scalar::Text(detail.to_string())])
}

/// The stand-in a join builds for a missing side keyed on `partner`'s
/// first column, as outer-join padding emits it.
pub fn padded_row(shape: &RowShape, partner: &RowValue, mode: PopulateMode) -> RowValue {
    let selectors = [KeySelector::Path(vec![0])];
    let key = extract_key(partner, &selectors).unwrap();
    synthesize_row(&shape.placeholder(), mode, &selectors, &key)
        .unwrap()
        .0
}

pub fn add_customer(origin: u64, id: i64, name: &str) -> ExtractedChange {
    ExtractedChange::added("Customers", OriginHandle(origin), customer_row(id, name))
}

pub fn delete_customer(origin: u64, id: i64, name: &str) -> ExtractedChange {
    ExtractedChange::deleted("Customers", OriginHandle(origin), customer_row(id, name))
}

pub fn add_detail(origin: u64, id: i64, detail: &str) -> ExtractedChange {
    ExtractedChange::added("Details", OriginHandle(origin), detail_row(id, detail))
}

pub fn delete_detail(origin: u64, id: i64, detail: &str) -> ExtractedChange {
    ExtractedChange::deleted("Details", OriginHandle(origin), detail_row(id, detail))
}

// ── Context builder ─────────────────────────────────────────────────────

/// Create a `PropagationContext` over `changes` with default settings.
pub fn test_ctx<'a>(
    config: &'a PropagatorConfig,
    layout: &'a SlotLayout,
    changes: &'a [ExtractedChange],
) -> PropagationContext<'a> {
    PropagationContext::new(config, layout, changes)
}
