//! Shared fixtures for integration tests.
//!
//! `TestMapping` wraps a small customer/detail mapping:
//! - slots `id`, `name`, `detail`, one indicator per cell;
//! - cell 0 reads `Customers` as `[id, name]`;
//! - cell 1 reads `Details` as `[id, detail]`;
//! - table `CustomerDetails(id, name, detail)` joins the two on `id`.

#![allow(dead_code)]

use update_propagator::propagate::{
    CellPredicate, CellQuery, Expr, ExtractedChange, JoinKind, MappingView, OriginHandle,
    PropagationResult, Propagator, RowShape, RowValue, Scalar, ShapeField, SlotId, SlotLayout,
    TableChangeSet, ViewNode,
};
use update_propagator::{PropagationError, PropagatorConfig};

pub const TABLE: &str = "CustomerDetails";

pub fn layout() -> SlotLayout {
    SlotLayout::new(&["id", "name", "detail"], 2)
}

pub fn customer_leaf() -> ViewNode {
    ViewNode::Leaf(CellQuery {
        cell: 0,
        extent: "Customers".into(),
        predicate: CellPredicate::True,
        shape: RowShape::new(vec![
            ShapeField::value("id", SlotId(0)),
            ShapeField::value("name", SlotId(1)),
        ]),
    })
}

pub fn detail_leaf() -> ViewNode {
    ViewNode::Leaf(CellQuery {
        cell: 1,
        extent: "Details".into(),
        predicate: CellPredicate::True,
        shape: RowShape::new(vec![
            ShapeField::value("id", SlotId(0)),
            ShapeField::value("detail", SlotId(2)),
        ]),
    })
}

pub fn join_tree(kind: JoinKind) -> ViewNode {
    ViewNode::Join {
        kind,
        condition: Expr::equi(&[("id", "id")]),
        left: Box::new(customer_leaf()),
        right: Box::new(detail_leaf()),
    }
}

/// A propagator over the single `CustomerDetails` view.
pub struct TestMapping {
    pub propagator: Propagator,
}

impl TestMapping {
    pub fn new(kind: JoinKind) -> Self {
        Self::with_config(kind, PropagatorConfig::default())
    }

    pub fn with_config(kind: JoinKind, config: PropagatorConfig) -> Self {
        let layout = layout();
        let view = MappingView::new(TABLE, &layout, &["id", "name", "detail"], join_tree(kind))
            .expect("view");
        TestMapping {
            propagator: Propagator::new(layout, vec![view], config).expect("propagator"),
        }
    }

    pub fn run(&self, changes: &[ExtractedChange]) -> Result<PropagationResult, PropagationError> {
        self.propagator.propagate(changes)
    }

    /// Propagate and return the table's change set, which must exist.
    pub fn table(&self, changes: &[ExtractedChange]) -> TableChangeSet {
        let result = self.run(changes).expect("propagation failed");
        result.get(TABLE).cloned().expect("table not affected")
    }
}

// ── Change builders ─────────────────────────────────────────────────────

pub fn customer(id: i64, name: &str) -> RowValue {
    RowValue::from_scalars([Scalar::Int(id), Scalar::Text(name.into())])
}

pub fn detail(id: i64, detail: &str) -> RowValue {
    RowValue::from_scalars([Scalar::Int(id), Scalar::Text(detail.into())])
}

pub fn add_customer(origin: u64, id: i64, name: &str) -> ExtractedChange {
    ExtractedChange::added("Customers", OriginHandle(origin), customer(id, name))
}

pub fn delete_customer(origin: u64, id: i64, name: &str) -> ExtractedChange {
    ExtractedChange::deleted("Customers", OriginHandle(origin), customer(id, name))
}

pub fn add_detail(origin: u64, id: i64, text: &str) -> ExtractedChange {
    ExtractedChange::added("Details", OriginHandle(origin), detail(id, text))
}

pub fn delete_detail(origin: u64, id: i64, text: &str) -> ExtractedChange {
    ExtractedChange::deleted("Details", OriginHandle(origin), detail(id, text))
}

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
