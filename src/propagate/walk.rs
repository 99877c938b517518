//! Propagation framework.
//!
//! Walks each mapping view's tree bottom-up, building a [`ChangeNode`] per
//! view node by calling the operator-specific propagation functions, then
//! projects the root rows onto the view's table columns.
//!
//! `Propagator::propagate()` is the entry point. It evaluates only the
//! views a change in the batch can reach (see
//! [`ExtentCatalog`](crate::catalog::ExtentCatalog)) and returns one
//! [`TableChangeSet`] per evaluated table. Any error aborts the whole
//! pass; no partial output is returned.

use crate::catalog::ExtentCatalog;
use crate::config::PropagatorConfig;
use crate::error::PropagationError;
use crate::hash::RowIndex;
use crate::propagate::change_node::ChangeNode;
use crate::propagate::extract::ExtractedChange;
use crate::propagate::operators;
use crate::propagate::operators::join::JoinPropagator;
use crate::propagate::shape::{SlotId, SlotLayout};
use crate::propagate::slots::{project_row, resolve_slots};
use crate::propagate::value::{LeafId, OriginHandle, RowValue};
use crate::propagate::view::{MappingView, ViewNode};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Per-pass state shared by every operator.
pub struct PropagationContext<'a> {
    pub config: &'a PropagatorConfig,
    pub layout: &'a SlotLayout,
    /// The batch being propagated.
    pub changes: &'a [ExtractedChange],
    /// Last leaf identity handed out; identities start at 1.
    leaf_counter: u64,
}

impl<'a> PropagationContext<'a> {
    pub fn new(
        config: &'a PropagatorConfig,
        layout: &'a SlotLayout,
        changes: &'a [ExtractedChange],
    ) -> Self {
        PropagationContext {
            config,
            layout,
            changes,
            leaf_counter: 0,
        }
    }

    /// A fresh leaf identity, unique within this pass.
    pub fn next_leaf_id(&mut self) -> LeafId {
        self.leaf_counter += 1;
        LeafId(self.leaf_counter)
    }

    /// Recursively propagate the batch through `node`.
    pub fn propagate_node(&mut self, node: &ViewNode) -> Result<ChangeNode, PropagationError> {
        match node {
            ViewNode::Leaf(cell) => operators::scan::seed_leaf(self, cell),
            ViewNode::Join {
                kind,
                condition,
                left,
                right,
            } => {
                let left_changes = self.propagate_node(left)?;
                let right_changes = self.propagate_node(right)?;
                let left_shape = left.shape(self.layout)?;
                let right_shape = right.shape(self.layout)?;
                JoinPropagator::new(
                    *kind,
                    condition,
                    left_changes,
                    right_changes,
                    &left_shape,
                    &right_shape,
                )?
                .propagate(self)
            }
            ViewNode::Union { .. } => operators::union_all::propagate_union(self, node),
        }
    }
}

// ── Output ──────────────────────────────────────────────────────────────

/// Rows to delete from and insert into one store table.
///
/// Each row is a flat record with one scalar per column, in column order.
/// Unknown values must not be written; null-extended values are explicit
/// nulls.
#[derive(Debug, Clone, Serialize)]
pub struct TableChangeSet {
    pub table: String,
    pub columns: Vec<String>,
    pub inserted: Vec<RowValue>,
    pub deleted: Vec<RowValue>,
}

impl TableChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Every origin contributing to any row.
    pub fn origins(&self) -> BTreeSet<OriginHandle> {
        self.inserted
            .iter()
            .chain(&self.deleted)
            .flat_map(|r| r.origins())
            .collect()
    }
}

/// The output of one pass, keyed by table name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropagationResult {
    pub tables: BTreeMap<String, TableChangeSet>,
}

impl PropagationResult {
    pub fn get(&self, table: &str) -> Option<&TableChangeSet> {
        self.tables.get(table)
    }

    /// True when no table has any row to write.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableChangeSet::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableChangeSet> {
        self.tables.values()
    }

    /// Serialize for diagnostics.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Propagator ──────────────────────────────────────────────────────────

/// Propagates change batches through a fixed set of mapping views.
#[derive(Debug)]
pub struct Propagator {
    layout: SlotLayout,
    views: Vec<MappingView>,
    config: PropagatorConfig,
    catalog: ExtentCatalog,
}

impl Propagator {
    /// Create a propagator over `views`.
    ///
    /// Rejects duplicate table names, empty unions, columns outside the
    /// layout, and cells without an indicator slot.
    pub fn new(
        layout: SlotLayout,
        views: Vec<MappingView>,
        config: PropagatorConfig,
    ) -> Result<Self, PropagationError> {
        let mut tables = HashSet::new();
        for view in &views {
            if !tables.insert(view.table.as_str()) {
                return Err(PropagationError::InvalidMapping(format!(
                    "table {} has more than one view",
                    view.table
                )));
            }
            if let Some(column) = view.columns.iter().find(|c| !layout.contains(c.slot)) {
                return Err(PropagationError::InvalidMapping(format!(
                    "table {}: column {} refers to {} outside the layout",
                    view.table, column.name, column.slot
                )));
            }
            check_node(&view.root, &layout, &view.table)?;
        }
        Ok(Propagator {
            layout,
            views,
            config,
            catalog: ExtentCatalog::new(),
        })
    }

    /// Create a propagator with default settings.
    pub fn with_defaults(
        layout: SlotLayout,
        views: Vec<MappingView>,
    ) -> Result<Self, PropagationError> {
        Propagator::new(layout, views, PropagatorConfig::default())
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn views(&self) -> &[MappingView] {
        &self.views
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ExtentCatalog {
        &self.catalog
    }

    /// Tables some change in `changes` can reach.
    pub fn affected_tables(
        &self,
        changes: &[ExtractedChange],
    ) -> Result<BTreeSet<String>, PropagationError> {
        let extents: BTreeSet<&str> = changes.iter().map(|c| c.extent.as_str()).collect();
        let mut tables = BTreeSet::new();
        for extent in extents {
            if self.config.cache_extent_metadata {
                let meta = self.catalog.get_or_compute(extent, &self.views)?;
                tables.extend(meta.affected_tables.iter().cloned());
            } else {
                let meta = crate::catalog::ExtentMetadata::compute(extent, &self.views);
                tables.extend(meta.affected_tables);
            }
        }
        Ok(tables)
    }

    /// Propagate one batch of changes through every affected view.
    pub fn propagate(
        &self,
        changes: &[ExtractedChange],
    ) -> Result<PropagationResult, PropagationError> {
        if self.config.validate_changes {
            for change in changes {
                change.validate()?;
            }
        }

        let affected = self.affected_tables(changes)?;
        let mut ctx = PropagationContext::new(&self.config, &self.layout, changes);
        let mut result = PropagationResult::default();

        for view in self.views.iter().filter(|v| affected.contains(&v.table)) {
            let root = ctx.propagate_node(&view.root)?;
            let change_set = self.project_onto_table(view, root)?;
            tracing::debug!(
                table = %view.table,
                inserted = change_set.inserted_count(),
                deleted = change_set.deleted_count(),
                "propagated view"
            );
            result.tables.insert(view.table.clone(), change_set);
        }
        Ok(result)
    }

    fn project_onto_table(
        &self,
        view: &MappingView,
        root: ChangeNode,
    ) -> Result<TableChangeSet, PropagationError> {
        let slots: Vec<SlotId> = view.columns.iter().map(|c| c.slot).collect();
        let resolved = resolve_slots(&view.root, &slots, &self.layout)?;
        let (inserted, deleted) = root.into_rows();
        let project = |rows: Vec<RowValue>| -> Result<Vec<RowValue>, PropagationError> {
            let mut seen = RowIndex::new();
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                let projected = project_row(row, &resolved, &self.layout)?;
                if self.config.deduplicate_rows && !seen.admit(&out, &projected) {
                    continue;
                }
                out.push(projected);
            }
            Ok(out)
        };
        Ok(TableChangeSet {
            table: view.table.clone(),
            columns: view.columns.iter().map(|c| c.name.clone()).collect(),
            inserted: project(inserted)?,
            deleted: project(deleted)?,
        })
    }
}

fn check_node(node: &ViewNode, layout: &SlotLayout, table: &str) -> Result<(), PropagationError> {
    match node {
        ViewNode::Leaf(cell) => layout.indicator_slot(cell.cell).map(|_| ()),
        ViewNode::Join { left, right, .. } => {
            check_node(left, layout, table)?;
            check_node(right, layout, table)
        }
        ViewNode::Union { children } if children.is_empty() => Err(
            PropagationError::InvalidMapping(format!("table {table}: union has no children")),
        ),
        ViewNode::Union { children } => {
            for child in children {
                check_node(child, layout, table)?;
            }
            Ok(())
        }
    }
}
