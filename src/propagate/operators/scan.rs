//! Leaf seeding.
//!
//! A leaf view node is bound to one cell query. Its change node is built
//! directly from the batch: the changes over the cell's extent whose rows
//! satisfy the cell predicate. The predicate is evaluated against each
//! row separately, so a modification that moves a row out of the cell
//! contributes only its delete (and one that moves it in only its
//! insert).
//!
//! Every seeded leaf is stamped with a fresh identity and the origin of
//! its change.

use crate::error::PropagationError;
use crate::propagate::change_node::ChangeNode;
use crate::propagate::extract::ExtractedChange;
use crate::propagate::value::{Provenance, RowValue};
use crate::propagate::view::CellQuery;
use crate::propagate::walk::PropagationContext;

/// Build the change node of a leaf.
pub fn seed_leaf(
    ctx: &mut PropagationContext,
    cell: &CellQuery,
) -> Result<ChangeNode, PropagationError> {
    let changes = ctx.changes;
    let mut node = ChangeNode::new(cell.shape.placeholder(), ctx.config.deduplicate_rows);

    for change in changes.iter().filter(|c| c.extent == cell.extent) {
        if let Some(row) = change.inserted_row() {
            if let Some(seeded) = seed_row(ctx, cell, change, row)? {
                node.push_inserted(seeded);
            }
        }
        if let Some(row) = change.deleted_row() {
            if let Some(seeded) = seed_row(ctx, cell, change, row)? {
                node.push_deleted(seeded);
            }
        }
    }
    Ok(node)
}

fn seed_row(
    ctx: &mut PropagationContext,
    cell: &CellQuery,
    change: &ExtractedChange,
    row: &RowValue,
) -> Result<Option<RowValue>, PropagationError> {
    if !cell.shape.conforms(row) {
        return Err(PropagationError::MissingSlot(format!(
            "row {row} of {} (change {}) does not match cell {} ({} fields)",
            change.extent,
            change.origin,
            cell.cell,
            cell.shape.fields.len()
        )));
    }
    if !cell.predicate.evaluate(row, &cell.shape)? {
        return Ok(None);
    }
    let mut seeded = row.clone();
    seeded.for_each_leaf_mut(&mut |leaf| {
        leaf.provenance = Provenance::single(change.origin);
        leaf.id = ctx.next_leaf_id();
    });
    Ok(Some(seeded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropagatorConfig;
    use crate::propagate::operators::test_helpers::*;
    use crate::propagate::value::{OriginHandle, Scalar, ValueQuality};
    use crate::propagate::view::{CellPredicate, ViewNode};

    fn customer_cell() -> CellQuery {
        match customer_leaf() {
            ViewNode::Leaf(cell) => cell,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_seed_filters_by_extent() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let changes = vec![add_customer(1, 1, "a"), add_detail(2, 1, "d")];
        let mut ctx = test_ctx(&config, &layout, &changes);
        let node = seed_leaf(&mut ctx, &customer_cell()).unwrap();
        assert_eq!(node.inserted().len(), 1);
        assert!(node.deleted().is_empty());
    }

    #[test]
    fn test_modified_contributes_both_rows() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let changes = vec![ExtractedChange::modified(
            "Customers",
            OriginHandle(3),
            customer_row(1, "old"),
            customer_row(1, "new"),
        )];
        let mut ctx = test_ctx(&config, &layout, &changes);
        let node = seed_leaf(&mut ctx, &customer_cell()).unwrap();
        assert_eq!(node.inserted()[0].to_string(), "(1, 'new')");
        assert_eq!(node.deleted()[0].to_string(), "(1, 'old')");
    }

    #[test]
    fn test_unchanged_contributes_nothing() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let changes = vec![ExtractedChange::unchanged(
            "Customers",
            OriginHandle(3),
            customer_row(1, "a"),
        )];
        let mut ctx = test_ctx(&config, &layout, &changes);
        assert!(seed_leaf(&mut ctx, &customer_cell()).unwrap().is_empty());
    }

    #[test]
    fn test_predicate_evaluated_per_row() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let mut cell = customer_cell();
        cell.predicate = CellPredicate::field_equals("name", Scalar::Text("vip".into()));
        let changes = vec![ExtractedChange::modified(
            "Customers",
            OriginHandle(3),
            customer_row(1, "vip"),
            customer_row(1, "regular"),
        )];
        let mut ctx = test_ctx(&config, &layout, &changes);
        let node = seed_leaf(&mut ctx, &cell).unwrap();
        assert!(node.inserted().is_empty());
        assert_eq!(node.deleted().len(), 1);
    }

    #[test]
    fn test_seeded_leaves_are_stamped() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let changes = vec![add_customer(8, 1, "a"), add_customer(9, 2, "b")];
        let mut ctx = test_ctx(&config, &layout, &changes);
        let node = seed_leaf(&mut ctx, &customer_cell()).unwrap();
        let mut ids = Vec::new();
        for row in node.inserted() {
            row.for_each_leaf(&mut |leaf| {
                assert!(leaf.id.is_stamped());
                assert_eq!(leaf.quality, ValueQuality::Normal);
                ids.push(leaf.id);
            });
        }
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert_eq!(
            node.origins().into_iter().collect::<Vec<_>>(),
            vec![OriginHandle(8), OriginHandle(9)]
        );
    }

    #[test]
    fn test_placeholder_is_unknown_shape() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let mut ctx = test_ctx(&config, &layout, &[]);
        let node = seed_leaf(&mut ctx, &customer_cell()).unwrap();
        assert_eq!(node.placeholder.to_string(), "(?, ?)");
    }

    #[test]
    fn test_nonconforming_row_is_missing_slot() {
        let config = PropagatorConfig::default();
        let layout = test_layout();
        let changes = vec![ExtractedChange::added(
            "Customers",
            OriginHandle(1),
            RowValue::from_scalars([Scalar::Int(1)]),
        )];
        let mut ctx = test_ctx(&config, &layout, &changes);
        assert!(matches!(
            seed_leaf(&mut ctx, &customer_cell()),
            Err(PropagationError::MissingSlot(_))
        ));
    }
}
