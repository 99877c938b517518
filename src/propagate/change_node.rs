//! Change nodes: the per-view-node result of propagation.

use crate::hash::RowIndex;
use crate::propagate::value::{OriginHandle, RowValue};
use std::collections::BTreeSet;

/// Inserted and deleted rows of one view node, plus the placeholder row
/// ancestors pad from when they need a stand-in for this node.
#[derive(Debug, Clone)]
pub struct ChangeNode {
    inserted: Vec<RowValue>,
    deleted: Vec<RowValue>,
    pub placeholder: RowValue,
    deduplicate: bool,
    inserted_seen: RowIndex,
    deleted_seen: RowIndex,
}

impl ChangeNode {
    pub fn new(placeholder: RowValue, deduplicate: bool) -> Self {
        ChangeNode {
            inserted: Vec::new(),
            deleted: Vec::new(),
            placeholder,
            deduplicate,
            inserted_seen: RowIndex::new(),
            deleted_seen: RowIndex::new(),
        }
    }

    /// Add an inserted row. Returns false if an equal row is already
    /// present and duplicates are dropped.
    pub fn push_inserted(&mut self, row: RowValue) -> bool {
        if self.deduplicate && !self.inserted_seen.admit(&self.inserted, &row) {
            return false;
        }
        self.inserted.push(row);
        true
    }

    pub fn push_deleted(&mut self, row: RowValue) -> bool {
        if self.deduplicate && !self.deleted_seen.admit(&self.deleted, &row) {
            return false;
        }
        self.deleted.push(row);
        true
    }

    pub fn inserted(&self) -> &[RowValue] {
        &self.inserted
    }

    pub fn deleted(&self) -> &[RowValue] {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }

    /// Consume the node, yielding `(inserted, deleted)`.
    pub fn into_rows(self) -> (Vec<RowValue>, Vec<RowValue>) {
        (self.inserted, self.deleted)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::value::{Provenance, Scalar};

    fn row(v: i64, origin: u64) -> RowValue {
        let mut r = RowValue::from_scalars([Scalar::Int(v)]);
        r.for_each_leaf_mut(&mut |l| l.provenance = Provenance::single(OriginHandle(origin)));
        r
    }

    #[test]
    fn test_set_semantics_ignore_provenance() {
        let mut node = ChangeNode::new(RowValue::record(vec![]), true);
        assert!(node.push_inserted(row(1, 1)));
        assert!(!node.push_inserted(row(1, 2)));
        assert!(node.push_inserted(row(2, 1)));
        assert!(node.push_deleted(row(1, 1)));
        assert_eq!(node.inserted().len(), 2);
        assert_eq!(node.deleted().len(), 1);
    }

    #[test]
    fn test_bag_semantics_when_not_deduplicating() {
        let mut node = ChangeNode::new(RowValue::record(vec![]), false);
        node.push_inserted(row(1, 1));
        node.push_inserted(row(1, 1));
        assert_eq!(node.inserted().len(), 2);
    }

    #[test]
    fn test_origins_cover_both_sides() {
        let mut node = ChangeNode::new(RowValue::record(vec![]), true);
        node.push_inserted(row(1, 3));
        node.push_deleted(row(1, 5));
        assert_eq!(
            node.origins().into_iter().collect::<Vec<_>>(),
            vec![OriginHandle(3), OriginHandle(5)]
        );
        assert!(!node.is_empty());
    }
}
