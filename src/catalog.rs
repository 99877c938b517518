//! Extent metadata cache.
//!
//! For every extent the propagator needs to know which store tables a
//! change over it can affect, and on which end of a join it sits in each
//! of them. The answer depends only on the (immutable) mapping views, so
//! it is computed at most once per extent and shared.
//!
//! Readers share the cache through an `RwLock`. On a miss the writer
//! re-checks under the write lock before computing, so concurrent callers
//! never compute the same extent twice and never observe a partially
//! populated entry.

use crate::error::PropagationError;
use crate::propagate::view::{JoinKind, MappingView, ViewNode};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// What the mapping says about one extent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentMetadata {
    /// Tables with a cell over the extent.
    pub affected_tables: BTreeSet<String>,
    /// Tables where the extent is read on a required end: either side of
    /// an inner join or the left side of a left outer join.
    pub required_in: BTreeSet<String>,
    /// Tables where the extent is read on the optional (right) end of a
    /// left outer join.
    pub optional_in: BTreeSet<String>,
}

impl ExtentMetadata {
    /// Compute the metadata of `extent` from the mapping views.
    pub fn compute(extent: &str, views: &[MappingView]) -> Self {
        let mut meta = ExtentMetadata::default();
        for view in views {
            collect(&view.root, extent, &view.table, None, &mut meta);
        }
        meta
    }
}

/// `end` is `Some(required)` inside a join: whether every enclosing join
/// input on the way down is a required end.
fn collect(
    node: &ViewNode,
    extent: &str,
    table: &str,
    end: Option<bool>,
    meta: &mut ExtentMetadata,
) {
    match node {
        ViewNode::Leaf(cell) => {
            if cell.extent != extent {
                return;
            }
            meta.affected_tables.insert(table.to_string());
            match end {
                Some(true) => meta.required_in.insert(table.to_string()),
                Some(false) => meta.optional_in.insert(table.to_string()),
                None => false,
            };
        }
        ViewNode::Join {
            kind, left, right, ..
        } => {
            let required = end.unwrap_or(true);
            collect(left, extent, table, Some(required), meta);
            let right_required = required && *kind == JoinKind::Inner;
            collect(right, extent, table, Some(right_required), meta);
        }
        ViewNode::Union { children } => {
            for child in children {
                collect(child, extent, table, end, meta);
            }
        }
    }
}

/// Shared, lazily populated extent metadata.
#[derive(Debug, Default)]
pub struct ExtentCatalog {
    entries: RwLock<HashMap<String, Arc<ExtentMetadata>>>,
    computations: AtomicUsize,
}

impl ExtentCatalog {
    pub fn new() -> Self {
        ExtentCatalog::default()
    }

    /// The metadata of `extent`, computing it on first use.
    pub fn get_or_compute(
        &self,
        extent: &str,
        views: &[MappingView],
    ) -> Result<Arc<ExtentMetadata>, PropagationError> {
        {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            if let Some(meta) = entries.get(extent) {
                return Ok(Arc::clone(meta));
            }
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        // Another writer may have filled the entry while we waited.
        if let Some(meta) = entries.get(extent) {
            return Ok(Arc::clone(meta));
        }
        let meta = Arc::new(ExtentMetadata::compute(extent, views));
        tracing::debug!(
            extent,
            tables = meta.affected_tables.len(),
            "computed extent metadata"
        );
        self.computations.fetch_add(1, Ordering::Relaxed);
        entries.insert(extent.to_string(), Arc::clone(&meta));
        Ok(meta)
    }

    /// Number of extents computed so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) -> Result<(), PropagationError> {
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

fn poisoned() -> PropagationError {
    PropagationError::InternalError("extent catalog lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::operators::test_helpers::*;
    use std::thread;

    fn views() -> Vec<MappingView> {
        let layout = test_layout();
        vec![
            MappingView::new(
                "CustomerDetails",
                &layout,
                &["id", "name", "detail"],
                customer_detail_join(JoinKind::LeftOuter),
            )
            .unwrap(),
            MappingView::new("Customers", &layout, &["id", "name"], customer_leaf()).unwrap(),
        ]
    }

    #[test]
    fn test_compute_required_and_optional_ends() {
        let views = views();
        let customers = ExtentMetadata::compute("Customers", &views);
        assert_eq!(customers.affected_tables.len(), 2);
        assert!(customers.required_in.contains("CustomerDetails"));
        assert!(customers.optional_in.is_empty());

        let details = ExtentMetadata::compute("Details", &views);
        assert_eq!(
            details.affected_tables.iter().collect::<Vec<_>>(),
            vec!["CustomerDetails"]
        );
        assert!(details.optional_in.contains("CustomerDetails"));

        assert!(ExtentMetadata::compute("Orders", &views).affected_tables.is_empty());
    }

    #[test]
    fn test_get_or_compute_caches() {
        let views = views();
        let catalog = ExtentCatalog::new();
        let a = catalog.get_or_compute("Customers", &views).unwrap();
        let b = catalog.get_or_compute("Customers", &views).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.computations(), 1);
        assert_eq!(catalog.len(), 1);
        catalog.clear().unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_concurrent_readers_compute_once() {
        let views = Arc::new(views());
        let catalog = Arc::new(ExtentCatalog::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let views = Arc::clone(&views);
                let catalog = Arc::clone(&catalog);
                thread::spawn(move || {
                    catalog
                        .get_or_compute("Details", &views)
                        .unwrap()
                        .affected_tables
                        .len()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
        assert_eq!(catalog.computations(), 1);
    }
}
