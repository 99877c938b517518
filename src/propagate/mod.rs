//! Change propagation engine.
//!
//! This module pushes a batch of extracted entity changes bottom-up
//! through the mapping view trees and produces, per store table, the rows
//! to delete and the rows to insert.
//!
//! # Submodules
//! - `value`: Row values with per-leaf quality and provenance
//! - `shape`: Row shapes and the global slot layout
//! - `view`: Mapping view trees (leaf, join, union)
//! - `key`: Composite join keys
//! - `rules`: Join rule tables
//! - `extract`: Extracted changes
//! - `change_node`: Per-node Inserted/Deleted/Placeholder
//! - `slots`: Slot resolution
//! - `walk`: Propagation framework and the `Propagator` entry point
//! - `operators`: Per-operator propagation rules
//!
//! # Usage
//! ```ignore
//! use update_propagator::propagate::{Propagator, ExtractedChange};
//!
//! let propagator = Propagator::with_defaults(layout, views)?;
//! let result = propagator.propagate(&changes)?;
//! for table in result.iter() {
//!     // issue table.deleted, then table.inserted
//! }
//! ```

pub mod change_node;
pub mod extract;
pub mod key;
pub mod operators;
pub mod rules;
pub mod shape;
pub mod slots;
pub mod value;
pub mod view;
pub mod walk;

pub use change_node::ChangeNode;
pub use extract::{ChangeKind, ExtractedChange};
pub use key::{CompositeKey, KeySelector, KeySource, extract_key};
pub use rules::{Ops, RuleTable, rules_for};
pub use shape::{RowShape, ShapeField, SlotId, SlotLayout};
pub use slots::{ProjectedSlot, resolve_slot};
pub use value::{Leaf, OriginHandle, Provenance, RowValue, Scalar, ValueQuality};
pub use view::{CellPredicate, CellQuery, Expr, JoinKind, JoinSide, MappingView, ViewNode};
pub use walk::{PropagationContext, PropagationResult, Propagator, TableChangeSet};
