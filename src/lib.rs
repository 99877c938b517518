//! update_propagator: change propagation through relational mapping views.
//!
//! Given a declarative mapping from conceptual extents (entity and
//! association sets) to store tables, expressed as a tree of inner joins,
//! left outer joins and unions over per-table cell queries, this crate
//! translates a batch of entity-level changes into per-table row deletes
//! and inserts.
//!
//! Changes are seeded at the leaves, matched by join key at every join
//! using a fixed rule table, padded with explicit nulls across outer
//! joins, and finally projected onto each table's columns. Values that a
//! pass cannot know are flagged Unknown rather than guessed.

pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod propagate;

pub use config::PropagatorConfig;
pub use error::{PropagationError, PropagationErrorKind};
pub use propagate::{ExtractedChange, MappingView, PropagationResult, Propagator, TableChangeSet};
