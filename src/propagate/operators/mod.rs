//! Per-operator propagation rules.
//!
//! Each view node kind has its own propagation logic that turns the
//! children's change nodes (or, for leaves, the change batch) into the
//! node's own change node.

pub mod join;
pub mod join_common;
pub mod scan;
#[cfg(test)]
pub(crate) mod test_helpers;
pub mod union_all;
