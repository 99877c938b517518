//! Error types for update propagation.
//!
//! All errors that can occur while propagating a change batch are
//! represented by [`PropagationError`] and returned through
//! `Result<T, PropagationError>`. Every error aborts the whole pass; no
//! partial per-table change sets are ever returned.
//!
//! # Error Classification
//!
//! - **User**: the change batch cannot be expressed against the mapping
//!   (unsupported change combinations, malformed extracted changes). The
//!   caller reports the implicated objects; retrying the same batch fails
//!   the same way.
//! - **Mapping**: the view tree is not something the propagator can
//!   evaluate (non-equi join conditions, selectors naming absent slots).
//! - **Config**: settings could not be parsed.
//! - **Internal**: bugs.
//!
//! Nothing here is retryable.

use crate::propagate::rules::Ops;
use crate::propagate::value::OriginHandle;
use std::fmt;

/// Primary error type of the crate.
#[derive(Debug, thiserror::Error)]
pub enum PropagationError {
    // ── User errors ──────────────────────────────────────────────────────
    /// A join key's presence mask maps to Unsupported in the active rule
    /// table, e.g. a lone left delete under an inner join.
    #[error(
        "unsupported change combination {ops} at {join} for key {key}; implicated objects: {}",
        format_origins(.origins)
    )]
    UnsupportedChangeCombination {
        join: String,
        ops: Ops,
        key: String,
        origins: Vec<OriginHandle>,
    },

    /// An extracted change breaks the kind/row invariant.
    #[error("invalid change for {origin}: {reason}")]
    InvalidChange { origin: OriginHandle, reason: String },

    // ── Mapping errors ───────────────────────────────────────────────────
    /// A join condition is not a conjunction of left/right property
    /// equalities.
    #[error("malformed join condition: {0}")]
    MalformedJoinCondition(String),

    /// A selector or predicate references a slot the row does not have.
    #[error("missing slot: {0}")]
    MissingSlot(String),

    /// The mapping views are structurally unusable.
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    // ── Config errors ────────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),

    // ── Internal errors ──────────────────────────────
    #[error("internal error: {0}")]
    InternalError(String),
}

fn format_origins(origins: &[OriginHandle]) -> String {
    origins
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Classification of an error for callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationErrorKind {
    User,
    Mapping,
    Config,
    Internal,
}

impl fmt::Display for PropagationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationErrorKind::User => write!(f, "USER"),
            PropagationErrorKind::Mapping => write!(f, "MAPPING"),
            PropagationErrorKind::Config => write!(f, "CONFIG"),
            PropagationErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl PropagationError {
    pub fn kind(&self) -> PropagationErrorKind {
        match self {
            PropagationError::UnsupportedChangeCombination { .. }
            | PropagationError::InvalidChange { .. } => PropagationErrorKind::User,

            PropagationError::MalformedJoinCondition(_)
            | PropagationError::MissingSlot(_)
            | PropagationError::InvalidMapping(_) => PropagationErrorKind::Mapping,

            PropagationError::Config(_) => PropagationErrorKind::Config,

            PropagationError::InternalError(_) => PropagationErrorKind::Internal,
        }
    }

    /// Propagation failures are deterministic in their inputs.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Every tracked object implicated by this error, sorted.
    pub fn origins(&self) -> Vec<OriginHandle> {
        match self {
            PropagationError::UnsupportedChangeCombination { origins, .. } => origins.clone(),
            PropagationError::InvalidChange { origin, .. } => vec![*origin],
            _ => Vec::new(),
        }
    }
}
