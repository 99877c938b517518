//! Extracted changes.
//!
//! An [`ExtractedChange`] normalizes one tracked object's state change into
//! optional original and current rows of the extent it belongs to. The
//! change tracker that produces them is external; this module only
//! enforces the kind/row invariant:
//!
//! | kind      | original | current |
//! |-----------|----------|---------|
//! | Added     | absent   | present |
//! | Deleted   | present  | absent  |
//! | Modified  | present  | present |
//! | Unchanged | present  | present |

use crate::error::PropagationError;
use crate::propagate::value::{OriginHandle, RowValue};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One tracked object's change, as rows of its extent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedChange {
    pub kind: ChangeKind,
    pub original: Option<RowValue>,
    pub current: Option<RowValue>,
    /// Reference to the tracked object, for diagnostics.
    pub origin: OriginHandle,
    /// Extent (entity or association set) the rows belong to.
    pub extent: String,
}

impl ExtractedChange {
    /// Build a change, checking the kind/row invariant.
    pub fn new(
        kind: ChangeKind,
        original: Option<RowValue>,
        current: Option<RowValue>,
        origin: OriginHandle,
        extent: &str,
    ) -> Result<Self, PropagationError> {
        let change = ExtractedChange {
            kind,
            original,
            current,
            origin,
            extent: extent.to_string(),
        };
        change.validate()?;
        Ok(change)
    }

    pub fn added(extent: &str, origin: OriginHandle, current: RowValue) -> Self {
        ExtractedChange {
            kind: ChangeKind::Added,
            original: None,
            current: Some(current),
            origin,
            extent: extent.to_string(),
        }
    }

    pub fn deleted(extent: &str, origin: OriginHandle, original: RowValue) -> Self {
        ExtractedChange {
            kind: ChangeKind::Deleted,
            original: Some(original),
            current: None,
            origin,
            extent: extent.to_string(),
        }
    }

    pub fn modified(
        extent: &str,
        origin: OriginHandle,
        original: RowValue,
        current: RowValue,
    ) -> Self {
        ExtractedChange {
            kind: ChangeKind::Modified,
            original: Some(original),
            current: Some(current),
            origin,
            extent: extent.to_string(),
        }
    }

    pub fn unchanged(extent: &str, origin: OriginHandle, row: RowValue) -> Self {
        ExtractedChange {
            kind: ChangeKind::Unchanged,
            original: Some(row.clone()),
            current: Some(row),
            origin,
            extent: extent.to_string(),
        }
    }

    /// Check the kind/row invariant.
    pub fn validate(&self) -> Result<(), PropagationError> {
        let (want_original, want_current) = match self.kind {
            ChangeKind::Added => (false, true),
            ChangeKind::Deleted => (true, false),
            ChangeKind::Modified | ChangeKind::Unchanged => (true, true),
        };
        let reason = match (
            self.original.is_some() == want_original,
            self.current.is_some() == want_current,
        ) {
            (true, true) => return Ok(()),
            (false, _) if want_original => "original row is missing",
            (false, _) => "original row must be absent",
            (_, false) if want_current => "current row is missing",
            (_, false) => "current row must be absent",
        };
        Err(PropagationError::InvalidChange {
            origin: self.origin,
            reason: format!("{} change on {}: {reason}", self.kind, self.extent),
        })
    }

    /// The row this change contributes to Inserted, if any.
    pub fn inserted_row(&self) -> Option<&RowValue> {
        match self.kind {
            ChangeKind::Added | ChangeKind::Modified => self.current.as_ref(),
            ChangeKind::Deleted | ChangeKind::Unchanged => None,
        }
    }

    /// The row this change contributes to Deleted, if any.
    pub fn deleted_row(&self) -> Option<&RowValue> {
        match self.kind {
            ChangeKind::Deleted | ChangeKind::Modified => self.original.as_ref(),
            ChangeKind::Added | ChangeKind::Unchanged => None,
        }
    }
}
