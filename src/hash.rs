//! xxHash-based row fingerprints.
//!
//! Fingerprints are deterministic 64-bit hashes over a row's values and
//! qualities. Provenance and leaf identities are not hashed, so two rows
//! that would produce the same DML share a fingerprint.
//!
//! [`RowIndex`] uses fingerprints to find duplicate rows in a growing list
//! and confirms every hit by content, so a collision never drops a row.

use crate::propagate::value::{RowValue, Scalar, ValueQuality};
use std::collections::HashMap;
use xxhash_rust::xxh64::Xxh64;

/// Fixed seed for deterministic hashing.
const SEED: u64 = 0x517cc1b727220a95;

/// Compute the fingerprint of a row.
pub fn row_fingerprint(row: &RowValue) -> u64 {
    let mut hasher = Xxh64::new(SEED);
    write_row(&mut hasher, row);
    hasher.digest()
}

/// Positions of the rows of a list, bucketed by fingerprint.
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    buckets: HashMap<u64, Vec<usize>>,
}

impl RowIndex {
    pub fn new() -> Self {
        RowIndex::default()
    }

    /// Admit `row` as the next element of `rows`. Returns false when `rows`
    /// already holds a row with the same content.
    pub fn admit(&mut self, rows: &[RowValue], row: &RowValue) -> bool {
        self.admit_with(row_fingerprint(row), rows, row)
    }

    fn admit_with(&mut self, fingerprint: u64, rows: &[RowValue], row: &RowValue) -> bool {
        let bucket = self.buckets.entry(fingerprint).or_default();
        if bucket
            .iter()
            .any(|&i| rows.get(i).is_some_and(|seen| seen.same_content(row)))
        {
            return false;
        }
        bucket.push(rows.len());
        true
    }
}

fn write_row(hasher: &mut Xxh64, row: &RowValue) {
    match row {
        RowValue::Scalar(leaf) => {
            hasher.update(&[b'S', quality_tag(leaf.quality)]);
            write_scalar(hasher, &leaf.value);
        }
        RowValue::Record(children) => {
            hasher.update(b"R");
            write_children(hasher, children);
        }
        RowValue::NullExtended { quality, children } => {
            hasher.update(&[b'N', quality_tag(*quality)]);
            write_children(hasher, children);
        }
    }
}

fn write_children(hasher: &mut Xxh64, children: &[RowValue]) {
    hasher.update(&(children.len() as u64).to_le_bytes());
    for child in children {
        write_row(hasher, child);
    }
    hasher.update(b"\x1E"); // record separator
}

fn quality_tag(q: ValueQuality) -> u8 {
    match q {
        ValueQuality::Normal => 0,
        ValueQuality::Unknown => 1,
        ValueQuality::NullModified => 2,
        ValueQuality::NullPreserve => 3,
    }
}

fn write_scalar(hasher: &mut Xxh64, value: &Scalar) {
    match value {
        Scalar::Null => hasher.update(b"\x00NULL\x00"),
        Scalar::Bool(b) => hasher.update(&[b'b', *b as u8]),
        Scalar::Int(i) => {
            hasher.update(b"i");
            hasher.update(&i.to_le_bytes());
        }
        Scalar::Float(f) => {
            hasher.update(b"f");
            hasher.update(&f.to_bits().to_le_bytes());
        }
        Scalar::Text(s) => {
            hasher.update(b"t");
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Scalar::Bytes(b) => {
            hasher.update(b"x");
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}
