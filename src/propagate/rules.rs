//! Join propagation rules.
//!
//! For every join key the propagator records which of four row buckets
//! hold a row: left insert, left delete, right insert, right delete. The
//! 4-bit presence mask indexes two constant tables per join kind, one for
//! the insert side and one for the delete side. Each entry names the rows
//! to combine, possibly requesting a synthesized stand-in:
//!
//! - `LEFT_UNKNOWN` / `RIGHT_UNKNOWN`: the side exists but was not
//!   changed; use its placeholder (values untrusted).
//! - `RIGHT_NULL_MODIFIED`: the right side is no longer present; pad the
//!   new row with explicit nulls that overwrite the old values.
//! - `RIGHT_NULL_PRESERVE`: the right side was already absent; pad with
//!   explicit nulls.
//!
//! Presence masks (bit 0 = LI, 1 = LD, 2 = RI, 3 = RD):
//!
//! | mask | input     | inner insert | inner delete | left outer insert | left outer delete |
//! |------|-----------|--------------|--------------|-------------------|-------------------|
//! | 0    | -         | -            | -            | -                 | -                 |
//! | 1    | LI        | ✗            | ✗            | LI+R∅mod          | -                 |
//! | 2    | LD        | ✗            | ✗            | -                 | LD+R∅pre          |
//! | 3    | LI LD     | LI+R?        | LD+R?        | LI+R?             | LD+R?             |
//! | 4    | RI        | ✗            | ✗            | L?+RI             | L?+R∅pre          |
//! | 5    | LI RI     | LI+RI        | -            | LI+RI             | -                 |
//! | 6    | LD RI     | ✗            | ✗            | ✗                 | ✗                 |
//! | 7    | LI LD RI  | ✗            | ✗            | LI+RI             | LD+R∅pre          |
//! | 8    | RD        | ✗            | ✗            | L?+R∅mod          | L?+RD             |
//! | 9    | LI RD     | ✗            | ✗            | ✗                 | ✗                 |
//! | 10   | LD RD     | -            | LD+RD        | -                 | LD+RD             |
//! | 11   | LI LD RD  | ✗            | ✗            | LI+R∅mod          | LD+RD             |
//! | 12   | RI RD     | L?+RI        | L?+RD        | L?+RI             | L?+RD             |
//! | 13   | LI RI RD  | ✗            | ✗            | ✗                 | ✗                 |
//! | 14   | LD RI RD  | ✗            | ✗            | ✗                 | ✗                 |
//! | 15   | all       | LI+RI        | LD+RD        | LI+RI             | LD+RD             |
//!
//! (`?` = Unknown, `∅mod`/`∅pre` = NullModified/NullPreserve, `✗` =
//! Unsupported.) Under an inner join both sides must always have a
//! partner; under a left outer join every right row must have a left
//! partner. Combinations that break that, before or after the change,
//! are unsupported.

use crate::propagate::view::JoinKind;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of row buckets and synthesis requests.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ops(u16);

impl Ops {
    pub const NOTHING: Ops = Ops(0);
    pub const LEFT_INSERT: Ops = Ops(1);
    pub const LEFT_DELETE: Ops = Ops(1 << 1);
    pub const RIGHT_INSERT: Ops = Ops(1 << 2);
    pub const RIGHT_DELETE: Ops = Ops(1 << 3);
    pub const LEFT_UNKNOWN: Ops = Ops(1 << 5);
    pub const RIGHT_NULL_MODIFIED: Ops = Ops(1 << 7);
    pub const RIGHT_NULL_PRESERVE: Ops = Ops(1 << 8);
    pub const RIGHT_UNKNOWN: Ops = Ops(1 << 9);
    pub const UNSUPPORTED: Ops = Ops(1 << 12);

    pub const LEFT_UPDATE: Ops = Ops::LEFT_INSERT.union(Ops::LEFT_DELETE);
    pub const RIGHT_UPDATE: Ops = Ops::RIGHT_INSERT.union(Ops::RIGHT_DELETE);
    /// The four presence bits.
    pub const INPUTS: Ops = Ops::LEFT_UPDATE.union(Ops::RIGHT_UPDATE);
    /// Either Unknown request.
    pub const UNKNOWN: Ops = Ops::LEFT_UNKNOWN.union(Ops::RIGHT_UNKNOWN);
    /// Every bit that requests a synthesized row.
    pub const SYNTHESIZED: Ops = Ops::UNKNOWN
        .union(Ops::RIGHT_NULL_MODIFIED)
        .union(Ops::RIGHT_NULL_PRESERVE);

    const NAMES: [(Ops, &'static str); 9] = [
        (Ops::LEFT_INSERT, "LeftInsert"),
        (Ops::LEFT_DELETE, "LeftDelete"),
        (Ops::RIGHT_INSERT, "RightInsert"),
        (Ops::RIGHT_DELETE, "RightDelete"),
        (Ops::LEFT_UNKNOWN, "LeftUnknown"),
        (Ops::RIGHT_NULL_MODIFIED, "RightNullModified"),
        (Ops::RIGHT_NULL_PRESERVE, "RightNullPreserve"),
        (Ops::RIGHT_UNKNOWN, "RightUnknown"),
        (Ops::UNSUPPORTED, "Unsupported"),
    ];

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn union(self, other: Ops) -> Ops {
        Ops(self.0 | other.0)
    }

    pub const fn intersection(self, other: Ops) -> Ops {
        Ops(self.0 & other.0)
    }

    pub const fn contains(self, other: Ops) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Ops) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_unsupported(self) -> bool {
        self.contains(Ops::UNSUPPORTED)
    }

    /// Build the presence mask from the four buckets.
    pub const fn from_presence(
        left_insert: bool,
        left_delete: bool,
        right_insert: bool,
        right_delete: bool,
    ) -> Ops {
        let mut bits = 0;
        if left_insert {
            bits |= Ops::LEFT_INSERT.0;
        }
        if left_delete {
            bits |= Ops::LEFT_DELETE.0;
        }
        if right_insert {
            bits |= Ops::RIGHT_INSERT.0;
        }
        if right_delete {
            bits |= Ops::RIGHT_DELETE.0;
        }
        Ops(bits)
    }

    /// Rebuild a presence mask from a table index.
    pub const fn from_mask(mask: usize) -> Ops {
        Ops((mask & 0xF) as u16)
    }

    /// Table index of a presence mask.
    pub const fn mask(self) -> usize {
        (self.0 & Ops::INPUTS.0) as usize
    }
}

impl BitOr for Ops {
    type Output = Ops;
    fn bitor(self, rhs: Ops) -> Ops {
        self.union(rhs)
    }
}

impl BitOrAssign for Ops {
    fn bitor_assign(&mut self, rhs: Ops) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for Ops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Nothing");
        }
        let mut first = true;
        for (flag, name) in Ops::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Ops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ops({self})")
    }
}

// ── Rule tables ─────────────────────────────────────────────────────────

const N: Ops = Ops::NOTHING;
const X: Ops = Ops::UNSUPPORTED;
const LI: Ops = Ops::LEFT_INSERT;
const LD: Ops = Ops::LEFT_DELETE;
const RI: Ops = Ops::RIGHT_INSERT;
const RD: Ops = Ops::RIGHT_DELETE;
const LU: Ops = Ops::LEFT_UNKNOWN;
const RU: Ops = Ops::RIGHT_UNKNOWN;
const RNM: Ops = Ops::RIGHT_NULL_MODIFIED;
const RNP: Ops = Ops::RIGHT_NULL_PRESERVE;

/// Insert and delete rules of one join kind, indexed by presence mask.
#[derive(Debug)]
pub struct RuleTable {
    pub kind: JoinKind,
    insert: [Ops; 16],
    delete: [Ops; 16],
}

impl RuleTable {
    pub fn insert_rule(&self, input: Ops) -> Ops {
        self.insert[input.mask()]
    }

    pub fn delete_rule(&self, input: Ops) -> Ops {
        self.delete[input.mask()]
    }
}

pub static INNER_JOIN_RULES: RuleTable = RuleTable {
    kind: JoinKind::Inner,
    insert: [
        N,              // 0
        X,              // 1  LI
        X,              // 2  LD
        LI.union(RU),   // 3  LI LD
        X,              // 4  RI
        LI.union(RI),   // 5  LI RI
        X,              // 6  LD RI
        X,              // 7  LI LD RI
        X,              // 8  RD
        X,              // 9  LI RD
        N,              // 10 LD RD
        X,              // 11 LI LD RD
        LU.union(RI),   // 12 RI RD
        X,              // 13 LI RI RD
        X,              // 14 LD RI RD
        LI.union(RI),   // 15 all
    ],
    delete: [
        N,              // 0
        X,              // 1  LI
        X,              // 2  LD
        LD.union(RU),   // 3  LI LD
        X,              // 4  RI
        N,              // 5  LI RI
        X,              // 6  LD RI
        X,              // 7  LI LD RI
        X,              // 8  RD
        X,              // 9  LI RD
        LD.union(RD),   // 10 LD RD
        X,              // 11 LI LD RD
        LU.union(RD),   // 12 RI RD
        X,              // 13 LI RI RD
        X,              // 14 LD RI RD
        LD.union(RD),   // 15 all
    ],
};

pub static LEFT_OUTER_JOIN_RULES: RuleTable = RuleTable {
    kind: JoinKind::LeftOuter,
    insert: [
        N,              // 0
        LI.union(RNM),  // 1  LI
        N,              // 2  LD
        LI.union(RU),   // 3  LI LD
        LU.union(RI),   // 4  RI
        LI.union(RI),   // 5  LI RI
        X,              // 6  LD RI
        LI.union(RI),   // 7  LI LD RI
        LU.union(RNM),  // 8  RD
        X,              // 9  LI RD
        N,              // 10 LD RD
        LI.union(RNM),  // 11 LI LD RD
        LU.union(RI),   // 12 RI RD
        X,              // 13 LI RI RD
        X,              // 14 LD RI RD
        LI.union(RI),   // 15 all
    ],
    delete: [
        N,              // 0
        N,              // 1  LI
        LD.union(RNP),  // 2  LD
        LD.union(RU),   // 3  LI LD
        LU.union(RNP),  // 4  RI
        N,              // 5  LI RI
        X,              // 6  LD RI
        LD.union(RNP),  // 7  LI LD RI
        LU.union(RD),   // 8  RD
        X,              // 9  LI RD
        LD.union(RD),   // 10 LD RD
        LD.union(RD),   // 11 LI LD RD
        LU.union(RD),   // 12 RI RD
        X,              // 13 LI RI RD
        X,              // 14 LD RI RD
        LD.union(RD),   // 15 all
    ],
};

/// The rule tables for a join kind.
pub fn rules_for(kind: JoinKind) -> &'static RuleTable {
    match kind {
        JoinKind::Inner => &INNER_JOIN_RULES,
        JoinKind::LeftOuter => &LEFT_OUTER_JOIN_RULES,
    }
}
