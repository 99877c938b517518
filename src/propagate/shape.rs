//! Row shapes and the global slot layout.
//!
//! All view nodes of a mapping share one ordinal [`SlotLayout`]: value
//! slots first, then one indicator slot per cell. A [`RowShape`] describes
//! the structure of the rows a view node produces and which slot each
//! scalar position carries:
//!
//! - leaf cells declare a flat shape of value fields;
//! - a join produces `[left, right]`, two nested fields;
//! - a union produces a flat shape over every slot its children project,
//!   in slot order, including the children's indicator slots.

use crate::error::PropagationError;
use crate::propagate::value::{Leaf, RowValue, Scalar, ValueQuality};
use std::fmt;

/// Ordinal position in the global slot layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// The global slot layout shared by every node of a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    value_slots: Vec<String>,
    indicator_slots: Vec<String>,
}

impl SlotLayout {
    /// Build a layout with the given value slot names and `cell_count`
    /// indicator slots named `_from{n}`.
    pub fn new(value_slots: &[&str], cell_count: usize) -> Self {
        SlotLayout {
            value_slots: value_slots.iter().map(|s| s.to_string()).collect(),
            indicator_slots: (0..cell_count).map(|n| format!("_from{n}")).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.value_slots.len() + self.indicator_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_slot_count(&self) -> usize {
        self.value_slots.len()
    }

    pub fn cell_count(&self) -> usize {
        self.indicator_slots.len()
    }

    /// Look up a value slot by name.
    pub fn value_slot(&self, name: &str) -> Option<SlotId> {
        self.value_slots.iter().position(|s| s == name).map(SlotId)
    }

    /// The indicator slot of cell `cell`.
    pub fn indicator_slot(&self, cell: usize) -> Result<SlotId, PropagationError> {
        if cell < self.indicator_slots.len() {
            Ok(SlotId(self.value_slots.len() + cell))
        } else {
            Err(PropagationError::InvalidMapping(format!(
                "cell {cell} has no indicator slot (layout has {} cells)",
                self.indicator_slots.len()
            )))
        }
    }

    pub fn is_indicator(&self, slot: SlotId) -> bool {
        slot.0 >= self.value_slots.len() && slot.0 < self.len()
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        slot.0 < self.len()
    }

    pub fn slot_name(&self, slot: SlotId) -> &str {
        let n = self.value_slots.len();
        if slot.0 < n {
            &self.value_slots[slot.0]
        } else {
            self.indicator_slots
                .get(slot.0 - n)
                .map(String::as_str)
                .unwrap_or("?")
        }
    }

    /// The padding constant for a slot no child projects: explicit null
    /// for value slots, explicit false for indicator slots.
    pub fn padding_value(&self, slot: SlotId) -> Scalar {
        if self.is_indicator(slot) {
            Scalar::Bool(false)
        } else {
            Scalar::Null
        }
    }
}

/// What a shape field carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Value(SlotId),
    Indicator(SlotId),
    Nested(RowShape),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeField {
    pub name: String,
    pub kind: FieldKind,
}

impl ShapeField {
    pub fn value(name: &str, slot: SlotId) -> Self {
        ShapeField {
            name: name.to_string(),
            kind: FieldKind::Value(slot),
        }
    }

    pub fn indicator(name: &str, slot: SlotId) -> Self {
        ShapeField {
            name: name.to_string(),
            kind: FieldKind::Indicator(slot),
        }
    }

    pub fn nested(name: &str, shape: RowShape) -> Self {
        ShapeField {
            name: name.to_string(),
            kind: FieldKind::Nested(shape),
        }
    }
}

/// Declared structure of the rows a view node produces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowShape {
    pub fields: Vec<ShapeField>,
}

impl RowShape {
    pub fn new(fields: Vec<ShapeField>) -> Self {
        RowShape { fields }
    }

    /// Flat shape of value fields named after their layout slots.
    pub fn of_slots(layout: &SlotLayout, slots: &[SlotId]) -> Self {
        RowShape {
            fields: slots
                .iter()
                .map(|&slot| {
                    let name = layout.slot_name(slot);
                    if layout.is_indicator(slot) {
                        ShapeField::indicator(name, slot)
                    } else {
                        ShapeField::value(name, slot)
                    }
                })
                .collect(),
        }
    }

    /// Shape of a join output: `[left, right]`.
    pub fn join(left: &RowShape, right: &RowShape) -> Self {
        RowShape {
            fields: vec![
                ShapeField::nested("left", left.clone()),
                ShapeField::nested("right", right.clone()),
            ],
        }
    }

    /// Resolve a property path to a positional path.
    ///
    /// The path is matched field by field from the top. A single-name path
    /// that does not match a top-level field is searched depth-first
    /// through nested fields, so `["id"]` finds the first scalar field
    /// named `id` anywhere in a join shape.
    pub fn resolve_path(&self, names: &[String]) -> Option<Vec<usize>> {
        if let Some(path) = self.resolve_exact(names) {
            return Some(path);
        }
        match names {
            [single] => self.find_scalar(single),
            _ => None,
        }
    }

    fn resolve_exact(&self, names: &[String]) -> Option<Vec<usize>> {
        let (first, rest) = names.split_first()?;
        let idx = self.fields.iter().position(|f| &f.name == first)?;
        if rest.is_empty() {
            return Some(vec![idx]);
        }
        match &self.fields[idx].kind {
            FieldKind::Nested(inner) => {
                let mut path = vec![idx];
                path.extend(inner.resolve_exact(rest)?);
                Some(path)
            }
            _ => None,
        }
    }

    fn find_scalar(&self, name: &str) -> Option<Vec<usize>> {
        for (idx, field) in self.fields.iter().enumerate() {
            match &field.kind {
                FieldKind::Nested(inner) => {
                    if let Some(mut sub) = inner.find_scalar(name) {
                        sub.insert(0, idx);
                        return Some(sub);
                    }
                }
                _ if field.name == name => return Some(vec![idx]),
                _ => {}
            }
        }
        None
    }

    /// The field kind at a positional path.
    pub fn field_at(&self, path: &[usize]) -> Option<&FieldKind> {
        let (first, rest) = path.split_first()?;
        let field = self.fields.get(*first)?;
        if rest.is_empty() {
            return Some(&field.kind);
        }
        match &field.kind {
            FieldKind::Nested(inner) => inner.field_at(rest),
            _ => None,
        }
    }

    /// The slot carried at a positional path, if it is a scalar field.
    pub fn slot_at(&self, path: &[usize]) -> Option<SlotId> {
        match self.field_at(path)? {
            FieldKind::Value(slot) | FieldKind::Indicator(slot) => Some(*slot),
            FieldKind::Nested(_) => None,
        }
    }

    /// Every scalar position in depth-first order with its slot.
    pub fn slot_paths(&self) -> Vec<(SlotId, Vec<usize>)> {
        let mut out = Vec::new();
        self.collect_slot_paths(&mut Vec::new(), &mut out);
        out
    }

    fn collect_slot_paths(&self, prefix: &mut Vec<usize>, out: &mut Vec<(SlotId, Vec<usize>)>) {
        for (idx, field) in self.fields.iter().enumerate() {
            prefix.push(idx);
            match &field.kind {
                FieldKind::Value(slot) | FieldKind::Indicator(slot) => {
                    out.push((*slot, prefix.clone()));
                }
                FieldKind::Nested(inner) => inner.collect_slot_paths(prefix, out),
            }
            prefix.pop();
        }
    }

    /// Path of the first top-level (non-nested) field carrying `slot`.
    pub fn top_level_path(&self, slot: SlotId) -> Option<Vec<usize>> {
        self.fields
            .iter()
            .position(|f| matches!(f.kind, FieldKind::Value(s) | FieldKind::Indicator(s) if s == slot))
            .map(|idx| vec![idx])
    }

    /// A row of this shape with every scalar `Null` under `quality`.
    pub fn null_row(&self, quality: ValueQuality) -> RowValue {
        RowValue::Record(
            self.fields
                .iter()
                .map(|field| match &field.kind {
                    FieldKind::Nested(inner) => inner.null_row(quality),
                    _ => RowValue::Scalar(Leaf::with_quality(Scalar::Null, quality)),
                })
                .collect(),
        )
    }

    /// The placeholder row: every slot present, flagged Unknown.
    pub fn placeholder(&self) -> RowValue {
        self.null_row(ValueQuality::Unknown)
    }

    /// Check that `row` has this shape's structure.
    pub fn conforms(&self, row: &RowValue) -> bool {
        match row {
            RowValue::Record(children) | RowValue::NullExtended { children, .. } => {
                children.len() == self.fields.len()
                    && self.fields.iter().zip(children).all(|(field, child)| {
                        match (&field.kind, child) {
                            (FieldKind::Nested(inner), c) => inner.conforms(c),
                            (_, RowValue::Scalar(_)) => true,
                            (_, _) => false,
                        }
                    })
            }
            RowValue::Scalar(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SlotLayout {
        SlotLayout::new(&["id", "name", "detail"], 2)
    }

    fn customer() -> RowShape {
        RowShape::new(vec![
            ShapeField::value("id", SlotId(0)),
            ShapeField::value("name", SlotId(1)),
        ])
    }

    fn detail() -> RowShape {
        RowShape::new(vec![
            ShapeField::value("id", SlotId(0)),
            ShapeField::value("detail", SlotId(2)),
        ])
    }

    #[test]
    fn test_layout_value_slots_precede_indicators() {
        let l = layout();
        assert_eq!(l.len(), 5);
        assert_eq!(l.value_slot("detail"), Some(SlotId(2)));
        assert_eq!(l.indicator_slot(1).unwrap(), SlotId(4));
        assert!(l.indicator_slot(2).is_err());
        assert!(l.is_indicator(SlotId(3)));
        assert!(!l.is_indicator(SlotId(2)));
        assert_eq!(l.slot_name(SlotId(3)), "_from0");
    }

    #[test]
    fn test_padding_value_by_slot_kind() {
        let l = layout();
        assert_eq!(l.padding_value(SlotId(1)), Scalar::Null);
        assert_eq!(l.padding_value(SlotId(4)), Scalar::Bool(false));
    }

    #[test]
    fn test_resolve_path_exact_and_search() {
        let shape = RowShape::join(&customer(), &detail());
        assert_eq!(
            shape.resolve_path(&["right".into(), "detail".into()]),
            Some(vec![1, 1])
        );
        // Single name searches depth-first: left subtree first.
        assert_eq!(shape.resolve_path(&["id".into()]), Some(vec![0, 0]));
        assert_eq!(shape.resolve_path(&["detail".into()]), Some(vec![1, 1]));
        assert_eq!(shape.resolve_path(&["missing".into()]), None);
        assert_eq!(shape.resolve_path(&["left".into(), "nope".into()]), None);
    }

    #[test]
    fn test_slot_paths_depth_first() {
        let shape = RowShape::join(&customer(), &detail());
        let paths = shape.slot_paths();
        assert_eq!(
            paths,
            vec![
                (SlotId(0), vec![0, 0]),
                (SlotId(1), vec![0, 1]),
                (SlotId(0), vec![1, 0]),
                (SlotId(2), vec![1, 1]),
            ]
        );
        assert_eq!(shape.slot_at(&[1, 1]), Some(SlotId(2)));
        assert_eq!(shape.slot_at(&[1]), None);
    }

    #[test]
    fn test_placeholder_conforms_and_is_unknown() {
        let shape = RowShape::join(&customer(), &detail());
        let p = shape.placeholder();
        assert!(shape.conforms(&p));
        assert_eq!(p.leaf_count(), 4);
        p.for_each_leaf(&mut |l| assert_eq!(l.quality, ValueQuality::Unknown));
        assert!(!customer().conforms(&p));
    }

    #[test]
    fn test_of_slots_marks_indicators() {
        let l = layout();
        let shape = RowShape::of_slots(&l, &[SlotId(0), SlotId(3)]);
        assert_eq!(shape.fields[1].kind, FieldKind::Indicator(SlotId(3)));
        assert_eq!(shape.top_level_path(SlotId(3)), Some(vec![1]));
        assert_eq!(shape.top_level_path(SlotId(2)), None);
    }
}
