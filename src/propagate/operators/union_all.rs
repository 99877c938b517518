//! Union propagation.
//!
//! Δ(A ∪ B) = ΔA ∪ ΔB, with no key matching. Children may project
//! different slots, so every child row is re-projected onto the union's
//! flat shape: one scalar per slot projected by any child, in slot order.
//! Slots a child does not project are padded (null for value slots,
//! false for indicators) and flagged NullPreserve.

use crate::error::PropagationError;
use crate::propagate::change_node::ChangeNode;
use crate::propagate::shape::SlotId;
use crate::propagate::slots::{project_row, resolve_slots};
use crate::propagate::view::ViewNode;
use crate::propagate::walk::PropagationContext;

/// Propagate a `Union` node.
pub fn propagate_union(
    ctx: &mut PropagationContext,
    node: &ViewNode,
) -> Result<ChangeNode, PropagationError> {
    let children = match node {
        ViewNode::Union { children } => children,
        _ => {
            return Err(PropagationError::InternalError(
                "propagate_union called on non-Union node".into(),
            ));
        }
    };
    if children.is_empty() {
        return Err(PropagationError::InvalidMapping(
            "union has no children".into(),
        ));
    }

    let layout = ctx.layout;
    let slots: Vec<SlotId> = node.projected_slots(layout)?.into_iter().collect();
    let shape = node.shape(layout)?;
    let mut out = ChangeNode::new(shape.placeholder(), ctx.config.deduplicate_rows);

    for child in children {
        let child_changes = ctx.propagate_node(child)?;
        if child_changes.is_empty() {
            continue;
        }
        let resolved = resolve_slots(child, &slots, layout)?;
        for row in child_changes.inserted() {
            out.push_inserted(project_row(row, &resolved, layout)?);
        }
        for row in child_changes.deleted() {
            out.push_deleted(project_row(row, &resolved, layout)?);
        }
    }
    Ok(out)
}
