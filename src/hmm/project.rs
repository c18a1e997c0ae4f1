//! Restriction of an alignment onto a node subset.

use crate::core::alignment::Alignment;

/// Ordered original-column indices that hold at least one character among
/// `nodes`. This ordering is the canonical column order of the
/// sub-alignment; path encoding walks exactly these columns.
pub fn getorder(alignment: &Alignment, nodes: &[usize]) -> Vec<usize> {
    (0..alignment.len())
        .filter(|&c| nodes.iter().any(|&n| alignment.character(c, n)))
        .collect()
}

/// The alignment restricted to `nodes` (rows in subset order) and to the
/// columns of [`getorder`], in that order.
pub fn project(alignment: &Alignment, nodes: &[usize]) -> Alignment {
    let order = getorder(alignment, nodes);
    let mut projected = Alignment::new(nodes.len());
    projected.changelength(order.len());
    for (target, &c) in order.iter().enumerate() {
        for (row, &n) in nodes.iter().enumerate() {
            projected.set(target, row, alignment.cell(c, n));
        }
    }
    projected
}
