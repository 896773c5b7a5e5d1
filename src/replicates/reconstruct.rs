//! Branch-length reconstruction from rate annotations.
//!
//! Tree logs from relaxed-clock analyses store a per-branch rate next to the
//! branch's raw length; the product of the two is the effective length. The
//! reconstruction rewrites node heights top-down so every branch carries its
//! rate-scaled length, leaving the root height untouched.

use crate::tree::Tree;

/// The effective rate of a branch: its annotation when positive, otherwise 1.
/// An integer annotation of 0 would produce a degenerate zero-length branch,
/// so it is floored to 1; an absent annotation scales by identity.
fn effective_rate(rate: Option<f64>) -> f64 {
    match rate {
        Some(r) if r > 0.0 => r,
        _ => 1.0,
    }
}

/// Rate-scaled raw branch lengths, indexed by node id.
pub fn rate_scaled_lengths(tree: &Tree) -> Vec<f64> {
    (0..tree.node_count())
        .map(|id| tree.branch_length(id) * effective_rate(tree.node(id).rate))
        .collect()
}

/// Rewrite heights so each branch carries its rate-scaled length.
///
/// Runs in pre-order: a child's new height depends on its parent's already
/// updated height. Cannot fail; a tree without annotations round-trips
/// exactly.
pub fn scale_by_rate(tree: &mut Tree) {
    let lengths = rate_scaled_lengths(tree);
    let order: Vec<_> = tree.iter_preorder().collect();
    for id in order {
        if let Some(parent) = tree.node(id).parent {
            tree.node_mut(id).height = tree.node(parent).height - lengths[id];
        }
    }
}
