//! Distance-weighted majority vote over the k nearest neighbours

use crate::neighbors::{sort_neighbors, Neighbor};
use std::collections::BTreeMap;

/// Added to every distance so an exact match gets a large but finite weight
pub const VOTE_EPSILON: f64 = 1e-5;

/// Vote weight of a neighbour at `distance`
#[inline]
pub fn vote_weight(distance: f64) -> f64 {
    1.0 / (distance + VOTE_EPSILON)
}

/// Returns the label with the greatest accumulated `1 / (d + eps)` weight.
///
/// Neighbours are put in canonical order first so the floating point sums
/// do not depend on how the search produced them. Among labels with exactly
/// equal weight the lexicographically smallest one wins. `None` only for an
/// empty neighbour list.
pub fn weighted_vote<'l, L: AsRef<str>>(neighbors: &mut [Neighbor], labels: &'l [L]) -> Option<&'l str> {
    sort_neighbors(neighbors);

    let mut scores: BTreeMap<&'l str, f64> = BTreeMap::new();
    for neighbor in neighbors.iter() {
        let label = labels[neighbor.index].as_ref();
        *scores.entry(label).or_insert(0.0) += vote_weight(neighbor.distance);
    }

    let mut best: Option<(&'l str, f64)> = None;
    for (label, score) in scores {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((label, score)),
        }
    }
    best.map(|(label, _)| label)
}
