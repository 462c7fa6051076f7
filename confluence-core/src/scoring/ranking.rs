//! Candidate ranking.

use std::cmp::Ordering;

use crate::domain::Candidate;

/// Best first: ensemble desc, confluence desc, conviction desc, symbol asc.
///
/// The symbol key makes the order total, so equal scores always rank the same
/// way regardless of which scoring task finished first.
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.ensemble
        .total_cmp(&a.ensemble)
        .then_with(|| b.confluence.cmp(&a.confluence))
        .then_with(|| b.conviction().total_cmp(&a.conviction()))
        .then_with(|| a.symbol.cmp(&b.symbol))
}

pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(rank_order);
}
