use crate::model::{Candidate, Winners};

/// Compute the winner set over the active candidates.
///
/// Two passes: find the highest vote count, then collect everyone on it.
/// Inactive candidates keep their votes but are never eligible. With no
/// active candidates the winner set is empty and the winning count is zero.
pub fn winners<'a>(candidates: impl Iterator<Item = &'a Candidate> + Clone) -> Winners {
    let active = candidates.filter(|candidate| candidate.is_active);
    let winning_votes = match active.clone().map(|candidate| candidate.vote_count).max() {
        Some(max) => max,
        None => return Winners::default(),
    };
    let mut candidate_ids: Vec<_> = active
        .filter(|candidate| candidate.vote_count == winning_votes)
        .map(|candidate| candidate.id)
        .collect();
    candidate_ids.sort_unstable();

    Winners {
        winner_count: candidate_ids.len(),
        candidate_ids,
        winning_votes,
    }
}
