use nutsh_core::{natural_cmp, Candidate, MatchTier};

/// Filters, orders, and deduplicates the candidate buffer at the end of a
/// request.
///
/// Only candidates at the best match tier survive, except that an exact
/// best is relaxed to prefix so a token that exactly names a file still
/// shows its siblings. Survivors are sorted in natural order, deduplicated
/// by text, and finally grouped by tier, best first.
pub fn sort_and_prioritize(candidates: &mut Vec<Candidate>) {
    let Some(best) = candidates.iter().map(|c| c.fuzz.tier).min() else {
        return;
    };

    let threshold = if best == MatchTier::Exact {
        MatchTier::Prefix
    } else {
        best
    };
    candidates.retain(|candidate| candidate.fuzz.tier <= threshold);

    candidates.sort_by(|a, b| natural_cmp(&a.text, &b.text));
    candidates.dedup_by(|a, b| a.text == b.text);
    candidates.sort_by_key(|candidate| candidate.fuzz.tier);
}
