use std::cmp::Ordering;

/// How well a completion matched the token it was generated for.
///
/// Tiers are ordered from best to worst; a lower tier always outranks a
/// higher one when candidates are prioritised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    /// The token equals the subject.
    Exact,

    /// The token is a case-sensitive prefix of the subject.
    Prefix,

    /// The token is a prefix of the subject, ignoring case.
    PrefixCi,

    /// The token occurs somewhere within the subject.
    Substring,

    /// The token occurs within the subject, ignoring case.
    SubstringCi,

    /// The token can be turned into the subject by inserting characters.
    SubsequenceInsert,

    /// The token does not match the subject.
    None,
}

impl MatchTier {
    /// Returns `true` if a match of this tier cannot be completed by
    /// appending a suffix, and the whole token must be replaced instead.
    pub fn requires_full_replacement(self) -> bool {
        !matches!(self, MatchTier::Exact | MatchTier::Prefix)
    }
}

/// The result of fuzzy-matching a token against a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyMatch {
    pub tier: MatchTier,

    /// Whether case folding was needed to produce the match.
    pub case_fold: bool,
}

impl FuzzyMatch {
    pub fn new(tier: MatchTier, case_fold: bool) -> Self {
        Self { tier, case_fold }
    }

    /// A non-match.
    pub fn none() -> Self {
        Self::new(MatchTier::None, false)
    }

    /// An exact match, used for candidates that are not produced by
    /// matching against a token.
    pub fn exact() -> Self {
        Self::new(MatchTier::Exact, false)
    }

    pub fn is_match(&self) -> bool {
        self.tier != MatchTier::None
    }

    pub fn requires_full_replacement(&self) -> bool {
        self.tier.requires_full_replacement()
    }
}

/// Matches `token` against `subject`, returning the best applicable tier
/// that is not worse than `ceiling`.
///
/// An empty token is a prefix of everything.
pub fn fuzzy_match(token: &str, subject: &str, ceiling: MatchTier) -> FuzzyMatch {
    let try_tier = |tier: MatchTier| tier <= ceiling;

    if try_tier(MatchTier::Exact) && token == subject {
        return FuzzyMatch::new(MatchTier::Exact, false);
    }

    if try_tier(MatchTier::Prefix) && subject.starts_with(token) {
        return FuzzyMatch::new(MatchTier::Prefix, false);
    }

    let token_folded = token.to_lowercase();
    let subject_folded = subject.to_lowercase();

    if try_tier(MatchTier::PrefixCi) && subject_folded.starts_with(&token_folded) {
        return FuzzyMatch::new(MatchTier::PrefixCi, true);
    }

    if try_tier(MatchTier::Substring) && subject.contains(token) {
        return FuzzyMatch::new(MatchTier::Substring, false);
    }

    if try_tier(MatchTier::SubstringCi) && subject_folded.contains(&token_folded) {
        return FuzzyMatch::new(MatchTier::SubstringCi, true);
    }

    if try_tier(MatchTier::SubsequenceInsert) && is_subsequence(token, subject) {
        return FuzzyMatch::new(MatchTier::SubsequenceInsert, false);
    }

    FuzzyMatch::none()
}

/// Returns `true` if all characters of `needle` occur in `haystack` in order.
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|n| chars.any(|h| h == n))
}

/// Compares two strings the way file listings are ordered: runs of digits
/// compare by numeric value, other characters compare case-insensitively,
/// and fully equal-ignoring-case strings fall back to a byte comparison so
/// that the order stays total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((apos, ac)), Some((bpos, bc))) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let an = take_digit_run(a, apos, &mut ai);
                    let bn = take_digit_run(b, bpos, &mut bi);
                    match compare_digit_runs(an, bn) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }

                let af = ac.to_lowercase();
                let bf = bc.to_lowercase();
                match af.cmp(bf) {
                    Ordering::Equal => {
                        ai.next();
                        bi.next();
                    }
                    other => return other,
                }
            }
        }
    }

    // Case-insensitively equal; keep the order total.
    a.cmp(b)
}

/// Consumes a maximal run of ASCII digits and returns it as a slice.
fn take_digit_run<'a>(
    source: &'a str,
    start: usize,
    iter: &mut std::iter::Peekable<std::str::CharIndices<'a>>,
) -> &'a str {
    let mut end = start;
    while let Some((pos, ch)) = iter.peek().copied() {
        if !ch.is_ascii_digit() {
            break;
        }
        end = pos + ch.len_utf8();
        iter.next();
    }
    &source[start..end]
}

/// Compares two digit runs by numeric value. Runs that denote the same
/// value differ by their leading zeroes; the shorter spelling sorts first.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a_digits = a.trim_start_matches('0');
    let b_digits = b.trim_start_matches('0');

    a_digits
        .len()
        .cmp(&b_digits.len())
        .then_with(|| a_digits.cmp(b_digits))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_orders_tiers_from_best_to_worst() {
        assert!(MatchTier::Exact < MatchTier::Prefix);
        assert!(MatchTier::Prefix < MatchTier::PrefixCi);
        assert!(MatchTier::PrefixCi < MatchTier::Substring);
        assert!(MatchTier::Substring < MatchTier::SubstringCi);
        assert!(MatchTier::SubstringCi < MatchTier::SubsequenceInsert);
        assert!(MatchTier::SubsequenceInsert < MatchTier::None);
    }

    #[test]
    fn it_reports_full_replacement_tiers() {
        assert!(!MatchTier::Exact.requires_full_replacement());
        assert!(!MatchTier::Prefix.requires_full_replacement());
        assert!(MatchTier::PrefixCi.requires_full_replacement());
        assert!(MatchTier::Substring.requires_full_replacement());
        assert!(MatchTier::SubstringCi.requires_full_replacement());
        assert!(MatchTier::SubsequenceInsert.requires_full_replacement());
        assert!(MatchTier::None.requires_full_replacement());
    }

    #[test]
    fn it_matches_tokens_against_subjects() {
        let tier = |token, subject| fuzzy_match(token, subject, MatchTier::None).tier;

        assert_eq!(tier("echo", "echo"), MatchTier::Exact);
        assert_eq!(tier("ec", "echo"), MatchTier::Prefix);
        assert_eq!(tier("EC", "echo"), MatchTier::PrefixCi);
        assert_eq!(tier("ch", "echo"), MatchTier::Substring);
        assert_eq!(tier("CH", "echo"), MatchTier::SubstringCi);
        assert_eq!(tier("eo", "echo"), MatchTier::SubsequenceInsert);
        assert_eq!(tier("xyz", "echo"), MatchTier::None);
    }

    #[test]
    fn it_matches_the_empty_token_as_a_prefix() {
        assert_eq!(
            fuzzy_match("", "anything", MatchTier::None).tier,
            MatchTier::Prefix
        );
    }

    #[test]
    fn it_honours_the_ceiling() {
        assert_eq!(
            fuzzy_match("ch", "echo", MatchTier::PrefixCi).tier,
            MatchTier::None
        );
        assert_eq!(
            fuzzy_match("EC", "echo", MatchTier::PrefixCi).tier,
            MatchTier::PrefixCi
        );
    }

    #[test]
    fn it_compares_digit_runs_numerically() {
        assert_eq!(natural_cmp("file9", "file10"), Ordering::Less);
        assert_eq!(natural_cmp("file10", "file9"), Ordering::Greater);
        assert_eq!(natural_cmp("file2", "file2"), Ordering::Equal);
        assert_eq!(natural_cmp("a02", "a2"), Ordering::Greater);
    }

    #[test]
    fn it_compares_case_insensitively_with_a_total_tiebreak() {
        assert_eq!(natural_cmp("abc", "ABD"), Ordering::Less);
        assert_ne!(natural_cmp("ABC", "abc"), Ordering::Equal);
    }
}
