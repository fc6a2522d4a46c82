use crate::candidate::CompleteFlags;
use crate::fuzzy::{fuzzy_match, FuzzyMatch, MatchTier};

/// The outcome of completing a subject string against a partial token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternCompletion {
    /// The completion text: a suffix for prefix-style matches, the whole
    /// subject otherwise.
    pub text: String,

    pub flags: CompleteFlags,

    pub fuzz: FuzzyMatch,
}

/// Returns `true` if the pattern contains an unescaped wildcard.
pub fn wildcard_has(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}

/// Matches `text` against a glob pattern where `*` matches any run of
/// characters and `?` matches exactly one.
pub fn wildcard_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let mut t = 0;
    let mut p = 0;
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Backtrack: let the star swallow one more character.
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Completes `subject` against the user's partial token.
///
/// A token containing wildcards matches whole subjects only and always
/// replaces the token. A literal token is fuzzy-matched up to `ceiling`:
/// prefix-tier matches extend the token with the missing suffix, worse
/// tiers replace it.
pub fn complete_against_pattern(
    subject: &str,
    token: &str,
    ceiling: MatchTier,
) -> Option<PatternCompletion> {
    if wildcard_has(token) {
        if !wildcard_matches(subject, token) {
            return None;
        }
        return Some(PatternCompletion {
            text: subject.to_string(),
            flags: CompleteFlags::REPLACES_TOKEN,
            fuzz: FuzzyMatch::exact(),
        });
    }

    let fuzz = fuzzy_match(token, subject, ceiling);
    if !fuzz.is_match() {
        return None;
    }

    if fuzz.requires_full_replacement() {
        return Some(PatternCompletion {
            text: subject.to_string(),
            flags: CompleteFlags::REPLACES_TOKEN,
            fuzz,
        });
    }

    Some(PatternCompletion {
        text: subject[token.len()..].to_string(),
        flags: CompleteFlags::empty(),
        fuzz,
    })
}
