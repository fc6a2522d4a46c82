use bitflags::bitflags;

use crate::fuzzy::FuzzyMatch;

bitflags! {
    /// Flags describing how a candidate is to be inserted into the line.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CompleteFlags: u8 {
        /// The candidate replaces the whole token instead of extending it.
        const REPLACES_TOKEN = 1 << 0;

        /// Do not append a space after inserting the candidate.
        const NO_SPACE = 1 << 1;

        /// Resolve to `NO_SPACE` when the text ends in `/`, `=`, `@` or `:`.
        /// Never survives candidate construction.
        const AUTO_SPACE = 1 << 2;

        /// Insert the text without escaping special characters.
        const DONT_ESCAPE = 1 << 3;

        /// Escape the text, but leave tildes alone.
        const DONT_ESCAPE_TILDES = 1 << 4;
    }
}

/// One completion proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The string to insert, or to replace the token with.
    pub text: String,

    /// Optional human-readable gloss.
    pub description: String,

    /// How well the candidate matched the token it was generated for.
    pub fuzz: FuzzyMatch,

    pub flags: CompleteFlags,
}

impl Candidate {
    /// Constructs a candidate, resolving `AUTO_SPACE` against the text.
    pub fn new(
        text: impl Into<String>,
        description: impl Into<String>,
        fuzz: FuzzyMatch,
        flags: CompleteFlags,
    ) -> Self {
        let text = text.into();
        let flags = resolve_auto_space(&text, flags);
        Self {
            text,
            description: description.into(),
            fuzz,
            flags,
        }
    }

    /// Constructs a candidate that extends the token with `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, "", FuzzyMatch::exact(), CompleteFlags::empty())
    }

    /// Restores a token prefix that an expansion stripped.
    ///
    /// Candidates that replace the token must reproduce the prefix the
    /// expansion never saw; candidates that merely append are unaffected.
    pub fn prepend_token_prefix(&mut self, prefix: &str) {
        if self.flags.contains(CompleteFlags::REPLACES_TOKEN) {
            self.text.insert_str(0, prefix);
        }
    }
}

/// Clears `AUTO_SPACE`, converting it to `NO_SPACE` when the completion text
/// ends in a character that is usually followed by more input.
fn resolve_auto_space(text: &str, flags: CompleteFlags) -> CompleteFlags {
    if !flags.contains(CompleteFlags::AUTO_SPACE) {
        return flags;
    }

    let mut resolved = flags - CompleteFlags::AUTO_SPACE;
    if text.ends_with(['/', '=', '@', ':']) {
        resolved |= CompleteFlags::NO_SPACE;
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_resolves_auto_space_on_construction() {
        let auto = |text| Candidate::new(text, "", FuzzyMatch::exact(), CompleteFlags::AUTO_SPACE);

        assert_eq!(auto("dir/").flags, CompleteFlags::NO_SPACE);
        assert_eq!(auto("--opt=").flags, CompleteFlags::NO_SPACE);
        assert_eq!(auto("user@").flags, CompleteFlags::NO_SPACE);
        assert_eq!(auto("key:").flags, CompleteFlags::NO_SPACE);
        assert_eq!(auto("word").flags, CompleteFlags::empty());
    }

    #[test]
    fn it_keeps_other_flags_while_resolving() {
        let candidate = Candidate::new(
            "dir/",
            "",
            FuzzyMatch::exact(),
            CompleteFlags::AUTO_SPACE | CompleteFlags::DONT_ESCAPE,
        );
        assert_eq!(
            candidate.flags,
            CompleteFlags::NO_SPACE | CompleteFlags::DONT_ESCAPE
        );
    }

    #[test]
    fn it_prepends_prefixes_only_to_replacements() {
        let mut replaces = Candidate::new(
            "file1",
            "",
            FuzzyMatch::exact(),
            CompleteFlags::REPLACES_TOKEN,
        );
        replaces.prepend_token_prefix("--opt=");
        assert_eq!(replaces.text, "--opt=file1");

        let mut appends = Candidate::from_text("le1");
        appends.prepend_token_prefix("--opt=");
        assert_eq!(appends.text, "le1");
    }
}
