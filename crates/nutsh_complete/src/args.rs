use nutsh_core::{complete_against_pattern, Candidate, CompleteFlags, ExpandMode};
use nutsh_parse::unescape;
use tracing::debug;

use crate::completer::Completer;

impl Completer<'_> {
    /// Expands an argument-list command and matches the produced words
    /// against the user's partial token.
    ///
    /// On autosuggest requests the expansion runs in completions-only mode,
    /// which rules out side effects.
    pub(crate) fn complete_from_args(
        &mut self,
        token: &str,
        args_command: &str,
        description: &str,
        flags: CompleteFlags,
    ) {
        let mode = if self.autosuggest() {
            ExpandMode::CompletionsOnly
        } else {
            ExpandMode::General
        };

        let words = match self
            .service
            .arg_lists
            .expand_argument_list(args_command, mode)
        {
            Ok(words) => words,
            Err(error) => {
                debug!(
                    target: "complete",
                    "error while expanding argument list '{args_command}': {error}"
                );
                return;
            }
        };

        let unescaped = unescape(token, true).unwrap_or_default();
        for word in words {
            if let Some(completion) =
                complete_against_pattern(&word, &unescaped, self.match_ceiling())
            {
                self.candidates.push(Candidate::new(
                    completion.text,
                    description,
                    completion.fuzz,
                    completion.flags | flags,
                ));
            }
        }
    }
}
