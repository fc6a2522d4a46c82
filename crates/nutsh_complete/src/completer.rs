use bitflags::bitflags;
use nutsh_core::{Candidate, MatchTier, Subshell, VarsSnapshot};
use nutsh_parse::{
    cmdsub_span, plain_statements, token_extents, tokenize, unescape, Decoration, PlainStatement,
    Span, TokenKind,
};
use tracing::debug;

use crate::condition::ConditionCache;
use crate::expand::{expand_token, ExpandFlags};
use crate::rank::sort_and_prioritize;
use crate::service::CompletionService;

bitflags! {
    /// Flags describing one completion request.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct RequestFlags: u8 {
        /// A background autosuggestion request. Must not block or run user
        /// code.
        const AUTOSUGGESTION = 1 << 0;

        /// Attach descriptions to candidates.
        const DESCRIPTIONS = 1 << 1;

        /// Allow fuzzy matching beyond case-insensitive prefixes.
        const FUZZY_MATCH = 1 << 2;

        /// Complete the whole line without localising to the innermost
        /// command substitution. Autosuggest callers set this to bound the
        /// work done on large lines.
        const SKIP_CMDSUBST = 1 << 3;
    }
}

/// Which kinds of command-position candidates a statement's decoration
/// allows.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommandScope {
    pub(crate) use_command: bool,
    pub(crate) use_function: bool,
    pub(crate) use_builtin: bool,
    pub(crate) use_implicit_cd: bool,
}

impl CommandScope {
    fn for_decoration(decoration: Decoration) -> Self {
        match decoration {
            Decoration::None => Self {
                use_command: true,
                use_function: true,
                use_builtin: true,
                use_implicit_cd: true,
            },
            Decoration::Command | Decoration::Exec => Self {
                use_command: true,
                use_function: false,
                use_builtin: false,
                use_implicit_cd: false,
            },
            Decoration::Builtin => Self {
                use_command: false,
                use_function: false,
                use_builtin: true,
                use_implicit_cd: false,
            },
        }
    }
}

/// One in-flight completion request: the shared candidate buffer, the
/// request mode, and the per-request condition cache.
pub(crate) struct Completer<'a> {
    pub(crate) service: &'a CompletionService,
    pub(crate) flags: RequestFlags,
    pub(crate) vars: &'a VarsSnapshot,
    pub(crate) subshell: Option<&'a dyn Subshell>,
    pub(crate) conditions: ConditionCache,
    pub(crate) candidates: Vec<Candidate>,
}

impl<'a> Completer<'a> {
    /// Builds a request. Autosuggest requests are stripped of the subshell
    /// capability so they cannot evaluate user code.
    pub(crate) fn new(
        service: &'a CompletionService,
        flags: RequestFlags,
        vars: &'a VarsSnapshot,
        subshell: Option<&'a dyn Subshell>,
    ) -> Self {
        let subshell = if flags.contains(RequestFlags::AUTOSUGGESTION) {
            None
        } else {
            subshell
        };
        Self {
            service,
            flags,
            vars,
            subshell,
            conditions: ConditionCache::default(),
            candidates: Vec::new(),
        }
    }

    pub(crate) fn autosuggest(&self) -> bool {
        self.flags.contains(RequestFlags::AUTOSUGGESTION)
    }

    pub(crate) fn wants_descriptions(&self) -> bool {
        self.flags.contains(RequestFlags::DESCRIPTIONS)
    }

    pub(crate) fn fuzzy(&self) -> bool {
        self.flags.contains(RequestFlags::FUZZY_MATCH)
    }

    /// The worst match tier this request accepts.
    pub(crate) fn match_ceiling(&self) -> MatchTier {
        if self.fuzzy() {
            MatchTier::SubsequenceInsert
        } else {
            MatchTier::PrefixCi
        }
    }

    /// Runs the request and returns the candidate buffer.
    pub(crate) fn complete(mut self, line: &str, cursor: usize) -> Vec<Candidate> {
        // Only the text before the cursor matters.
        let mut cursor = cursor.min(line.len());
        while !line.is_char_boundary(cursor) {
            cursor -= 1;
        }
        let line = &line[..cursor];

        // Phase 1: restrict to the innermost command substitution and find
        // the token under the cursor.
        let span = if self.flags.contains(RequestFlags::SKIP_CMDSUBST) {
            Span::new(0, line.len())
        } else {
            cmdsub_span(line, line.len())
        };
        let src = span.source(line);
        let pos = src.len();
        let current_token = token_extents(src).source(src).to_string();

        // Phase 2: variable and tilde-user expansion short-circuit
        // everything else. Their candidates keep generator order.
        if self.complete_variable(&current_token) || self.complete_users(&current_token) {
            return self.candidates;
        }

        // Phase 3: back the cursor over trailing spaces and locate the
        // plain statement containing it.
        let mut adjusted_pos = pos;
        while adjusted_pos > 0 && src.as_bytes()[adjusted_pos - 1] == b' ' {
            adjusted_pos -= 1;
        }
        let cursor_in_whitespace = adjusted_pos < pos;

        let statements = plain_statements(src);
        let statement = statements
            .iter()
            .find(|statement| statement.span.contains_or_ends_at(adjusted_pos));

        match statement {
            None => {
                // Not in a command: loop header, bare separator, comment.
                // Do generic expansion only, and keep autosuggestions quiet
                // right after a pipe, separator, background marker, or
                // comment.
                let do_file =
                    !(self.autosuggest() && in_separator_context(src, adjusted_pos));
                self.complete_param_expand(&current_token, do_file, false);
            }
            Some(statement) => {
                self.complete_statement(
                    statement,
                    src,
                    &current_token,
                    pos,
                    adjusted_pos,
                    cursor_in_whitespace,
                );
            }
        }

        sort_and_prioritize(&mut self.candidates);
        self.candidates
    }

    /// Phase 4: completion within a plain statement.
    #[allow(clippy::too_many_arguments)]
    fn complete_statement(
        &mut self,
        statement: &PlainStatement,
        src: &str,
        current_token: &str,
        pos: usize,
        adjusted_pos: usize,
        cursor_in_whitespace: bool,
    ) {
        let scope = CommandScope::for_decoration(statement.decoration);

        // At or inside the command word: complete the command itself.
        let in_command_position = match statement.command {
            None => true,
            Some(command) => command.contains_or_ends_at(pos),
        };
        if in_command_position {
            self.complete_cmd(current_token, scope);
            return;
        }

        let Some(command_span) = statement.command else {
            return;
        };
        let matching_arg = statement.arg_at(adjusted_pos);
        let current_argument = match matching_arg {
            Some(index) if !cursor_in_whitespace => {
                statement.args[index].source(src).to_string()
            }
            _ => String::new(),
        };

        let mut do_file = false;
        let mut special_cd = false;

        if matching_arg.is_none() && statement.in_redirection(adjusted_pos) {
            do_file = true;
        } else if let Some(command_unescaped) = unescape(command_span.source(src), false) {
            // An argument before the cursor that is exactly `--` ends
            // option recognition.
            let arg_limit = matching_arg.unwrap_or(statement.args.len());
            let had_ddash = statement.args[..arg_limit]
                .iter()
                .any(|arg| arg.source(src) == "--");

            do_file = true;
            let cursor_in_last_arg = adjusted_pos == pos;
            let service = self.service;
            let chain = service.wraps.chain(&command_unescaped);
            for (link, chained) in chain.iter().enumerate() {
                if self.autosuggest() {
                    service.schedule_load(chained);
                } else {
                    service.load_completions(chained);
                }

                // Conditions that inspect the command line must see the
                // wrapped command in command position.
                let _transient = (link > 0 && !self.autosuggest()).then(|| {
                    let mut faux = src.to_string();
                    faux.replace_range(command_span.start..command_span.end, chained);
                    service.push_transient_line(faux)
                });

                let suppressed = self.complete_from_grammars(
                    chained,
                    statement,
                    src,
                    cursor_in_last_arg,
                    had_ddash,
                );
                if suppressed {
                    do_file = false;
                }
            }

            // Nothing command-specific: fall back to files.
            if self.candidates.is_empty() {
                do_file = true;
            }

            special_cd = command_unescaped == "cd";

            if self.autosuggest() && current_argument.is_empty() {
                do_file = false;
            }
        }

        self.complete_param_expand(current_token, do_file, special_cd);
    }

    /// Queries the grammar set of one wrap-chain command.
    ///
    /// Returns `true` if the grammars asked to suppress file completion.
    fn complete_from_grammars(
        &mut self,
        command: &str,
        statement: &PlainStatement,
        src: &str,
        cursor_in_last_arg: bool,
        had_ddash: bool,
    ) -> bool {
        use nutsh_core::CompleteFlags;
        use nutsh_usage::ArgumentTag;

        let set = self.service.registry.get(command);
        if set.is_empty() {
            return false;
        }

        let mut argv = vec![command.to_string()];
        let arg_count = statement.args.len();
        for (index, arg) in statement.args.iter().enumerate() {
            let allow_incomplete = cursor_in_last_arg && index + 1 == arg_count;
            // Arguments that fail to unescape are dropped.
            if let Some(unescaped) = unescape(arg.source(src), allow_incomplete) {
                argv.push(unescaped);
            }
        }

        let mut last_arg = String::new();
        if cursor_in_last_arg && argv.len() > 1 {
            last_arg = argv.pop().unwrap_or_default();
        }

        let allow_options = last_arg.starts_with('-') && !had_ddash;
        let mut suppress_files = false;

        for suggestion in set.suggest_next_argument(&argv) {
            let token = suggestion.token;

            if token.starts_with('-') && !allow_options {
                continue;
            }

            if token.starts_with('<') {
                // A variable: values come from its generating command.
                if suggestion.command.is_empty() {
                    continue;
                }
                if !self.conditions.test(&suggestion.condition, self.subshell) {
                    continue;
                }
                self.complete_from_args(
                    &last_arg,
                    &suggestion.command,
                    &suggestion.description,
                    CompleteFlags::AUTO_SPACE,
                );
                if !suggestion.tag.contains(ArgumentTag::ALLOW_FILES) {
                    suppress_files = true;
                }
                continue;
            }

            if last_arg.is_empty() {
                if !self.conditions.test(&suggestion.condition, self.subshell) {
                    continue;
                }
                self.candidates.push(Candidate::new(
                    token,
                    suggestion.description,
                    nutsh_core::FuzzyMatch::exact(),
                    CompleteFlags::AUTO_SPACE,
                ));
            } else {
                let fuzz = nutsh_core::fuzzy_match(&last_arg, &token, self.match_ceiling());
                if !fuzz.is_match() {
                    continue;
                }
                if !self.conditions.test(&suggestion.condition, self.subshell) {
                    continue;
                }

                // Option spellings always replace the token: splicing a
                // suffix into a partial option corrupts it.
                if token.starts_with('-') || fuzz.requires_full_replacement() {
                    self.candidates.push(Candidate::new(
                        token,
                        suggestion.description,
                        fuzz,
                        CompleteFlags::AUTO_SPACE | CompleteFlags::REPLACES_TOKEN,
                    ));
                } else {
                    self.candidates.push(Candidate::new(
                        &token[last_arg.len()..],
                        suggestion.description,
                        fuzz,
                        CompleteFlags::AUTO_SPACE,
                    ));
                }
            }
            if !suggestion.tag.contains(ArgumentTag::ALLOW_FILES) {
                suppress_files = true;
            }
        }
        suppress_files
    }

    /// Phase 5: generic file and parameter expansion of the token.
    pub(crate) fn complete_param_expand(&mut self, token: &str, do_file: bool, special_cd: bool) {
        if !do_file {
            return;
        }

        let mut flags = ExpandFlags::empty();
        if self.fuzzy() {
            flags |= ExpandFlags::FUZZY;
        }
        if self.autosuggest() || !self.wants_descriptions() {
            flags |= ExpandFlags::NO_DESCRIPTIONS;
        }
        if special_cd {
            flags |= ExpandFlags::SPECIAL_CD
                | ExpandFlags::DIRECTORIES_ONLY
                | ExpandFlags::NO_DESCRIPTIONS;
        }

        // `--foo=bar` and `key:value` tokens expand the part after the
        // last separator; plain tokens also expand whole.
        let sep_index = token.rfind(['=', ':']);
        let complete_from_start = sep_index.is_none() || !token.starts_with('-');

        if let Some(sep_index) = sep_index {
            let suffix = &token[sep_index + 1..];
            let mut local = Vec::new();
            if let Err(error) = expand_token(suffix, flags, self.vars, &mut local) {
                debug!(target: "complete", "error while expanding '{suffix}': {error}");
            }

            // Replacements stomp the whole token; repair them by
            // restoring the prefix up to and including the separator.
            let prefix = &token[..=sep_index];
            for candidate in &mut local {
                candidate.prepend_token_prefix(prefix);
            }
            self.candidates.extend(local);
        }

        if complete_from_start {
            // No fuzzy matching for dash tokens; everything would match.
            let mut flags = flags;
            if token.starts_with('-') {
                flags -= ExpandFlags::FUZZY;
            }
            if let Err(error) = expand_token(token, flags, self.vars, &mut self.candidates) {
                debug!(target: "complete", "error while expanding '{token}': {error}");
            }
        }
    }
}

/// Returns `true` when the position touches a pipe, separator, background
/// marker, or comment token.
fn in_separator_context(src: &str, pos: usize) -> bool {
    tokenize(src).iter().any(|token| {
        matches!(
            token.kind,
            TokenKind::Pipe | TokenKind::Separator | TokenKind::Background | TokenKind::Comment
        ) && token.span.contains_or_ends_at(pos)
    })
}
