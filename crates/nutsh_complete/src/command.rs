use std::collections::HashMap;

use is_executable::is_executable;
use itertools::Itertools;
use nutsh_core::{complete_against_pattern, escape_string, wildcard_has, Candidate};
use nutsh_parse::unescape;
use tracing::debug;

use crate::completer::{CommandScope, Completer};
use crate::expand::ExpandFlags;

/// Subshell command used to look up external-command descriptions.
const DESCRIBE_COMMAND: &str = "__describe_command";

impl Completer<'_> {
    /// Completes the command word of a statement: executables on `$PATH`,
    /// literal paths, functions, builtins, and implicit-cd directories.
    pub(crate) fn complete_cmd(&mut self, token: &str, scope: CommandScope) {
        if token.is_empty() {
            return;
        }
        let unescaped = unescape(token, true).unwrap_or_else(|| token.to_string());

        let mut file_flags = ExpandFlags::NO_DESCRIPTIONS;
        if self.fuzzy() {
            file_flags |= ExpandFlags::FUZZY;
        }

        let has_path = unescaped.contains('/') || unescaped.starts_with('~');
        if scope.use_command && has_path {
            if let Err(error) = expand_token(self, token, file_flags | ExpandFlags::EXECUTABLES_ONLY)
            {
                debug!(target: "complete", "error while expanding command '{token}': {error}");
            }
        }

        if scope.use_implicit_cd {
            if let Err(error) = expand_token(self, token, file_flags | ExpandFlags::DIRECTORIES_ONLY)
            {
                debug!(target: "complete", "error while expanding directory '{token}': {error}");
            }
        }

        if has_path {
            return;
        }

        if scope.use_command {
            self.complete_path_commands(&unescaped);
            if self.wants_descriptions() {
                self.complete_cmd_desc(&unescaped);
            }
        }

        if scope.use_function {
            let include_hidden = unescaped.starts_with('_');
            let names = self.service.functions.names(include_hidden);
            for name in names {
                let description = self.service.functions.description(&name).unwrap_or_default();
                self.push_name_candidate(&name, &unescaped, description);
            }
        }

        if scope.use_builtin {
            let names = self.service.builtins.names();
            for name in names {
                let description = self.service.builtins.description(&name).unwrap_or_default();
                self.push_name_candidate(&name, &unescaped, description);
            }
        }
    }

    /// Probes every `$PATH` directory for executables matching the token.
    ///
    /// Candidates never carry the directory prefix: a replacement is the
    /// bare command name.
    fn complete_path_commands(&mut self, token: &str) {
        let names: Vec<String> = self
            .vars
            .path_dirs()
            .iter()
            .filter_map(|dir| std::fs::read_dir(dir).ok())
            .flatten()
            .filter_map(Result::ok)
            .filter(|entry| {
                let path = entry.path();
                path.is_file() && is_executable(&path)
            })
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .unique()
            .collect();

        for name in names {
            self.push_name_candidate(&name, token, String::new());
        }
    }

    fn push_name_candidate(&mut self, name: &str, token: &str, description: String) {
        if let Some(completion) = complete_against_pattern(name, token, self.match_ceiling()) {
            self.candidates.push(Candidate::new(
                completion.text,
                description,
                completion.fuzz,
                completion.flags,
            ));
        }
    }

    /// Refines command candidates with descriptions from one descriptor
    /// subshell invocation.
    ///
    /// Skipped for short or wildcarded tokens, and when every candidate so
    /// far is a directory.
    fn complete_cmd_desc(&mut self, token: &str) {
        let Some(subshell) = self.subshell else {
            return;
        };

        let base = token.rsplit('/').next().unwrap_or(token);
        if base.chars().count() < 2 || wildcard_has(base) {
            return;
        }
        if self.candidates.iter().all(|c| c.text.ends_with('/')) {
            return;
        }

        let lookup = format!("{DESCRIBE_COMMAND} {}", escape_string(base));
        let output = match subshell.exec(&lookup) {
            Ok(output) => output,
            Err(error) => {
                debug!(target: "complete", "command description lookup failed: {error}");
                return;
            }
        };

        // Lines are `name<TAB>description`; keys are stored without the
        // typed prefix so they line up with suffix candidates.
        let mut descriptions = HashMap::new();
        for line in &output.lines {
            let Some(rest) = line.strip_prefix(base) else {
                continue;
            };
            let Some((key, value)) = rest.split_once('\t') else {
                continue;
            };
            let mut value = value.to_string();
            if let Some(first) = value.get(..1) {
                let upper = first.to_uppercase();
                value.replace_range(..1, &upper);
            }
            descriptions.insert(key.to_string(), value);
        }

        for candidate in &mut self.candidates {
            if let Some(description) = descriptions.get(&candidate.text) {
                candidate.description = description.clone();
            }
        }
    }
}

/// Forwards to the file expander with the completer's context.
fn expand_token(completer: &mut Completer, token: &str, flags: ExpandFlags) -> Result<(), String> {
    crate::expand::expand_token(token, flags, completer.vars, &mut completer.candidates)
}
