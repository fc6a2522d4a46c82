use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use nutsh_core::ArgumentLists;
use nutsh_usage::{
    AnnotatedOption, ArgumentStatus, ArgumentTag, OptionForm, Suggestion, UsageError, UsageParser,
};
use parking_lot::Mutex;

/// One immutable docopt-style usage registration.
#[derive(Debug)]
pub struct Registration {
    pub usage: String,
    pub description: String,
    pub condition: String,
    pub parser: UsageParser,
}

/// A legacy option with its registration stamp.
#[derive(Debug, Clone)]
struct OrderedOption {
    order: u64,
    option: AnnotatedOption,
}

/// A legacy per-command option list.
#[derive(Debug, Default)]
struct LegacyEntry {
    options: Vec<OrderedOption>,
    authoritative: bool,

    /// Parser synthesised from the options, rebuilt after mutations.
    parser: Option<Arc<UsageParser>>,
}

#[derive(Default)]
struct RegistryState {
    /// Usage registrations keyed by command name, in insertion order.
    registrations: HashMap<String, Vec<Arc<Registration>>>,

    /// Legacy entries keyed by command name or path.
    entries: HashMap<(String, bool), LegacyEntry>,

    /// Registration counter for stable dump ordering.
    next_order: u64,

    /// Counter for unique value-variable placeholders.
    next_value_var: u64,
}

/// The process-wide store of per-command completion grammars.
///
/// All access goes through one internal lock, held only for the in-memory
/// operation; readers receive immutable snapshots they can use unlocked.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

/// A snapshot of one registered legacy option, for dumping.
#[derive(Debug, Clone)]
pub struct OptionSnapshot {
    pub command: String,
    pub is_path: bool,
    pub order: u64,
    pub option: AnnotatedOption,
}

impl Registry {
    /// Registers a docopt-style usage description for a command.
    ///
    /// With an empty `cmd`, the command is inferred from the usage text when
    /// it names exactly one. A registration with identical usage text
    /// replaces the older one; distinct texts accumulate. Value-generating
    /// commands named by the usage are checked for argument-list syntax
    /// errors before anything is installed.
    pub fn register_usage(
        &self,
        cmd: &str,
        condition: &str,
        usage: &str,
        description: &str,
        arg_lists: &dyn ArgumentLists,
    ) -> Result<(), Vec<UsageError>> {
        let parser = UsageParser::from_usage(usage)?;

        let mut errors = Vec::new();
        for var in parser.variables() {
            if let Some(command) = parser.command_for_variable(&var) {
                if let Err(error) = arg_lists.detect_argument_list_errors(command) {
                    errors.push(UsageError::new(
                        0,
                        format!("condition '{command}' contained a syntax error: {error}"),
                    ));
                }
            }
        }

        let effective_cmd = if cmd.is_empty() {
            let names = parser.command_names();
            match names.as_slice() {
                [] => {
                    errors.push(UsageError::new(
                        0,
                        "no command name found in usage description",
                    ));
                    String::new()
                }
                [only] => only.clone(),
                [first, second, ..] => {
                    errors.push(UsageError::new(
                        0,
                        format!(
                            "multiple command names found in usage description, \
                             such as '{first}' and '{second}'"
                        ),
                    ));
                    String::new()
                }
            }
        } else {
            cmd.to_string()
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let registration = Arc::new(Registration {
            usage: usage.to_string(),
            description: description.to_string(),
            condition: condition.to_string(),
            parser,
        });

        let mut state = self.state.lock();
        let registrations = state.registrations.entry(effective_cmd).or_default();
        registrations.retain(|known| known.usage != usage);
        registrations.push(registration);
        Ok(())
    }

    /// Adds a legacy option to a command or path entry.
    ///
    /// `name` is the bare option name without dashes; it is empty exactly
    /// when the form is [`OptionForm::ArgsOnly`]. An `args_command` allots
    /// the option a unique value-variable placeholder.
    #[allow(clippy::too_many_arguments)]
    pub fn add_option(
        &self,
        cmd: &str,
        is_path: bool,
        form: OptionForm,
        name: &str,
        condition: &str,
        args_command: Option<&str>,
        description: &str,
        tag: ArgumentTag,
    ) {
        let mut state = self.state.lock();

        let mut option = AnnotatedOption::new(form, name);
        if let Some(command) = args_command {
            state.next_value_var += 1;
            option.value_var = Some(state.next_value_var.to_string());
            option.metadata.command = command.to_string();
        }
        option.metadata.condition = condition.to_string();
        option.metadata.description = description.to_string();
        option.metadata.tag = tag;

        state.next_order += 1;
        let order = state.next_order;
        let entry = Self::entry_mut(&mut state, cmd, is_path);
        entry.parser = None;
        entry.options.push(OrderedOption { order, option });
    }

    /// Removes every legacy option with the given spelling and form.
    ///
    /// Removing the last option deletes the entry.
    pub fn remove_option(&self, cmd: &str, is_path: bool, name: &str, form: OptionForm) {
        let spelling = format!("{}{}", "-".repeat(form.dash_count()), name);
        let mut state = self.state.lock();
        let key = (cmd.to_string(), is_path);

        let Some(entry) = state.entries.get_mut(&key) else {
            return;
        };
        entry.parser = None;
        entry
            .options
            .retain(|known| !(known.option.spelling == spelling && known.option.form == form));
        if entry.options.is_empty() {
            state.entries.remove(&key);
        }
    }

    /// Removes a command's legacy entry entirely.
    pub fn remove_all(&self, cmd: &str, is_path: bool) {
        let mut state = self.state.lock();
        state.entries.remove(&(cmd.to_string(), is_path));
    }

    /// Marks an entry as authoritative: no options beyond the registered
    /// ones exist. Creates the entry when absent.
    pub fn set_authoritative(&self, cmd: &str, is_path: bool, authoritative: bool) {
        let mut state = self.state.lock();
        Self::entry_mut(&mut state, cmd, is_path).authoritative = authoritative;
    }

    /// Returns whether an entry is authoritative.
    pub fn is_authoritative(&self, cmd: &str, is_path: bool) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(&(cmd.to_string(), is_path))
            .map(|entry| entry.authoritative)
            .unwrap_or(false)
    }

    /// Returns an immutable grammar snapshot for a command string.
    ///
    /// Usage registrations are looked up under the string as given. The
    /// legacy entry is looked up under the last path component first, then
    /// under the whole string as a path. A missing legacy parser is built
    /// and cached here.
    pub fn get(&self, cmd: &str) -> GrammarSet {
        let mut state = self.state.lock();

        let registrations = state.registrations.get(cmd).cloned().unwrap_or_default();

        let name = cmd.rsplit('/').next().unwrap_or(cmd).to_string();
        let keys = [(name, false), (cmd.to_string(), true)];
        let mut legacy = None;
        for key in keys {
            if let Some(entry) = state.entries.get_mut(&key) {
                if entry.parser.is_none() && !entry.options.is_empty() {
                    let options: Vec<AnnotatedOption> = entry
                        .options
                        .iter()
                        .map(|known| known.option.clone())
                        .collect();
                    entry.parser = Some(Arc::new(UsageParser::from_options(&options)));
                }
                if let Some(parser) = &entry.parser {
                    legacy = Some(Arc::clone(parser));
                    break;
                }
            }
        }

        GrammarSet {
            registrations,
            legacy,
        }
    }

    /// Returns all registered legacy options ordered by registration time.
    pub fn options_snapshot(&self) -> Vec<OptionSnapshot> {
        let state = self.state.lock();
        let mut options: Vec<OptionSnapshot> = state
            .entries
            .iter()
            .flat_map(|((command, is_path), entry)| {
                entry.options.iter().map(|known| OptionSnapshot {
                    command: command.clone(),
                    is_path: *is_path,
                    order: known.order,
                    option: known.option.clone(),
                })
            })
            .collect();
        options.sort_by_key(|snapshot| snapshot.order);
        options
    }

    fn entry_mut<'a>(
        state: &'a mut RegistryState,
        cmd: &str,
        is_path: bool,
    ) -> &'a mut LegacyEntry {
        let key = (cmd.to_string(), is_path);
        state.entries.entry(key).or_default()
    }
}

/// Merged argument-parse results across a grammar set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    /// Variable captures and textual occurrence counts, keyed by entity.
    pub values: BTreeMap<String, Vec<String>>,

    pub errors: Vec<UsageError>,

    /// Indices every parser in the set left unused.
    pub unused: Vec<usize>,
}

/// An immutable per-command grammar bundle: the command's usage
/// registrations plus at most one parser synthesised from legacy options.
#[derive(Default)]
pub struct GrammarSet {
    registrations: Vec<Arc<Registration>>,
    legacy: Option<Arc<UsageParser>>,
}

impl GrammarSet {
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.legacy.is_none()
    }

    /// Number of usage registrations in the set, the legacy parser
    /// excluded.
    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Validates each argument against every parser, keeping the best
    /// status any parser reports per position.
    ///
    /// Returns an empty vector when the set holds no grammars.
    pub fn validate(&self, argv: &[String]) -> Vec<ArgumentStatus> {
        let mut merged: Vec<ArgumentStatus> = Vec::new();

        for parser in self.parsers_in_set_order() {
            let statuses = parser.validate_arguments(argv);
            if merged.len() < statuses.len() {
                merged.resize(statuses.len(), ArgumentStatus::Invalid);
            }
            for (slot, status) in merged.iter_mut().zip(statuses) {
                *slot = (*slot).max(status);
            }
        }
        merged
    }

    /// Concatenates next-argument suggestions from every parser in set
    /// order.
    ///
    /// Duplicate tokens across parsers are kept: they may carry distinct
    /// conditions, which the driver filters individually before the final
    /// ranking pass coalesces equal candidates.
    ///
    /// Registration-level conditions and descriptions fill in suggestions
    /// that lack their own, and variables with no description get one
    /// derived from their name.
    pub fn suggest_next_argument(&self, argv: &[String]) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();

        for registration in &self.registrations {
            for mut suggestion in registration.parser.suggest_next_argument(argv) {
                if suggestion.condition.is_empty() {
                    suggestion.condition = registration.condition.clone();
                }
                if suggestion.description.is_empty() {
                    suggestion.description = registration.description.clone();
                }
                suggestions.push(suggestion);
            }
        }
        if let Some(legacy) = &self.legacy {
            suggestions.extend(legacy.suggest_next_argument(argv));
        }

        for suggestion in &mut suggestions {
            if suggestion.description.is_empty() && suggestion.token.starts_with('<') {
                suggestion.description = description_from_variable_name(&suggestion.token);
            }
        }
        suggestions
    }

    /// Parses an argument vector with every parser and merges the results.
    ///
    /// Values merge first-writer-wins with the freshest registration first
    /// and the legacy parser last. Variables keep their captured values;
    /// options and literals store their occurrence count as text. An index
    /// is unused only if every parser left it unused.
    ///
    /// Returns `None` when the set holds no grammars.
    pub fn parse_arguments(&self, argv: &[String]) -> Option<ParsedArgs> {
        if self.is_empty() {
            return None;
        }

        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut unused: BTreeSet<usize> = (0..argv.len()).collect();

        for parser in self.parsers_in_parse_order() {
            let parsed = parser.parse_arguments(argv);
            for (key, value) in parsed.values {
                if values.contains_key(&key) {
                    continue;
                }
                if key.starts_with('<') {
                    values.insert(key, value.values);
                } else {
                    values.insert(key, vec![value.count.to_string()]);
                }
            }
            errors.extend(parsed.errors);

            let parser_unused: BTreeSet<usize> = parsed.unused.into_iter().collect();
            unused = unused.intersection(&parser_unused).copied().collect();
        }

        Some(ParsedArgs {
            values,
            errors,
            unused: unused.into_iter().collect(),
        })
    }

    /// Returns the value-generating command and a description for a
    /// variable, from the freshest registration that knows it.
    pub fn commands_for_variable(&self, var: &str) -> Option<(String, String)> {
        for registration in self.registrations.iter().rev() {
            if let Some(command) = registration.parser.command_for_variable(var) {
                let description = if registration.description.is_empty() {
                    description_from_variable_name(var)
                } else {
                    registration.description.clone()
                };
                return Some((command.to_string(), description));
            }
        }
        None
    }

    /// Returns the description for an option spelling, from the freshest
    /// registration that has a non-empty one.
    pub fn description_for_option(&self, option: &str) -> Option<String> {
        self.parsers_in_parse_order()
            .filter_map(|parser| parser.description_for_option(option))
            .map(str::to_string)
            .next()
    }

    /// Parsers in insertion order, legacy last. Used for validation.
    fn parsers_in_set_order(&self) -> impl Iterator<Item = &UsageParser> {
        self.registrations
            .iter()
            .map(|registration| &registration.parser)
            .chain(self.legacy.iter().map(Arc::as_ref))
    }

    /// Parsers freshest-first, legacy last. Used for parse precedence.
    fn parsers_in_parse_order(&self) -> impl Iterator<Item = &UsageParser> {
        self.registrations
            .iter()
            .rev()
            .map(|registration| &registration.parser)
            .chain(self.legacy.iter().map(Arc::as_ref))
    }
}

/// Derives a human-readable description from a variable name: brackets
/// dropped, underscores spaced, first letter uppercased.
pub(crate) fn description_from_variable_name(var: &str) -> String {
    let name = var
        .trim_start_matches('<')
        .trim_end_matches('>')
        .replace('_', " ");
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use nutsh_core::NullArgumentLists;

    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    fn register(registry: &Registry, cmd: &str, usage: &str) {
        registry
            .register_usage(cmd, "", usage, "", &NullArgumentLists)
            .expect("usage registers");
    }

    #[test]
    fn it_registers_and_suggests() {
        let registry = Registry::default();
        register(&registry, "foo", "Usage:\n  foo --bar");

        let set = registry.get("foo");
        let suggestions = set.suggest_next_argument(&argv(&["foo"]));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].token, "--bar");
    }

    #[test]
    fn it_infers_the_command_from_the_usage() {
        let registry = Registry::default();
        registry
            .register_usage("", "", "Usage:\n  inferred --flag", "", &NullArgumentLists)
            .expect("command is inferred");
        assert!(!registry.get("inferred").is_empty());
    }

    #[test]
    fn it_rejects_ambiguous_command_inference() {
        let registry = Registry::default();
        let errors = registry
            .register_usage("", "", "Usage:\n  one\n  two", "", &NullArgumentLists)
            .unwrap_err();
        assert!(errors[0].message.contains("multiple command names"));
    }

    #[test]
    fn it_replaces_registrations_with_identical_usage() {
        let registry = Registry::default();
        register(&registry, "foo", "Usage:\n  foo --bar");
        register(&registry, "foo", "Usage:\n  foo --bar");

        let set = registry.get("foo");
        assert_eq!(set.registrations.len(), 1);
    }

    #[test]
    fn it_accumulates_distinct_usages() {
        let registry = Registry::default();
        register(&registry, "foo", "Usage:\n  foo --bar");
        register(&registry, "foo", "Usage:\n  foo --baz");

        let set = registry.get("foo");
        let suggestions = set.suggest_next_argument(&argv(&["foo"]));
        let tokens: Vec<&str> = suggestions.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["--bar", "--baz"]);
    }

    #[test]
    fn it_rejects_invalid_variable_conditions() {
        struct RejectingLists;
        impl ArgumentLists for RejectingLists {
            fn expand_argument_list(
                &self,
                _args: &str,
                _mode: nutsh_core::ExpandMode,
            ) -> Result<Vec<String>, String> {
                Ok(Vec::new())
            }

            fn detect_argument_list_errors(&self, _args: &str) -> Result<(), String> {
                Err("unbalanced quote".to_string())
            }
        }

        let registry = Registry::default();
        let errors = registry
            .register_usage(
                "kill",
                "",
                "Usage:\n  kill <pid>\nConditions:\n  <pid>  list-pids '",
                "",
                &RejectingLists,
            )
            .unwrap_err();
        assert!(errors[0].message.contains("syntax error"));
        assert!(registry.get("kill").is_empty());
    }

    #[test]
    fn it_builds_and_caches_the_legacy_parser() {
        let registry = Registry::default();
        registry.add_option(
            "ls",
            false,
            OptionForm::Short,
            "l",
            "",
            None,
            "Long listing",
            ArgumentTag::empty(),
        );

        let set = registry.get("ls");
        let suggestions = set.suggest_next_argument(&argv(&["ls"]));
        assert_eq!(suggestions[0].token, "-l");
        assert_eq!(suggestions[0].description, "Long listing");
    }

    #[test]
    fn it_looks_up_legacy_entries_by_last_path_component() {
        let registry = Registry::default();
        registry.add_option(
            "ls",
            false,
            OptionForm::Short,
            "l",
            "",
            None,
            "",
            ArgumentTag::empty(),
        );
        assert!(!registry.get("/bin/ls").is_empty());
    }

    #[test]
    fn it_removes_options_and_empty_entries() {
        let registry = Registry::default();
        registry.add_option(
            "ls",
            false,
            OptionForm::Short,
            "l",
            "",
            None,
            "",
            ArgumentTag::empty(),
        );
        registry.remove_option("ls", false, "l", OptionForm::Short);
        assert!(registry.get("ls").is_empty());
        assert!(registry.options_snapshot().is_empty());
    }

    #[test]
    fn it_merges_validation_statuses_across_parsers() {
        let registry = Registry::default();
        register(&registry, "tool", "Usage:\n  tool alpha");
        register(&registry, "tool", "Usage:\n  tool beta");

        let set = registry.get("tool");
        let statuses = set.validate(&argv(&["tool", "beta"]));
        assert_eq!(statuses, vec![ArgumentStatus::Valid, ArgumentStatus::Valid]);

        let statuses = set.validate(&argv(&["tool", "alp"]));
        assert_eq!(
            statuses,
            vec![ArgumentStatus::Valid, ArgumentStatus::ValidPrefix]
        );
    }

    #[test]
    fn it_gives_fresh_registrations_parse_precedence() {
        let registry = Registry::default();
        register(&registry, "tool", "Usage:\n  tool <first>");
        register(&registry, "tool", "Usage:\n  tool <second>");

        let set = registry.get("tool");
        let parsed = set.parse_arguments(&argv(&["tool", "value"])).unwrap();
        assert_eq!(parsed.values["<second>"], vec!["value"]);
        assert_eq!(parsed.values["<first>"], vec!["value"]);
    }

    #[test]
    fn it_intersects_unused_indices() {
        let registry = Registry::default();
        register(&registry, "tool", "Usage:\n  tool alpha");
        register(&registry, "tool", "Usage:\n  tool alpha extra");

        let set = registry.get("tool");
        let parsed = set
            .parse_arguments(&argv(&["tool", "alpha", "extra"]))
            .unwrap();
        // The longer usage consumes everything, so nothing is unused in
        // every parser.
        assert!(parsed.unused.is_empty());
    }

    #[test]
    fn it_returns_none_for_an_empty_set() {
        let registry = Registry::default();
        assert!(registry.get("unknown").parse_arguments(&argv(&["unknown"])).is_none());
        assert!(registry.get("unknown").validate(&argv(&["unknown"])).is_empty());
    }

    #[test]
    fn it_derives_descriptions_from_variable_names() {
        assert_eq!(description_from_variable_name("<file_name>"), "File name");
        assert_eq!(description_from_variable_name("<pid>"), "Pid");
    }

    #[test]
    fn it_finds_the_value_command_for_a_variable() {
        let registry = Registry::default();
        register(
            &registry,
            "kill",
            "Usage:\n  kill <pid>\nConditions:\n  <pid>  list-pids",
        );

        let set = registry.get("kill");
        let (command, description) = set.commands_for_variable("<pid>").unwrap();
        assert_eq!(command, "list-pids");
        assert_eq!(description, "Pid");
        assert!(set.commands_for_variable("<other>").is_none());
    }

    #[test]
    fn it_takes_option_descriptions_from_the_freshest_registration() {
        let registry = Registry::default();
        register(&registry, "tool", "Usage:\n  tool [options]\nOptions:\n  -q  Quiet");
        register(
            &registry,
            "tool",
            "Usage:\n  tool [options] run\nOptions:\n  -q  Silence all output",
        );

        let set = registry.get("tool");
        assert_eq!(
            set.description_for_option("-q"),
            Some("Silence all output".to_string())
        );
        assert_eq!(set.description_for_option("-x"), None);
    }

    #[test]
    fn it_keeps_duplicate_suggestion_tokens_across_parsers() {
        let registry = Registry::default();
        register(&registry, "tool", "Usage:\n  tool --bar");
        register(&registry, "tool", "Usage:\n  tool --bar run");

        let set = registry.get("tool");
        let suggestions = set.suggest_next_argument(&argv(&["tool"]));
        let tokens: Vec<&str> = suggestions.iter().map(|s| s.token.as_str()).collect();
        // Both parsers propose the option; each keeps its own condition
        // for the driver to test.
        assert_eq!(tokens, vec!["--bar", "--bar"]);
    }
}
