use std::fs;

use nutsh_complete::{CompletionService, RequestFlags};
use nutsh_core::{
    Candidate, CompleteFlags, MatchTier, StaticBuiltins, StaticUsers, Subshell, SubshellOutput,
    Users, VarsSnapshot,
};
use nutsh_usage::{ArgumentTag, OptionForm};

fn vars(pairs: &[(&str, &str)]) -> VarsSnapshot {
    VarsSnapshot::with_vars(
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    )
}

fn texts(candidates: &[Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.text.as_str()).collect()
}

/// A subshell that must never be reached.
struct PanickingSubshell;

impl Subshell for PanickingSubshell {
    fn exec(&self, command: &str) -> std::io::Result<SubshellOutput> {
        panic!("subshell invoked with '{command}'");
    }
}

/// A user database that must never be reached.
struct PanickingUsers;

impl Users for PanickingUsers {
    fn for_each_name(&self, _visit: &mut dyn FnMut(&str) -> bool) {
        panic!("user enumeration invoked");
    }
}

#[test]
fn it_completes_builtin_names_with_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new().with_builtins(Box::new(StaticBuiltins::new(vec![(
        "echo".to_string(),
        "Print arguments".to_string(),
    )])));
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("ec", 2, RequestFlags::DESCRIPTIONS, &vars, None);

    assert!(!candidates.is_empty());
    assert_eq!(candidates[0].text, "ho");
    assert_eq!(candidates[0].description, "Print arguments");
    assert!(!candidates[0].flags.contains(CompleteFlags::REPLACES_TOKEN));
    assert!(!candidates[0].flags.contains(CompleteFlags::AUTO_SPACE));
}

#[test]
fn it_short_circuits_on_variables_in_snapshot_order() {
    let service = CompletionService::new();
    let vars = vars(&[("PATH", "/bin"), ("PAGER", "less")]);

    let candidates = service.complete("$PA", 3, RequestFlags::empty(), &vars, None);

    assert_eq!(texts(&candidates), vec!["TH", "GER"]);
    assert!(candidates
        .iter()
        .all(|c| c.fuzz.tier == MatchTier::Prefix));
}

#[test]
fn it_completes_users_after_a_tilde() {
    let service = CompletionService::new().with_users(Box::new(StaticUsers::new(vec![
        "root".to_string(),
        "daemon".to_string(),
    ])));
    let vars = vars(&[]);

    let candidates = service.complete("~ro", 3, RequestFlags::empty(), &vars, None);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].text, "ot");
    assert_eq!(candidates[0].description, "Home for root");
    assert!(candidates[0].flags.contains(CompleteFlags::NO_SPACE));
}

#[test]
fn it_replaces_partial_options_from_registered_usage() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new();
    service
        .register_usage("foo", "", "Usage:\n  foo --bar", "")
        .unwrap();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("foo -", 5, RequestFlags::empty(), &vars, None);

    assert_eq!(texts(&candidates), vec!["--bar"]);
    assert!(candidates[0].flags.contains(CompleteFlags::REPLACES_TOKEN));
    assert!(!candidates[0].flags.contains(CompleteFlags::AUTO_SPACE));
}

#[test]
fn it_walks_wrap_chains_transitively() {
    let service = CompletionService::new();
    assert!(service.add_wrap("gco", "git"));
    assert!(service.add_wrap("git", "hub"));

    assert_eq!(service.wrap_chain("gco"), vec!["gco", "git", "hub"]);
    assert_eq!(service.wrap_chain("hub"), vec!["hub"]);
}

#[test]
fn it_expands_after_an_option_value_separator() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("file1"), "").unwrap();
    fs::write(dir.path().join("file2"), "").unwrap();

    let service = CompletionService::new();
    service
        .register_usage("foo", "", "Usage:\n  foo --opt=<file>", "")
        .unwrap();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("foo --opt=fi", 12, RequestFlags::empty(), &vars, None);

    assert_eq!(texts(&candidates), vec!["le1", "le2"]);
    assert!(candidates
        .iter()
        .all(|c| !c.flags.contains(CompleteFlags::REPLACES_TOKEN)));
}

#[test]
fn it_repairs_separator_replacements_with_the_prefix() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("file1"), "").unwrap();
    fs::write(dir.path().join("file2"), "").unwrap();

    let service = CompletionService::new();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    // A case-insensitive match forces full replacement; the replacement
    // must restore everything up to and including the separator.
    let candidates = service.complete("foo --opt=FI", 12, RequestFlags::empty(), &vars, None);

    assert_eq!(texts(&candidates), vec!["--opt=file1", "--opt=file2"]);
    for candidate in &candidates {
        assert!(candidate.flags.contains(CompleteFlags::REPLACES_TOKEN));
        assert!(candidate.text.starts_with("--opt="));
    }
}

#[test]
fn it_suggests_registered_literals_for_an_empty_argument() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new();
    service
        .register_usage("tool", "", "Usage:\n  tool --force\n  tool add", "")
        .unwrap();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("tool ", 5, RequestFlags::empty(), &vars, None);

    // Options are withheld until a dash is typed; literals appear.
    assert_eq!(texts(&candidates), vec!["add"]);
    assert!(candidates
        .iter()
        .all(|c| !c.flags.contains(CompleteFlags::REPLACES_TOKEN)));
}

#[test]
fn it_includes_every_usage_token_when_asked_with_a_dash() {
    let service = CompletionService::new();
    service
        .register_usage("tool", "", "Usage:\n  tool --force\n  tool add", "")
        .unwrap();

    let suggestions = service
        .grammars("tool")
        .suggest_next_argument(&["tool".to_string()]);
    let tokens: Vec<&str> = suggestions.iter().map(|s| s.token.as_str()).collect();
    assert_eq!(tokens, vec!["--force", "add"]);
}

#[test]
fn it_keeps_one_registration_per_usage_text() {
    let service = CompletionService::new();
    service
        .register_usage("foo", "", "Usage:\n  foo --bar", "")
        .unwrap();
    service
        .register_usage("foo", "", "Usage:\n  foo --bar", "")
        .unwrap();

    assert_eq!(service.grammars("foo").registration_count(), 1);
}

#[test]
fn it_adds_wraps_idempotently() {
    let service = CompletionService::new();
    assert!(service.add_wrap("x", "y"));
    assert!(service.add_wrap("x", "y"));
    assert_eq!(service.wrap_chain("x"), vec!["x", "y"]);

    assert!(service.add_wrap("x", "x"));
    assert_eq!(service.wrap_chain("x"), vec!["x", "y"]);
}

#[test]
fn it_never_emits_replacements_for_an_empty_token() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("File1"), "").unwrap();
    fs::write(dir.path().join("other"), "").unwrap();

    let service = CompletionService::new();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("cat ", 4, RequestFlags::FUZZY_MATCH, &vars, None);

    assert!(!candidates.is_empty());
    assert!(candidates
        .iter()
        .all(|c| !c.flags.contains(CompleteFlags::REPLACES_TOKEN)));
}

#[test]
fn it_never_leaves_auto_space_on_any_candidate() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("file"), "").unwrap();

    let service = CompletionService::new();
    service
        .register_usage("foo", "", "Usage:\n  foo --opt=<file>", "")
        .unwrap();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    for (line, cursor) in [("foo ", 4usize), ("foo -", 5), ("cat f", 5), ("cd s", 4)] {
        let candidates = service.complete(line, cursor, RequestFlags::empty(), &vars, None);
        assert!(
            candidates
                .iter()
                .all(|c| !c.flags.contains(CompleteFlags::AUTO_SPACE)),
            "auto-space left on candidates of '{line}'"
        );
    }
}

#[test]
fn it_sorts_and_deduplicates_final_candidates() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["file10", "file9", "file1"] {
        fs::write(dir.path().join(name), "").unwrap();
    }

    let service = CompletionService::new();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("cat file", 8, RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&candidates), vec!["1", "9", "10"]);
}

#[test]
fn it_completes_directories_only_for_cd() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("subdir")).unwrap();
    fs::write(dir.path().join("surface"), "").unwrap();

    let service = CompletionService::new();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("cd su", 5, RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&candidates), vec!["bdir/"]);
}

#[test]
fn it_searches_cdpath_in_cd_mode() {
    let here = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    fs::create_dir(elsewhere.path().join("project")).unwrap();

    let service = CompletionService::new();
    let vars = vars(&[
        ("PWD", &here.path().display().to_string()),
        ("CDPATH", &elsewhere.path().display().to_string()),
    ]);

    let candidates = service.complete("cd pro", 6, RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&candidates), vec!["ject/"]);
}

#[test]
fn it_never_runs_user_code_while_autosuggesting() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("anything"), "").unwrap();

    let service = CompletionService::new().with_users(Box::new(PanickingUsers));
    service.add_option(
        "foo",
        false,
        OptionForm::DoubleLong,
        "guarded",
        "some-condition",
        None,
        "",
        ArgumentTag::empty(),
    );
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    // The panicking providers prove nothing below touches them.
    let candidates = service.complete(
        "~ro",
        3,
        RequestFlags::AUTOSUGGESTION,
        &vars,
        Some(&PanickingSubshell),
    );
    assert!(candidates.is_empty());

    let candidates = service.complete(
        "foo --gu",
        8,
        RequestFlags::AUTOSUGGESTION,
        &vars,
        Some(&PanickingSubshell),
    );
    // The guarded option's condition cannot be evaluated, so it is false
    // and the option is withheld.
    assert!(candidates.is_empty());
}

#[test]
fn it_skips_file_suggestions_for_empty_autosuggest_arguments() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("visible"), "").unwrap();

    let service = CompletionService::new();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let interactive = service.complete("cat ", 4, RequestFlags::empty(), &vars, None);
    assert!(!interactive.is_empty());

    let autosuggest = service.complete("cat ", 4, RequestFlags::AUTOSUGGESTION, &vars, None);
    assert!(autosuggest.is_empty());
}

#[test]
fn it_applies_wrapped_grammars_to_the_wrapper() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new();
    service
        .register_usage("git", "", "Usage:\n  git checkout", "")
        .unwrap();
    assert!(service.add_wrap("gco", "git"));
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("gco check", 9, RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&candidates), vec!["out"]);
}

#[test]
fn it_respects_statement_decorations() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new().with_builtins(Box::new(StaticBuiltins::new(vec![(
        "echo".to_string(),
        String::new(),
    )])));
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let builtin_scope = service.complete("builtin ec", 10, RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&builtin_scope), vec!["ho"]);

    // `command` excludes builtins; with no PATH there is nothing left.
    let command_scope = service.complete("command ec", 10, RequestFlags::empty(), &vars, None);
    assert!(command_scope.is_empty());
}

#[test]
fn it_completes_redirection_targets_as_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("output.log"), "").unwrap();

    let service = CompletionService::new();
    service
        .register_usage("foo", "", "Usage:\n  foo --bar", "")
        .unwrap();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let candidates = service.complete("foo > out", 9, RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&candidates), vec!["put.log"]);
}

#[test]
fn it_falls_back_to_files_in_non_command_contexts() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes"), "").unwrap();

    let service = CompletionService::new();
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let interactive = service.complete("ls | ", 5, RequestFlags::empty(), &vars, None);
    assert!(texts(&interactive).contains(&"notes"));

    // Autosuggestions stay quiet in the whitespace after a pipe.
    let autosuggest = service.complete("ls | ", 5, RequestFlags::AUTOSUGGESTION, &vars, None);
    assert!(autosuggest.is_empty());
}

#[test]
fn it_completes_inside_command_substitutions() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new().with_builtins(Box::new(StaticBuiltins::new(vec![(
        "echo".to_string(),
        String::new(),
    )])));
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let line = "outer $(ec";
    let candidates = service.complete(line, line.len(), RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&candidates), vec!["ho"]);
}

#[test]
fn it_can_skip_command_substitution_localisation() {
    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new().with_builtins(Box::new(StaticBuiltins::new(vec![(
        "echo".to_string(),
        String::new(),
    )])));
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let line = "outer $(ec";
    let localised = service.complete(line, line.len(), RequestFlags::empty(), &vars, None);
    assert_eq!(texts(&localised), vec!["ho"]);

    // Without localisation, `$(ec` is just an argument of `outer`.
    let skipped = service.complete(
        line,
        line.len(),
        RequestFlags::SKIP_CMDSUBST,
        &vars,
        None,
    );
    assert!(!texts(&skipped).contains(&"ho"));
}

#[test]
fn it_overrides_the_command_line_for_wrapped_grammars() {
    struct RecordingSubshell<'a> {
        service: &'a CompletionService,
        seen: std::sync::Mutex<Vec<Option<String>>>,
    }

    impl Subshell for RecordingSubshell<'_> {
        fn exec(&self, _command: &str) -> std::io::Result<SubshellOutput> {
            self.seen
                .lock()
                .unwrap()
                .push(self.service.transient_command_line());
            Ok(SubshellOutput {
                status: 0,
                lines: Vec::new(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let service = CompletionService::new();
    service
        .register_usage("git", "in-repository", "Usage:\n  git checkout", "")
        .unwrap();
    assert!(service.add_wrap("gco", "git"));
    let vars = vars(&[("PWD", &dir.path().display().to_string())]);

    let subshell = RecordingSubshell {
        service: &service,
        seen: std::sync::Mutex::new(Vec::new()),
    };
    let candidates = service.complete("gco check", 9, RequestFlags::empty(), &vars, Some(&subshell));

    assert_eq!(texts(&candidates), vec!["out"]);
    // The condition saw the wrapped command spliced into the line.
    assert_eq!(
        *subshell.seen.lock().unwrap(),
        vec![Some("git check".to_string())]
    );
    // The override is gone once the request ends.
    assert_eq!(service.transient_command_line(), None);
}

#[test]
fn it_dumps_registrations_and_wraps_as_directives() {
    let service = CompletionService::new();
    service.add_option(
        "tool",
        false,
        OptionForm::DoubleLong,
        "all",
        "",
        None,
        "Every thing",
        ArgumentTag::empty(),
    );
    service.add_wrap("gco", "git");

    let printed = service.print_registry();
    let lines: Vec<&str> = printed.lines().collect();
    assert_eq!(
        lines,
        vec![
            "complete --no-files --command tool --long-option all --description 'Every thing'",
            "complete --command gco --wraps git",
        ]
    );
}
