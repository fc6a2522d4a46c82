use std::path::PathBuf;
use std::process::Command;

use clap::Parser;
use nutsh_complete::{CompletionService, RequestFlags};
use nutsh_core::{
    ArgumentLists, CompleteFlags, ExpandMode, StaticBuiltins, Subshell, SubshellOutput,
    VarsSnapshot,
};
use nutsh_parse::{unescape, word_spans};
use nutsh_usage::{derive_variable_name, ArgumentStatus};
use tracing_subscriber::EnvFilter;

/// Compute completions for a partial command line.
#[derive(Parser)]
#[clap(name = "nutsh", version)]
struct Opts {
    /// The command line to complete.
    line: String,

    /// Cursor position in bytes; defaults to the end of the line.
    #[clap(short, long)]
    cursor: Option<usize>,

    /// Usage description files to register before completing.
    #[clap(short = 'u', long = "usage")]
    usage_files: Vec<PathBuf>,

    /// Allow fuzzy matches.
    #[clap(long)]
    fuzzy: bool,

    /// Attach descriptions to candidates.
    #[clap(long)]
    descriptions: bool,

    /// Complete as a background autosuggestion request.
    #[clap(long)]
    autosuggest: bool,

    /// Dump the registry instead of completing.
    #[clap(long)]
    print: bool,

    /// Report how well each argument fits the registered usages.
    #[clap(long)]
    validate: bool,

    /// Parse the line against the registered usages and print the captured
    /// variables.
    #[clap(long)]
    parse: bool,
}

/// Argument-list services backed by the line scanner.
struct ScanArgumentLists;

impl ArgumentLists for ScanArgumentLists {
    fn expand_argument_list(&self, args: &str, _mode: ExpandMode) -> Result<Vec<String>, String> {
        Ok(word_spans(args)
            .iter()
            .map(|span| {
                let word = span.source(args);
                unescape(word, true).unwrap_or_else(|| word.to_string())
            })
            .collect())
    }

    fn detect_argument_list_errors(&self, args: &str) -> Result<(), String> {
        match unescape(args, false) {
            Some(_) => Ok(()),
            None => Err("unterminated quote or escape".to_string()),
        }
    }
}

/// Subshell execution through `sh -c`.
struct ShSubshell;

impl Subshell for ShSubshell {
    fn exec(&self, command: &str) -> std::io::Result<SubshellOutput> {
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(SubshellOutput {
            status: output.status.code().unwrap_or(-1),
            lines,
        })
    }
}

fn builtin_table() -> StaticBuiltins {
    let entries = [
        ("cd", "Change the working directory"),
        ("complete", "Edit command-specific completions"),
        ("echo", "Print arguments"),
        ("exit", "Exit the shell"),
        ("jobs", "Print running jobs"),
        ("set", "Set or list variables"),
        ("source", "Evaluate a file in the current shell"),
    ];
    StaticBuiltins::new(
        entries
            .into_iter()
            .map(|(name, description)| (name.to_string(), description.to_string()))
            .collect(),
    )
}

/// Runs the line through the registered grammars instead of completing it.
fn run_grammar_query(service: &CompletionService, opts: &Opts) -> std::process::ExitCode {
    let argv: Vec<String> = word_spans(&opts.line)
        .iter()
        .filter_map(|span| unescape(span.source(&opts.line), false))
        .collect();
    let Some(command) = argv.first() else {
        eprintln!("nutsh: the line holds no command");
        return std::process::ExitCode::FAILURE;
    };

    let set = service.grammars(command);
    if set.is_empty() {
        eprintln!("nutsh: no usage is registered for '{command}'");
        return std::process::ExitCode::FAILURE;
    }

    if opts.validate {
        for (arg, status) in argv.iter().zip(set.validate(&argv)) {
            let status = match status {
                ArgumentStatus::Invalid => "invalid",
                ArgumentStatus::ValidPrefix => "prefix",
                ArgumentStatus::Valid => "valid",
            };
            println!("{arg}\t{status}");
        }
    }

    if opts.parse {
        let Some(parsed) = set.parse_arguments(&argv) else {
            return std::process::ExitCode::FAILURE;
        };
        for error in &parsed.errors {
            eprintln!("nutsh: {error}");
        }
        for (key, values) in &parsed.values {
            println!("{}\t{}", derive_variable_name(key), values.join(" "));
        }
        let leftover: Vec<&str> = parsed
            .unused
            .iter()
            .filter_map(|&index| argv.get(index))
            .map(String::as_str)
            .collect();
        if !leftover.is_empty() {
            println!("argv\t{}", leftover.join(" "));
        }
    }
    std::process::ExitCode::SUCCESS
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();

    let service = CompletionService::new()
        .with_builtins(Box::new(builtin_table()))
        .with_argument_lists(Box::new(ScanArgumentLists));

    for file in &opts.usage_files {
        let usage = match std::fs::read_to_string(file) {
            Ok(usage) => usage,
            Err(error) => {
                eprintln!("nutsh: cannot read {}: {error}", file.display());
                return std::process::ExitCode::FAILURE;
            }
        };
        if let Err(errors) = service.register_usage("", "", &usage, "") {
            for error in errors {
                eprintln!("nutsh: {}: {error}", file.display());
            }
            return std::process::ExitCode::FAILURE;
        }
    }

    if opts.print {
        print!("{}", service.print_registry());
        return std::process::ExitCode::SUCCESS;
    }

    if opts.validate || opts.parse {
        return run_grammar_query(&service, &opts);
    }

    let mut flags = RequestFlags::empty();
    if opts.fuzzy {
        flags |= RequestFlags::FUZZY_MATCH;
    }
    if opts.descriptions {
        flags |= RequestFlags::DESCRIPTIONS;
    }
    if opts.autosuggest {
        flags |= RequestFlags::AUTOSUGGESTION;
    }

    let cursor = opts.cursor.unwrap_or(opts.line.len());
    let vars = VarsSnapshot::from_env();
    let subshell = ShSubshell;
    let candidates = service.complete(&opts.line, cursor, flags, &vars, Some(&subshell));

    for candidate in candidates {
        let mut line = candidate.text.clone();
        if candidate.flags.contains(CompleteFlags::REPLACES_TOKEN) {
            line.push_str("\t(replaces token)");
        }
        if !candidate.description.is_empty() {
            line.push('\t');
            line.push_str(&candidate.description);
        }
        println!("{line}");
    }
    std::process::ExitCode::SUCCESS
}
