use std::path::{Path, PathBuf};

use bitflags::bitflags;
use is_executable::is_executable;
use nutsh_core::{
    complete_against_pattern, Candidate, CompleteFlags, MatchTier, VarsSnapshot,
};
use nutsh_parse::unescape;

bitflags! {
    /// Flags controlling token expansion into file-system candidates.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ExpandFlags: u8 {
        /// Only executables and directories match.
        const EXECUTABLES_ONLY = 1 << 0;

        /// Only directories match.
        const DIRECTORIES_ONLY = 1 << 1;

        /// Allow fuzzy matching of file names.
        const FUZZY = 1 << 2;

        /// Do not attach descriptions.
        const NO_DESCRIPTIONS = 1 << 3;

        /// Expand for `cd`: search the `$CDPATH` directories.
        const SPECIAL_CD = 1 << 4;
    }
}

/// Expands a token into file-system completion candidates.
///
/// The token is unescaped, `$name` references are substituted from the
/// snapshot, and a leading `~/` is resolved to the home directory but kept
/// as a tilde in any replacement text.
pub fn expand_token(
    token: &str,
    flags: ExpandFlags,
    vars: &VarsSnapshot,
    out: &mut Vec<Candidate>,
) -> Result<(), String> {
    let Some(unescaped) = unescape(token, true) else {
        return Err(format!("cannot unescape token '{token}'"));
    };
    let substituted = substitute_vars(&unescaped, vars);
    let (expanded, home) = expand_tilde(&substituted);

    let (dir_part, file_prefix) = match expanded.rsplit_once('/') {
        Some((dir, prefix)) => (Some(dir.to_string()), prefix.to_string()),
        None => (None, expanded.clone()),
    };

    // The prefix replacement candidates carry: the typed directory part,
    // with the home directory folded back into a tilde.
    let mut display_dir = dir_part
        .as_ref()
        .map(|dir| format!("{dir}/"))
        .unwrap_or_default();
    let mut preserved_tilde = false;
    if let Some(home) = &home {
        if display_dir.starts_with(home.as_str()) {
            display_dir = display_dir.replacen(home.as_str(), "~", 1);
            preserved_tilde = true;
        }
    }

    for base in search_bases(dir_part.as_deref(), flags, vars) {
        complete_directory(
            &base,
            &file_prefix,
            &display_dir,
            preserved_tilde,
            flags,
            out,
        );
    }
    Ok(())
}

/// Returns the directories to enumerate for a token.
fn search_bases(dir_part: Option<&str>, flags: ExpandFlags, vars: &VarsSnapshot) -> Vec<PathBuf> {
    let pwd = || {
        vars.get("PWD")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    };

    if let Some(dir) = dir_part {
        let dir = if dir.is_empty() { "/" } else { dir };
        let path = Path::new(dir);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        if flags.contains(ExpandFlags::SPECIAL_CD) {
            return cd_bases(vars)
                .into_iter()
                .map(|base| base.join(dir))
                .collect();
        }
        return vec![pwd().join(dir)];
    }

    if flags.contains(ExpandFlags::SPECIAL_CD) {
        return cd_bases(vars);
    }
    vec![pwd()]
}

/// The `$CDPATH` search list, resolved against the working directory.
fn cd_bases(vars: &VarsSnapshot) -> Vec<PathBuf> {
    let pwd = vars
        .get("PWD")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    vars.cd_dirs()
        .into_iter()
        .map(|dir| {
            let path = PathBuf::from(&dir);
            if path.is_absolute() {
                path
            } else {
                pwd.join(path)
            }
        })
        .collect()
}

fn complete_directory(
    base: &Path,
    file_prefix: &str,
    display_dir: &str,
    preserved_tilde: bool,
    flags: ExpandFlags,
    out: &mut Vec<Candidate>,
) {
    let Ok(entries) = std::fs::read_dir(base) else {
        return;
    };

    let ceiling = if flags.contains(ExpandFlags::FUZZY) {
        MatchTier::SubsequenceInsert
    } else {
        MatchTier::PrefixCi
    };

    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().to_string();

        // Hidden files only match an explicitly dotted prefix.
        if name.starts_with('.') && !file_prefix.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let is_dir = path.is_dir();
        if flags.contains(ExpandFlags::DIRECTORIES_ONLY) && !is_dir {
            continue;
        }
        if flags.contains(ExpandFlags::EXECUTABLES_ONLY) && !is_dir && !is_executable(&path) {
            continue;
        }

        let Some(completion) = complete_against_pattern(&name, file_prefix, ceiling) else {
            continue;
        };

        let mut text = completion.text;
        if completion.flags.contains(CompleteFlags::REPLACES_TOKEN) {
            text = format!("{display_dir}{text}");
        }
        if is_dir {
            text.push('/');
        }

        let mut candidate_flags = completion.flags | CompleteFlags::AUTO_SPACE;
        if preserved_tilde && completion.flags.contains(CompleteFlags::REPLACES_TOKEN) {
            candidate_flags |= CompleteFlags::DONT_ESCAPE_TILDES;
        }

        let description = if is_dir && !flags.contains(ExpandFlags::NO_DESCRIPTIONS) {
            "Directory"
        } else {
            ""
        };

        out.push(Candidate::new(
            text,
            description,
            completion.fuzz,
            candidate_flags,
        ));
    }
}

/// Substitutes `$name` references from the snapshot. Unknown names are
/// kept as typed.
fn substitute_vars(input: &str, vars: &VarsSnapshot) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            output.push(ch);
            continue;
        }

        let mut name = String::new();
        while let Some((_, next)) = chars.peek().copied() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }

        match vars.get(&name) {
            Some(value) if !name.is_empty() => output.push_str(value),
            _ => {
                output.push('$');
                output.push_str(&name);
            }
        }
    }
    output
}

/// Expands a leading `~/` (or a bare `~`) to the home directory.
///
/// Returns the expansion and the home path used, if any.
fn expand_tilde(input: &str) -> (String, Option<String>) {
    if input != "~" && !input.starts_with("~/") {
        return (input.to_string(), None);
    }

    let Some(home) = dirs::home_dir() else {
        return (input.to_string(), None);
    };
    let home = home.to_string_lossy().to_string();
    (input.replacen('~', &home, 1), Some(home))
}
