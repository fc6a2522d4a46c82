use sysinfo::{SystemExt, UserExt};

/// The engine's view of the shell's built-in commands.
pub trait Builtins: Send + Sync {
    /// Returns all built-in command names.
    fn names(&self) -> Vec<String>;

    /// Returns the description of a built-in command.
    fn description(&self, name: &str) -> Option<String>;
}

/// The engine's view of the shell's registered functions.
pub trait Functions: Send + Sync {
    /// Returns all function names.
    ///
    /// Names starting with an underscore are conventionally hidden and are
    /// only included when `include_hidden` is set.
    fn names(&self, include_hidden: bool) -> Vec<String>;

    /// Returns the description of a function.
    fn description(&self, name: &str) -> Option<String>;
}

/// Enumeration of user accounts for `~user` completion.
pub trait Users: Send + Sync {
    /// Visits user names until the visitor returns `false` or the source is
    /// exhausted. Enumeration order is unspecified.
    fn for_each_name(&self, visit: &mut dyn FnMut(&str) -> bool);
}

/// How an argument list may be expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    /// Full expansion; may substitute commands and touch the file system.
    General,

    /// Expansion restricted to side-effect-free constructs. Used on
    /// background threads where evaluation must not run user code.
    CompletionsOnly,
}

/// External parsing services for argument-list strings.
pub trait ArgumentLists: Send + Sync {
    /// Expands an argument-list string into individual words.
    fn expand_argument_list(&self, args: &str, mode: ExpandMode) -> Result<Vec<String>, String>;

    /// Checks an argument-list string for syntax errors without expanding
    /// or evaluating it.
    fn detect_argument_list_errors(&self, args: &str) -> Result<(), String>;
}

/// Output of a subshell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubshellOutput {
    pub status: i32,
    pub lines: Vec<String>,
}

impl SubshellOutput {
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// Capability to run a command in a subshell and capture its output.
///
/// Only interactive requests hold this capability; background autosuggest
/// requests are constructed without it and therefore cannot evaluate user
/// code.
pub trait Subshell {
    fn exec(&self, command: &str) -> std::io::Result<SubshellOutput>;
}

/// A fixed builtin table.
#[derive(Debug, Default)]
pub struct StaticBuiltins {
    entries: Vec<(String, String)>,
}

impl StaticBuiltins {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }
}

impl Builtins for StaticBuiltins {
    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn description(&self, name: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, description)| description.clone())
    }
}

/// A fixed function table.
#[derive(Debug, Default)]
pub struct StaticFunctions {
    entries: Vec<(String, String)>,
}

impl StaticFunctions {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }
}

impl Functions for StaticFunctions {
    fn names(&self, include_hidden: bool) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| include_hidden || !name.starts_with('_'))
            .collect()
    }

    fn description(&self, name: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, description)| description.clone())
    }
}

/// A fixed user list.
#[derive(Debug, Default)]
pub struct StaticUsers {
    names: Vec<String>,
}

impl StaticUsers {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl Users for StaticUsers {
    fn for_each_name(&self, visit: &mut dyn FnMut(&str) -> bool) {
        for name in &self.names {
            if !visit(name) {
                break;
            }
        }
    }
}

/// User enumeration backed by the operating system's account database.
#[derive(Debug, Default)]
pub struct SysUsers;

impl Users for SysUsers {
    fn for_each_name(&self, visit: &mut dyn FnMut(&str) -> bool) {
        let mut system = sysinfo::System::new();
        system.refresh_users_list();
        for user in system.users() {
            if !visit(user.name()) {
                break;
            }
        }
    }
}

/// Argument-list services for hosts without a shell parser. Expansion
/// yields nothing and every string is considered syntactically valid.
#[derive(Debug, Default)]
pub struct NullArgumentLists;

impl ArgumentLists for NullArgumentLists {
    fn expand_argument_list(&self, _args: &str, _mode: ExpandMode) -> Result<Vec<String>, String> {
        Ok(Vec::new())
    }

    fn detect_argument_list_errors(&self, _args: &str) -> Result<(), String> {
        Ok(())
    }
}
