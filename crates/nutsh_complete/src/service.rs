use nutsh_core::{
    ArgumentLists, Builtins, Candidate, Functions, NullArgumentLists, StaticBuiltins,
    StaticFunctions, Subshell, SysUsers, Users, VarsSnapshot,
};
use nutsh_usage::{ArgumentTag, OptionForm, UsageError};
use parking_lot::Mutex;

use crate::completer::{Completer, RequestFlags};
use crate::load::{CompletionLoader, LoadState};
use crate::print::print_registry;
use crate::registry::{GrammarSet, Registry};
use crate::wrap::WrapGraph;

/// The completion engine: owns the grammar registry, the wrap graph, and
/// the host providers, and serves completion requests.
///
/// One service lives for the life of the shell; requests borrow it. All
/// shared state is guarded internally, so a service can serve the
/// interactive thread and background autosuggest threads at once.
pub struct CompletionService {
    pub(crate) registry: Registry,
    pub(crate) wraps: WrapGraph,
    pub(crate) load_state: LoadState,
    pub(crate) loader: Option<Box<dyn CompletionLoader>>,
    pub(crate) builtins: Box<dyn Builtins>,
    pub(crate) functions: Box<dyn Functions>,
    pub(crate) users: Box<dyn Users>,
    pub(crate) arg_lists: Box<dyn ArgumentLists>,

    /// Stack of command-line overrides installed while walking a wrap
    /// chain; conditions that inspect the line read the top entry.
    transient: Mutex<Vec<String>>,

    /// Serialises account-database enumeration.
    pub(crate) user_lock: Mutex<()>,
}

impl Default for CompletionService {
    fn default() -> Self {
        Self {
            registry: Registry::default(),
            wraps: WrapGraph::default(),
            load_state: LoadState::default(),
            loader: None,
            builtins: Box::new(StaticBuiltins::default()),
            functions: Box::new(StaticFunctions::default()),
            users: Box::new(SysUsers),
            arg_lists: Box::new(NullArgumentLists),
            transient: Mutex::new(Vec::new()),
            user_lock: Mutex::new(()),
        }
    }
}

impl CompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins(mut self, builtins: Box<dyn Builtins>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_functions(mut self, functions: Box<dyn Functions>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_users(mut self, users: Box<dyn Users>) -> Self {
        self.users = users;
        self
    }

    pub fn with_argument_lists(mut self, arg_lists: Box<dyn ArgumentLists>) -> Self {
        self.arg_lists = arg_lists;
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn CompletionLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Computes completion candidates for a line and cursor position.
    ///
    /// The subshell capability is only honoured on interactive requests;
    /// autosuggest requests never evaluate user code regardless of what is
    /// passed.
    pub fn complete(
        &self,
        line: &str,
        cursor: usize,
        flags: RequestFlags,
        vars: &VarsSnapshot,
        subshell: Option<&dyn Subshell>,
    ) -> Vec<Candidate> {
        Completer::new(self, flags, vars, subshell).complete(line, cursor)
    }

    /// Registers a docopt-style usage description. See
    /// [`Registry::register_usage`].
    pub fn register_usage(
        &self,
        cmd: &str,
        condition: &str,
        usage: &str,
        description: &str,
    ) -> Result<(), Vec<UsageError>> {
        self.registry
            .register_usage(cmd, condition, usage, description, self.arg_lists.as_ref())
    }

    /// Adds a legacy option. See [`Registry::add_option`].
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
        self.registry.add_option(
            cmd,
            is_path,
            form,
            name,
            condition,
            args_command,
            description,
            tag,
        );
    }

    pub fn remove_option(&self, cmd: &str, is_path: bool, name: &str, form: OptionForm) {
        self.registry.remove_option(cmd, is_path, name, form);
    }

    pub fn remove_all(&self, cmd: &str, is_path: bool) {
        self.registry.remove_all(cmd, is_path);
    }

    pub fn set_authoritative(&self, cmd: &str, is_path: bool, authoritative: bool) {
        self.registry.set_authoritative(cmd, is_path, authoritative);
    }

    /// Returns the grammar snapshot for a command string.
    pub fn grammars(&self, cmd: &str) -> GrammarSet {
        self.registry.get(cmd)
    }

    /// Records that completions for `command` also apply to `wrapper`.
    pub fn add_wrap(&self, wrapper: &str, command: &str) -> bool {
        self.wraps.add(wrapper, command)
    }

    pub fn remove_wrap(&self, wrapper: &str, command: &str) -> bool {
        self.wraps.remove(wrapper, command)
    }

    /// Returns the wrap chain for a command: itself, then everything it
    /// transitively wraps.
    pub fn wrap_chain(&self, command: &str) -> Vec<String> {
        self.wraps.chain(command)
    }

    /// Renders the registry as `complete` directives.
    pub fn print_registry(&self) -> String {
        print_registry(&self.registry, &self.wraps)
    }

    /// The command line a host should report while a wrap-chain override
    /// is active.
    pub fn transient_command_line(&self) -> Option<String> {
        self.transient.lock().last().cloned()
    }

    pub(crate) fn push_transient_line(&self, line: String) -> TransientLineGuard<'_> {
        self.transient.lock().push(line);
        TransientLineGuard { service: self }
    }

    pub(crate) fn load_completions(&self, command: &str) {
        if let Some(loader) = &self.loader {
            self.load_state.load(loader.as_ref(), command);
        }
    }

    pub(crate) fn schedule_load(&self, command: &str) {
        if let Some(loader) = &self.loader {
            self.load_state.schedule(loader.as_ref(), command);
        }
    }
}

/// Removes its command-line override when dropped.
pub(crate) struct TransientLineGuard<'a> {
    service: &'a CompletionService,
}

impl Drop for TransientLineGuard<'_> {
    fn drop(&mut self) {
        self.service.transient.lock().pop();
    }
}
