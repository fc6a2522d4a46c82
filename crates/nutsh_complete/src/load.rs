use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

/// Hook for loading per-command completion definitions on demand.
///
/// Interactive requests call `load` synchronously. Autosuggest requests
/// must not block and instead call `schedule_load`, which is expected to
/// queue the load for the interactive side.
pub trait CompletionLoader: Send + Sync {
    fn load(&self, command: &str);

    fn schedule_load(&self, command: &str);
}

/// Tracks which commands have had a load attempt, and serialises loads per
/// command name.
#[derive(Default)]
pub struct LoadState {
    attempted: Mutex<HashSet<String>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LoadState {
    /// Loads completions for a command on the interactive path.
    ///
    /// Loads for the same name are serialised; loads for distinct names may
    /// run concurrently.
    pub fn load(&self, loader: &dyn CompletionLoader, command: &str) {
        let name_lock = {
            let mut in_flight = self.in_flight.lock();
            Arc::clone(in_flight.entry(command.to_string()).or_default())
        };

        let _serialised = name_lock.lock();
        loader.load(command);
        self.attempted.lock().insert(command.to_string());
    }

    /// Schedules a load from the autosuggest path, once per command name.
    pub fn schedule(&self, loader: &dyn CompletionLoader, command: &str) {
        if self.attempted.lock().insert(command.to_string()) {
            loader.schedule_load(command);
        }
    }
}
