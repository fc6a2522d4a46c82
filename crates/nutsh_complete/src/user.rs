use std::time::{Duration, Instant};

use nutsh_core::{Candidate, CompleteFlags, FuzzyMatch};

use crate::completer::Completer;

/// Wall-clock budget for enumerating the account database.
const USER_ENUMERATION_BUDGET: Duration = Duration::from_millis(200);

impl Completer<'_> {
    /// Completes a `~user` token.
    ///
    /// Returns `true` if any candidate was produced; the driver then stops.
    /// Skipped on autosuggest requests, which must not touch global
    /// account-database state; enumeration is serialised otherwise.
    pub(crate) fn complete_users(&mut self, token: &str) -> bool {
        if self.autosuggest() {
            return false;
        }

        let Some(partial) = token.strip_prefix('~') else {
            return false;
        };
        if token.contains('/') || partial.contains('~') {
            return false;
        }

        let service = self.service;
        let candidates = &mut self.candidates;
        let _serialised = service.user_lock.lock();
        let started = Instant::now();
        let mut any = false;

        service.users.for_each_name(&mut |name| {
            if started.elapsed() > USER_ENUMERATION_BUDGET {
                return false;
            }

            if name.starts_with(partial) {
                candidates.push(Candidate::new(
                    &name[partial.len()..],
                    format!("Home for {name}"),
                    FuzzyMatch::exact(),
                    CompleteFlags::NO_SPACE,
                ));
                any = true;
            } else if name.to_lowercase().starts_with(&partial.to_lowercase()) {
                candidates.push(Candidate::new(
                    format!("~{name}"),
                    format!("Home for {name}"),
                    FuzzyMatch::exact(),
                    CompleteFlags::REPLACES_TOKEN
                        | CompleteFlags::DONT_ESCAPE
                        | CompleteFlags::NO_SPACE,
                ));
                any = true;
            }
            true
        });
        any
    }
}
