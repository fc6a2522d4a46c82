use std::collections::HashMap;

use nutsh_core::Subshell;

/// Per-request memoisation of completion conditions.
///
/// A condition is a command whose exit status gates a suggestion. The empty
/// condition always holds. Without a subshell capability, which is how
/// autosuggest requests are built, every non-empty condition is false and
/// nothing is evaluated.
#[derive(Default)]
pub struct ConditionCache {
    results: HashMap<String, bool>,
}

impl ConditionCache {
    /// Tests a condition, evaluating it at most once per request.
    pub fn test(&mut self, condition: &str, subshell: Option<&dyn Subshell>) -> bool {
        if condition.is_empty() {
            return true;
        }

        let Some(subshell) = subshell else {
            return false;
        };

        if let Some(&known) = self.results.get(condition) {
            return known;
        }

        let result = subshell
            .exec(condition)
            .map(|output| output.succeeded())
            .unwrap_or(false);
        self.results.insert(condition.to_string(), result);
        result
    }
}
