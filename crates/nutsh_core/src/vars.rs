/// An immutable snapshot of environment variables, captured by the caller
/// when a completion request starts.
///
/// Variables keep their insertion order so that name enumeration is
/// deterministic for a given snapshot.
#[derive(Debug, Clone, Default)]
pub struct VarsSnapshot {
    vars: Vec<(String, String)>,
}

impl VarsSnapshot {
    /// Captures the current process environment.
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Constructs a snapshot from explicit variables.
    pub fn with_vars(vars: Vec<(String, String)>) -> Self {
        Self { vars }
    }

    /// Returns the value of a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns all variable names in snapshot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(key, _)| key.as_str())
    }

    /// Returns the executable search directories from `$PATH`.
    ///
    /// Entries are separated by `:` or NUL; empty entries are skipped.
    pub fn path_dirs(&self) -> Vec<String> {
        split_path_list(self.get("PATH").unwrap_or_default())
    }

    /// Returns the `cd` search directories from `$CDPATH`.
    ///
    /// Defaults to the current directory when unset or empty.
    pub fn cd_dirs(&self) -> Vec<String> {
        let dirs = split_path_list(self.get("CDPATH").unwrap_or_default());
        if dirs.is_empty() {
            return vec![".".to_string()];
        }
        dirs
    }
}

fn split_path_list(list: &str) -> Vec<String> {
    list.split(|ch| ch == ':' || ch == '\0')
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> VarsSnapshot {
        VarsSnapshot::with_vars(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn it_returns_values_and_names_in_order() {
        let vars = snapshot(&[("PATH", "/bin"), ("PAGER", "less")]);
        assert_eq!(vars.get("PAGER"), Some("less"));
        assert_eq!(vars.get("UNSET"), None);
        assert_eq!(vars.names().collect::<Vec<_>>(), vec!["PATH", "PAGER"]);
    }

    #[test]
    fn it_splits_path_lists() {
        let vars = snapshot(&[("PATH", "/bin:/usr/bin::/sbin")]);
        assert_eq!(vars.path_dirs(), vec!["/bin", "/usr/bin", "/sbin"]);
    }

    #[test]
    fn it_defaults_cdpath_to_the_current_directory() {
        assert_eq!(snapshot(&[]).cd_dirs(), vec!["."]);
        assert_eq!(snapshot(&[("CDPATH", "")]).cd_dirs(), vec!["."]);
        assert_eq!(
            snapshot(&[("CDPATH", "..:/tmp")]).cd_dirs(),
            vec!["..", "/tmp"]
        );
    }
}
