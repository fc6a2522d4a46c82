use nutsh_core::{escape_string, fuzzy_match, Candidate, CompleteFlags};

use crate::completer::Completer;

/// Characters that may appear in a variable name.
fn is_var_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

impl Completer<'_> {
    /// Completes a `$name` reference inside the token.
    ///
    /// Returns `true` if any candidate was produced; the driver then stops.
    pub(crate) fn complete_variable(&mut self, token: &str) -> bool {
        let Some(dollar) = find_variable_start(token) else {
            return false;
        };
        let name_start = dollar + 1;
        if name_start >= token.len() {
            return false;
        }

        let partial = &token[name_start..];
        let mut any = false;

        let names: Vec<String> = self.vars.names().map(str::to_string).collect();
        for name in names {
            let fuzz = fuzzy_match(partial, &name, self.match_ceiling());
            if !fuzz.is_match() {
                continue;
            }

            let (text, flags) = if fuzz.requires_full_replacement() {
                let mut replacement = token[..name_start].to_string();
                replacement.push_str(&name);
                (
                    replacement,
                    CompleteFlags::REPLACES_TOKEN | CompleteFlags::DONT_ESCAPE,
                )
            } else {
                (name[partial.len()..].to_string(), CompleteFlags::empty())
            };

            let mut description = String::new();
            if self.wants_descriptions() {
                let Some(value) = self.vars.get(&name) else {
                    continue;
                };
                if !self.autosuggest() {
                    description = format!("Variable: {}", escape_string(value));
                }
            }

            self.candidates.push(Candidate::new(text, description, fuzz, flags));
            any = true;
        }
        any
    }
}

/// Finds the `$` opening the variable reference under the cursor: the last
/// unescaped dollar outside single quotes whose suffix is made of variable
/// characters.
fn find_variable_start(token: &str) -> Option<usize> {
    #[derive(PartialEq)]
    enum Mode {
        Unquoted,
        Single,
        Double,
    }

    let mut mode = Mode::Unquoted;
    let mut variable_start = None;
    let mut chars = token.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if !is_var_char(ch) {
            variable_start = None;
        }

        match ch {
            '\\' => {
                chars.next();
            }
            '$' => {
                if mode != Mode::Single {
                    variable_start = Some(pos);
                }
            }
            '\'' => {
                mode = match mode {
                    Mode::Single => Mode::Unquoted,
                    Mode::Unquoted => Mode::Single,
                    Mode::Double => Mode::Double,
                };
            }
            '"' => {
                mode = match mode {
                    Mode::Double => Mode::Unquoted,
                    Mode::Unquoted => Mode::Double,
                    Mode::Single => Mode::Single,
                };
            }
            _ => {}
        }
    }
    variable_start
}
