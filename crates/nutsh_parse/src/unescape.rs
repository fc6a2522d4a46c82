/// Removes quoting and escaping from a token.
///
/// With `allow_incomplete`, an unterminated quote or trailing backslash is
/// accepted and the remainder is taken literally; this is used for the
/// token under the cursor. Without it, such tokens yield `None`.
pub fn unescape(token: &str, allow_incomplete: bool) -> Option<String> {
    let mut unescaped = String::with_capacity(token.len());
    let mut chars = token.chars();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                } else {
                    unescaped.push(ch);
                }
            }
            Some(_) => match ch {
                '"' => quote = None,
                '\\' => match chars.next() {
                    Some(escaped @ ('"' | '\\' | '$' | '`')) => unescaped.push(escaped),
                    Some(other) => {
                        unescaped.push('\\');
                        unescaped.push(other);
                    }
                    None => {
                        if !allow_incomplete {
                            return None;
                        }
                        unescaped.push('\\');
                    }
                },
                _ => unescaped.push(ch),
            },
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '\\' => match chars.next() {
                    Some(escaped) => unescaped.push(escaped),
                    None => {
                        if !allow_incomplete {
                            return None;
                        }
                    }
                },
                _ => unescaped.push(ch),
            },
        }
    }

    if quote.is_some() && !allow_incomplete {
        return None;
    }
    Some(unescaped)
}
