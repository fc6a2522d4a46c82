/// Characters that never need escaping in a word.
fn is_plain(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+' | '.' | ',' | '/' | ':' | '=' | '@' | '%' | '^' | '~')
}

/// Escapes a string for display in shell syntax.
///
/// Plain words are returned unchanged. Anything else is wrapped in single
/// quotes, with embedded single quotes spliced out in the usual way.
pub fn escape_string(input: &str) -> String {
    if input.is_empty() {
        return "''".to_string();
    }

    if input.chars().all(is_plain) {
        return input.to_string();
    }

    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('\'');
    for ch in input.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}
