use crate::span::Span;

/// Returns the content span of the innermost command substitution
/// containing the cursor, or the whole line when there is none.
///
/// Substitutions use `$( ... )` syntax. Single quotes disable them; double
/// quotes do not. An unterminated substitution extends to the end of the
/// line.
pub fn cmdsub_span(line: &str, cursor: usize) -> Span {
    let mut chars = line.char_indices().peekable();
    let mut quote: Option<char> = None;
    let mut open_stack: Vec<usize> = Vec::new();
    let mut best: Option<Span> = None;

    while let Some((pos, ch)) = chars.next() {
        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                }
                continue;
            }
            Some('"') => match ch {
                '"' => {
                    quote = None;
                    continue;
                }
                '\\' => {
                    chars.next();
                    continue;
                }
                '$' | ')' => {} // Substitutions stay active in double quotes.
                _ => continue,
            },
            _ => {}
        }

        match ch {
            '\\' => {
                chars.next();
            }
            '\'' | '"' if quote.is_none() => quote = Some(ch),
            '$' => {
                if matches!(chars.peek(), Some((_, '('))) {
                    let (paren_pos, _) = chars.next().unwrap_or((pos, '('));
                    open_stack.push(paren_pos + 1);
                }
            }
            ')' => {
                if let Some(start) = open_stack.pop() {
                    if start <= cursor && cursor <= pos {
                        // The first closed range containing the cursor is
                        // the innermost one.
                        if best.is_none() {
                            best = Some(Span::new(start, pos));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // An unterminated substitution is innermost when it opens later than
    // any closed candidate.
    let unterminated = open_stack
        .into_iter()
        .rev()
        .find(|&start| start <= cursor);
    match (best, unterminated) {
        (Some(span), Some(start)) if start > span.start => Span::new(start, line.len()),
        (None, Some(start)) => Span::new(start, line.len()),
        (Some(span), _) => span,
        (None, None) => Span::new(0, line.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_returns_the_whole_line_without_substitutions() {
        assert_eq!(cmdsub_span("echo hello", 6), Span::new(0, 10));
    }

    #[test]
    fn it_finds_an_unterminated_substitution() {
        let line = "echo $(git ch";
        assert_eq!(cmdsub_span(line, line.len()).source(line), "git ch");
    }

    #[test]
    fn it_finds_a_closed_substitution_containing_the_cursor() {
        let line = "echo $(cat file) done";
        assert_eq!(cmdsub_span(line, 10).source(line), "cat file");
        assert_eq!(cmdsub_span(line, 18), Span::new(0, line.len()));
    }

    #[test]
    fn it_prefers_the_innermost_substitution() {
        let line = "a $(b $(c d) e)";
        assert_eq!(cmdsub_span(line, 10).source(line), "c d");
        assert_eq!(cmdsub_span(line, 13).source(line), "b $(c d) e");
    }

    #[test]
    fn it_ignores_substitutions_in_single_quotes() {
        let line = "echo '$(not real'";
        assert_eq!(cmdsub_span(line, 10), Span::new(0, line.len()));
    }
}
