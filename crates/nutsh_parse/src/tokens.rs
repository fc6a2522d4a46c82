use crate::span::Span;

/// The kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A word, quotes and escapes included.
    Word,

    /// `|` or `||`.
    Pipe,

    /// A trailing `&`.
    Background,

    /// `;`, a newline, or `&&`.
    Separator,

    /// A redirection operator, file descriptor digits included.
    RedirectOp,

    /// `#` up to the end of the line.
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }
}

/// Scans a line into tokens.
///
/// The scanner is tolerant by construction: unterminated quotes extend the
/// final word to the end of the line, and malformed input never fails.
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();
    let mut quote: Option<char> = None;
    let mut word_start: Option<usize> = None;

    let end_word = |tokens: &mut Vec<Token>, word_start: &mut Option<usize>, end: usize| {
        if let Some(start) = word_start.take() {
            tokens.push(Token::new(TokenKind::Word, start, end));
        }
    };

    while let Some((pos, ch)) = chars.next() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            } else if ch == '\\' && open == '"' {
                chars.next();
            }
            continue;
        }

        match ch {
            '\\' => {
                word_start.get_or_insert(pos);
                chars.next();
            }
            '\'' | '"' => {
                word_start.get_or_insert(pos);
                quote = Some(ch);
            }
            ' ' | '\t' => end_word(&mut tokens, &mut word_start, pos),
            '\n' | ';' => {
                end_word(&mut tokens, &mut word_start, pos);
                tokens.push(Token::new(TokenKind::Separator, pos, pos + 1));
            }
            '|' => {
                end_word(&mut tokens, &mut word_start, pos);
                let end = if matches!(chars.peek(), Some((_, '|'))) {
                    chars.next();
                    pos + 2
                } else {
                    pos + 1
                };
                tokens.push(Token::new(TokenKind::Pipe, pos, end));
            }
            '&' => {
                end_word(&mut tokens, &mut word_start, pos);
                if matches!(chars.peek(), Some((_, '&'))) {
                    chars.next();
                    tokens.push(Token::new(TokenKind::Separator, pos, pos + 2));
                } else {
                    tokens.push(Token::new(TokenKind::Background, pos, pos + 1));
                }
            }
            '<' | '>' => {
                // A directly adjacent digit run is the file descriptor and
                // belongs to the operator.
                let mut start = pos;
                if let Some(word) = word_start {
                    let pending = &line[word..pos];
                    if !pending.is_empty() && pending.bytes().all(|b| b.is_ascii_digit()) {
                        word_start = None;
                        start = word;
                    } else {
                        end_word(&mut tokens, &mut word_start, pos);
                    }
                }

                let mut end = pos + 1;
                if ch == '>' && matches!(chars.peek(), Some((_, '>'))) {
                    chars.next();
                    end += 1;
                }
                if matches!(chars.peek(), Some((_, '&'))) {
                    chars.next();
                    end += 1;
                    while let Some((digit_pos, digit)) = chars.peek().copied() {
                        if !digit.is_ascii_digit() {
                            break;
                        }
                        end = digit_pos + 1;
                        chars.next();
                    }
                }
                tokens.push(Token::new(TokenKind::RedirectOp, start, end));
            }
            '#' if word_start.is_none() => {
                let mut end = line.len();
                while let Some((newline_pos, next)) = chars.peek().copied() {
                    if next == '\n' {
                        end = newline_pos;
                        break;
                    }
                    chars.next();
                }
                tokens.push(Token::new(TokenKind::Comment, pos, end));
            }
            _ => {
                word_start.get_or_insert(pos);
            }
        }
    }

    end_word(&mut tokens, &mut word_start, line.len());
    tokens
}

/// Returns the spans of all words in the line.
pub fn word_spans(line: &str) -> Vec<Span> {
    tokenize(line)
        .into_iter()
        .filter(|token| token.kind == TokenKind::Word)
        .map(|token| token.span)
        .collect()
}

/// Returns the span of the token under the cursor, for a line already
/// truncated at the cursor.
///
/// When the line ends inside a word, that word is the current token. When
/// it ends in whitespace or after an operator, the current token is empty
/// and sits at the end of the line.
pub fn token_extents(line: &str) -> Span {
    match word_spans(line).last() {
        Some(last) if last.end == line.len() => *last,
        _ => Span::empty_at(line.len()),
    }
}
