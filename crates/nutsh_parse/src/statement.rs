use crate::span::Span;
use crate::tokens::{tokenize, Token, TokenKind};

/// A syntactic prefix narrowing what the command word can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decoration {
    #[default]
    None,
    Command,
    Exec,
    Builtin,
}

impl Decoration {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "command" => Some(Decoration::Command),
            "exec" => Some(Decoration::Exec),
            "builtin" => Some(Decoration::Builtin),
            _ => None,
        }
    }
}

/// A plain statement scanned from a line: one command with its arguments
/// and redirections.
#[derive(Debug, Clone, Default)]
pub struct PlainStatement {
    /// The source range covered by the statement's tokens.
    pub span: Span,

    pub decoration: Decoration,

    /// The command word, if one has been typed yet.
    pub command: Option<Span>,

    /// Argument words, redirection targets excluded.
    pub args: Vec<Span>,

    /// Redirection operators with their targets, when present.
    pub redirections: Vec<(Span, Option<Span>)>,
}

impl PlainStatement {
    /// Returns the index of the argument at or ending at the position.
    pub fn arg_at(&self, pos: usize) -> Option<usize> {
        self.args
            .iter()
            .position(|arg| arg.contains_or_ends_at(pos))
    }

    /// Returns `true` if the position sits inside a redirection: in a
    /// target word, or after an operator that still lacks one.
    pub fn in_redirection(&self, pos: usize) -> bool {
        self.redirections.iter().any(|(op, target)| match target {
            Some(target) => op.end <= pos && pos <= target.end,
            None => op.end <= pos,
        })
    }
}

/// Scans a line into plain statements.
///
/// Statements are separated by pipes, separators, and background markers.
/// The scan accepts incomplete and malformed input; anything that does not
/// form a statement is simply absent from the result.
pub fn plain_statements(line: &str) -> Vec<PlainStatement> {
    let mut statements = Vec::new();
    let mut current: Option<PlainStatement> = None;
    let mut expect_target = false;

    for token in tokenize(line) {
        match token.kind {
            TokenKind::Pipe | TokenKind::Separator | TokenKind::Background => {
                if let Some(statement) = current.take() {
                    statements.push(statement);
                }
                expect_target = false;
            }
            TokenKind::Comment => {}
            TokenKind::RedirectOp => {
                let statement = current.get_or_insert_with(PlainStatement::default);
                extend_span(statement, token);
                // Operators like `2>&1` name their target inline.
                let expects = !token.span.source(line).contains('&');
                statement.redirections.push((token.span, None));
                expect_target = expects;
            }
            TokenKind::Word => {
                let statement = current.get_or_insert_with(PlainStatement::default);
                extend_span(statement, token);
                let word = token.span.source(line);

                if expect_target {
                    if let Some((_, target)) = statement.redirections.last_mut() {
                        *target = Some(token.span);
                    }
                    expect_target = false;
                } else if statement.command.is_none() {
                    match Decoration::from_word(word) {
                        Some(decoration) => statement.decoration = decoration,
                        None => statement.command = Some(token.span),
                    }
                } else {
                    statement.args.push(token.span);
                }
            }
        }
    }

    if let Some(statement) = current.take() {
        statements.push(statement);
    }
    statements
}

fn extend_span(statement: &mut PlainStatement, token: Token) {
    if statement.span.is_empty() && statement.command.is_none() && statement.args.is_empty() {
        statement.span = token.span;
    } else {
        statement.span.end = token.span.end;
    }
}
