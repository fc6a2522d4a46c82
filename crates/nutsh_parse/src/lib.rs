mod cmdsub;
mod span;
mod statement;
mod tokens;
mod unescape;

pub use cmdsub::cmdsub_span;
pub use span::Span;
pub use statement::{plain_statements, Decoration, PlainStatement};
pub use tokens::{token_extents, tokenize, word_spans, Token, TokenKind};
pub use unescape::unescape;
