use std::fmt::Display;

/// An error produced while parsing a usage description.
///
/// The offset is a byte offset into the usage text handed to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    pub offset: usize,
    pub message: String,
}

impl UsageError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at byte {}: {}", self.offset, self.message)
    }
}
