mod error;
mod option;
mod parser;

pub use error::UsageError;
pub use option::{derive_variable_name, AnnotatedOption, ArgumentTag, Metadata, OptionForm};
pub use parser::{ArgumentStatus, ParsedArguments, ParsedValue, Suggestion, UsageParser};
