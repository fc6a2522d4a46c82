use bitflags::bitflags;

bitflags! {
    /// Tags attached to a suggestion's source entity.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ArgumentTag: u8 {
        /// File completion remains useful alongside this entity.
        const ALLOW_FILES = 1 << 0;
    }
}

/// The spelling style of a legacy option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionForm {
    /// `-o`
    Short,

    /// `-option` (single dash, multiple characters)
    OldLong,

    /// `--option`
    DoubleLong,

    /// No option at all; the entry describes positional arguments.
    ArgsOnly,
}

impl OptionForm {
    /// The number of leading dashes the spelling carries.
    pub fn dash_count(self) -> usize {
        match self {
            OptionForm::Short | OptionForm::OldLong => 1,
            OptionForm::DoubleLong => 2,
            OptionForm::ArgsOnly => 0,
        }
    }
}

/// Metadata for a usage entity: an option, a variable, or a literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// A command whose expanded argument list yields values for the entity.
    pub command: String,

    /// A condition that must hold for the entity to apply.
    pub condition: String,

    /// Human-readable description.
    pub description: String,

    pub tag: ArgumentTag,
}

/// A directly registered option, as produced by the legacy registration
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedOption {
    pub form: OptionForm,

    /// The option spelling with leading dashes materialised. Empty for
    /// [`OptionForm::ArgsOnly`].
    pub spelling: String,

    /// Name of the variable holding the option's value, when it takes one.
    /// For [`OptionForm::ArgsOnly`] this names the positional placeholder.
    pub value_var: Option<String>,

    pub metadata: Metadata,
}

impl AnnotatedOption {
    /// Constructs an option from its bare name, materialising the dashes
    /// its form requires.
    pub fn new(form: OptionForm, name: &str) -> Self {
        let spelling = if name.is_empty() {
            String::new()
        } else {
            format!("{}{}", "-".repeat(form.dash_count()), name)
        };
        Self {
            form,
            spelling,
            value_var: None,
            metadata: Metadata::default(),
        }
    }
}

/// Derives a settable variable name from a usage entity key.
///
/// Options lose their dashes and gain `opt_`, commands gain `cmd_`, and
/// `<var>` placeholders lose the angle brackets. Dashes inside the name
/// become underscores.
pub fn derive_variable_name(key: &str) -> String {
    let derived = if let Some(stripped) = key.strip_prefix('-') {
        format!("opt_{}", stripped.trim_start_matches('-'))
    } else if let Some(stripped) = key.strip_prefix('<') {
        stripped.trim_end_matches('>').to_string()
    } else {
        format!("cmd_{key}")
    };

    derived.replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_materialises_dashes_by_form() {
        assert_eq!(AnnotatedOption::new(OptionForm::Short, "r").spelling, "-r");
        assert_eq!(
            AnnotatedOption::new(OptionForm::OldLong, "recurse").spelling,
            "-recurse"
        );
        assert_eq!(
            AnnotatedOption::new(OptionForm::DoubleLong, "recurse").spelling,
            "--recurse"
        );
        assert_eq!(AnnotatedOption::new(OptionForm::ArgsOnly, "").spelling, "");
    }

    #[test]
    fn it_derives_variable_names() {
        assert_eq!(derive_variable_name("-r"), "opt_r");
        assert_eq!(derive_variable_name("--dry-run"), "opt_dry_run");
        assert_eq!(derive_variable_name("<file-name>"), "file_name");
        assert_eq!(derive_variable_name("checkout"), "cmd_checkout");
    }
}
