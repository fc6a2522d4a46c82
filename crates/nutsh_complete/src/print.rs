use nutsh_core::escape_string;
use nutsh_usage::{ArgumentTag, OptionForm};

use crate::registry::Registry;
use crate::wrap::WrapGraph;

/// Renders the legacy registry and the wrap graph as `complete`
/// directives, one per line, in registration order.
pub(crate) fn print_registry(registry: &Registry, wraps: &WrapGraph) -> String {
    let mut out = String::new();

    for snapshot in registry.options_snapshot() {
        let option = &snapshot.option;
        out.push_str("complete");

        if !option.metadata.tag.contains(ArgumentTag::ALLOW_FILES) {
            out.push_str(" --no-files");
        }

        append_switch(
            &mut out,
            if snapshot.is_path { "path" } else { "command" },
            &snapshot.command,
        );

        if !option.spelling.is_empty() {
            let switch = match option.form {
                OptionForm::Short => "short-option",
                OptionForm::OldLong => "old-option",
                OptionForm::DoubleLong => "long-option",
                OptionForm::ArgsOnly => unreachable!("args-only options have no spelling"),
            };
            append_switch(&mut out, switch, option.spelling.trim_start_matches('-'));
        }

        append_switch(&mut out, "description", &option.metadata.description);
        append_switch(&mut out, "arguments", &option.metadata.command);
        append_switch(&mut out, "condition", &option.metadata.condition);
        out.push('\n');
    }

    for (command, target) in wraps.pairs() {
        out.push_str(&format!(
            "complete --command {} --wraps {}\n",
            escape_string(&command),
            escape_string(&target)
        ));
    }
    out
}

/// Appends ` --switch value` with the value shell-escaped, skipping empty
/// values entirely.
fn append_switch(out: &mut String, switch: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push_str(&format!(" --{switch} {}", escape_string(value)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_prints_options_in_creation_order() {
        let registry = Registry::default();
        let wraps = WrapGraph::default();

        registry.add_option(
            "zeta",
            false,
            OptionForm::Short,
            "z",
            "",
            None,
            "Zeta flag",
            ArgumentTag::ALLOW_FILES,
        );
        registry.add_option(
            "alpha",
            false,
            OptionForm::DoubleLong,
            "all",
            "test -d .",
            Some("list-things"),
            "Every thing",
            ArgumentTag::empty(),
        );

        let printed = print_registry(&registry, &wraps);
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(
            lines,
            vec![
                "complete --command zeta --short-option z --description 'Zeta flag'",
                "complete --no-files --command alpha --long-option all \
                 --description 'Every thing' --arguments list-things \
                 --condition 'test -d .'",
            ]
        );
    }

    #[test]
    fn it_interleaves_commands_in_registration_order() {
        let registry = Registry::default();
        let wraps = WrapGraph::default();

        for (cmd, name) in [("one", "a"), ("two", "b"), ("one", "c")] {
            registry.add_option(
                cmd,
                false,
                OptionForm::Short,
                name,
                "",
                None,
                "",
                ArgumentTag::ALLOW_FILES,
            );
        }

        let printed = print_registry(&registry, &wraps);
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(
            lines,
            vec![
                "complete --command one --short-option a",
                "complete --command two --short-option b",
                "complete --command one --short-option c",
            ]
        );
    }

    #[test]
    fn it_prints_path_entries_and_wraps() {
        let registry = Registry::default();
        let wraps = WrapGraph::default();

        registry.add_option(
            "/usr/bin/tool",
            true,
            OptionForm::OldLong,
            "verbose",
            "",
            None,
            "",
            ArgumentTag::ALLOW_FILES,
        );
        wraps.add("gco", "git");

        let printed = print_registry(&registry, &wraps);
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(
            lines,
            vec![
                "complete --path /usr/bin/tool --old-option verbose",
                "complete --command gco --wraps git",
            ]
        );
    }
}
