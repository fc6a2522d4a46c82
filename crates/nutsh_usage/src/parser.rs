use std::collections::{BTreeMap, BTreeSet};

use crate::error::UsageError;
use crate::option::{AnnotatedOption, ArgumentTag, Metadata, OptionForm};

/// How well one argument fits a usage description.
///
/// Ordered from worst to best; merging across parsers keeps the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArgumentStatus {
    /// The argument does not fit.
    Invalid,

    /// The argument is a prefix of something that would fit.
    ValidPrefix,

    /// The argument fits.
    Valid,
}

/// A proposal for the next argument of a partially typed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// A literal word, an option spelling, or a `<variable>` placeholder.
    pub token: String,

    /// A command whose expanded argument list yields concrete values.
    pub command: String,

    /// A condition that must hold for the suggestion to apply.
    pub condition: String,

    pub description: String,

    pub tag: ArgumentTag,
}

/// Values captured for one usage entity while parsing an argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedValue {
    /// Captured values, for variables.
    pub values: Vec<String>,

    /// Number of occurrences, for options and literals.
    pub count: usize,
}

/// The result of parsing an argument vector against a usage description.
#[derive(Debug, Clone, Default)]
pub struct ParsedArguments {
    pub values: BTreeMap<String, ParsedValue>,

    pub errors: Vec<UsageError>,

    /// Indices into the argument vector that the parse did not consume.
    pub unused: Vec<usize>,
}

/// One option collected from a usage description.
#[derive(Debug, Clone, Default)]
struct OptionSpec {
    /// All spellings, dashes included. The first double-dash spelling is
    /// canonical when present.
    spellings: Vec<String>,

    /// Name of the option's value variable, without angle brackets.
    value: Option<String>,

    /// Whether the value is attached with `=` rather than a separate word.
    attached: bool,
}

impl OptionSpec {
    fn canonical(&self) -> &str {
        self.spellings
            .iter()
            .find(|spelling| spelling.starts_with("--"))
            .unwrap_or(&self.spellings[0])
    }

    /// The token to offer when suggesting this option.
    fn suggestion_token(&self, spelling: &str) -> String {
        if self.value.is_some() && self.attached {
            format!("{spelling}=")
        } else {
            spelling.to_string()
        }
    }
}

/// A single matchable item in a usage pattern.
#[derive(Debug, Clone, PartialEq)]
enum Atom {
    /// The command-name slot; matches any single word.
    Program,

    Literal(String),

    /// A `<variable>` placeholder, stored without brackets.
    Variable(String),

    /// Index into the parser's option table.
    OptionRef(usize),
}

/// A node of a compiled usage alternative.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Atom(Atom),

    /// `[ ... ]`
    Optional(Vec<Node>),

    /// `[options]`: any known option, any number of times.
    AnyOptions,

    /// `( a | b )` and bare `a | b` groups.
    Alternation(Vec<Vec<Node>>),

    /// `term...`: one or more repetitions.
    Repeat(Vec<Node>),
}

/// What an atom would have accepted at some argument position.
#[derive(Debug, Clone, PartialEq)]
enum Expected {
    Literal(String),
    Variable(String),
    Option(usize),
    OptionValue(usize),
}

/// A parsed usage description, able to validate argument vectors, propose
/// next arguments, and capture argument values.
#[derive(Debug, Clone, Default)]
pub struct UsageParser {
    alternatives: Vec<Vec<Node>>,
    options: Vec<OptionSpec>,
    metadata: BTreeMap<String, Metadata>,
    variables: Vec<String>,
    commands: Vec<String>,
}

impl UsageParser {
    /// Parses a usage description.
    ///
    /// Returns all collected errors, with byte offsets into `usage`, if the
    /// description cannot be used.
    pub fn from_usage(usage: &str) -> Result<Self, Vec<UsageError>> {
        let mut parser = Self::default();
        let mut errors = Vec::new();

        parser.parse_sections(usage, &mut errors);

        if parser.alternatives.is_empty() && errors.is_empty() {
            errors.push(UsageError::new(0, "usage description has no usage lines"));
        }

        if errors.is_empty() {
            Ok(parser)
        } else {
            Err(errors)
        }
    }

    /// Builds a parser from directly registered options.
    ///
    /// The resulting pattern accepts any command word followed by any mix of
    /// the given options and positional placeholders.
    pub fn from_options(options: &[AnnotatedOption]) -> Self {
        let mut parser = Self::default();
        let mut branches: Vec<Vec<Node>> = Vec::new();

        for option in options {
            if option.form == OptionForm::ArgsOnly {
                let Some(var) = &option.value_var else {
                    continue;
                };
                parser.variables.push(var.clone());
                parser
                    .metadata
                    .insert(format!("<{var}>"), option.metadata.clone());
                branches.push(vec![Node::Atom(Atom::Variable(var.clone()))]);
                continue;
            }

            let index = parser.options.len();
            parser.options.push(OptionSpec {
                spellings: vec![option.spelling.clone()],
                value: option.value_var.clone(),
                attached: option.form == OptionForm::DoubleLong,
            });
            parser
                .metadata
                .insert(option.spelling.clone(), option.metadata.clone());
            if let Some(var) = &option.value_var {
                parser.variables.push(var.clone());
                parser
                    .metadata
                    .insert(format!("<{var}>"), option.metadata.clone());
            }
            branches.push(vec![Node::Atom(Atom::OptionRef(index))]);
        }

        let mut nodes = vec![Node::Atom(Atom::Program)];
        if !branches.is_empty() {
            nodes.push(Node::Optional(vec![Node::Repeat(vec![Node::Alternation(
                branches,
            )])]));
        }
        parser.alternatives.push(nodes);
        parser
    }

    /// Returns the distinct command names of the usage lines, in order of
    /// first appearance.
    pub fn command_names(&self) -> Vec<String> {
        self.commands.clone()
    }

    /// Returns all known variables in `<name>` form.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.variables
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .map(|name| format!("<{name}>"))
            .collect()
    }

    /// Returns the value-generating command for a variable in `<name>` form.
    pub fn command_for_variable(&self, var: &str) -> Option<&str> {
        self.metadata
            .get(var)
            .map(|metadata| metadata.command.as_str())
            .filter(|command| !command.is_empty())
    }

    /// Returns the description of an option spelling.
    pub fn description_for_option(&self, option: &str) -> Option<&str> {
        self.metadata
            .get(option)
            .map(|metadata| metadata.description.as_str())
            .filter(|description| !description.is_empty())
    }

    /// Returns the metadata recorded for a usage entity key.
    pub fn metadata_for_name(&self, name: &str) -> Option<&Metadata> {
        self.metadata.get(name)
    }

    /// Returns a status for every argument in the vector.
    pub fn validate_arguments(&self, argv: &[String]) -> Vec<ArgumentStatus> {
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        let mut recorder = Vec::new();
        let mut reached = BTreeSet::from([0]);

        for alternative in &self.alternatives {
            self.sim_nodes(
                alternative,
                &argv,
                &BTreeSet::from([0]),
                &mut recorder,
                &mut reached,
            );
        }

        argv.iter()
            .enumerate()
            .map(|(index, arg)| {
                if reached.contains(&(index + 1)) {
                    ArgumentStatus::Valid
                } else if self.has_prefix_expectation(&recorder, index, arg) {
                    ArgumentStatus::ValidPrefix
                } else {
                    ArgumentStatus::Invalid
                }
            })
            .collect()
    }

    /// Proposes next arguments for a fully typed argument prefix.
    ///
    /// The argument vector must include the command word and must not
    /// include the partial token under the cursor.
    pub fn suggest_next_argument(&self, argv: &[String]) -> Vec<Suggestion> {
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        let mut recorder = Vec::new();
        let mut reached = BTreeSet::from([0]);

        for alternative in &self.alternatives {
            self.sim_nodes(
                alternative,
                &argv,
                &BTreeSet::from([0]),
                &mut recorder,
                &mut reached,
            );
        }

        let mut suggestions = Vec::new();
        let mut seen = BTreeSet::new();
        for (position, expected) in &recorder {
            if *position != argv.len() {
                continue;
            }
            for suggestion in self.expected_to_suggestions(expected) {
                if seen.insert(suggestion.token.clone()) {
                    suggestions.push(suggestion);
                }
            }
        }
        suggestions
    }

    /// Parses an argument vector, capturing variable values and option and
    /// literal occurrence counts.
    pub fn parse_arguments(&self, argv: &[String]) -> ParsedArguments {
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        let mut best: Option<ParseState> = None;

        for alternative in &self.alternatives {
            let states = self.dfs_nodes(alternative, &argv, vec![ParseState::default()]);
            for state in states {
                let better = match &best {
                    Some(current) => state.pos > current.pos,
                    None => true,
                };
                if better {
                    best = Some(state);
                }
            }
        }

        match best {
            Some(state) => ParsedArguments {
                values: state.values,
                errors: Vec::new(),
                unused: (state.pos..argv.len()).collect(),
            },
            None => ParsedArguments {
                values: BTreeMap::new(),
                errors: vec![UsageError::new(0, "arguments do not match usage")],
                unused: (0..argv.len()).collect(),
            },
        }
    }

    // Usage text parsing.

    fn parse_sections(&mut self, usage: &str, errors: &mut Vec<UsageError>) {
        #[derive(PartialEq)]
        enum Section {
            None,
            Usage,
            Options,
            Conditions,
        }

        let mut section = Section::None;
        let mut offset = 0;

        for line in usage.split('\n') {
            let line_start = offset;
            offset += line.len() + 1;

            let stripped = line.trim_start();
            let indent = line.len() - stripped.len();
            let content_start = line_start + indent;
            let lower = stripped.to_lowercase();

            let header = [
                ("usage:", Section::Usage),
                ("options:", Section::Options),
                ("conditions:", Section::Conditions),
            ]
            .into_iter()
            .find(|(name, _)| lower.starts_with(name));

            let content = if let Some((name, new_section)) = header {
                section = new_section;
                let rest = stripped[name.len()..].trim_start();
                let rest_start = content_start + (stripped.len() - rest.len());
                (rest, rest_start)
            } else {
                (stripped, content_start)
            };

            let (text, text_start) = content;
            if text.is_empty() {
                continue;
            }

            match section {
                Section::Usage => self.parse_usage_line(text, text_start, errors),
                Section::Options if text.starts_with('-') => {
                    self.parse_option_line(text, text_start, errors)
                }
                Section::Conditions if text.starts_with('<') => {
                    self.parse_condition_line(text, text_start, errors)
                }
                _ => {}
            }
        }
    }

    fn parse_usage_line(&mut self, line: &str, base: usize, errors: &mut Vec<UsageError>) {
        let tokens = tokenize_usage_line(line, base);
        if tokens.is_empty() {
            return;
        }

        let program = match &tokens[0].0 {
            LineToken::Word(word) if !word.starts_with('-') && !word.starts_with('<') => {
                word.clone()
            }
            _ => {
                errors.push(UsageError::new(
                    tokens[0].1,
                    "usage line must begin with a command name",
                ));
                return;
            }
        };
        if !self.commands.contains(&program) {
            self.commands.push(program.clone());
        }

        let mut nodes = vec![Node::Atom(Atom::Literal(program))];
        let mut index = 1;
        match self.parse_branches(&tokens, &mut index, None, errors) {
            Some(mut branches) => {
                if index < tokens.len() {
                    errors.push(UsageError::new(tokens[index].1, "unmatched group close"));
                    return;
                }
                if branches.len() == 1 {
                    nodes.append(&mut branches[0]);
                } else if !branches.is_empty() {
                    nodes.push(Node::Alternation(branches));
                }
                self.alternatives.push(nodes);
            }
            None => {}
        }
    }

    /// Parses `|`-separated sequences until the given closing token.
    ///
    /// Returns `None` after recording an error.
    fn parse_branches(
        &mut self,
        tokens: &[(LineToken, usize)],
        index: &mut usize,
        close: Option<&LineToken>,
        errors: &mut Vec<UsageError>,
    ) -> Option<Vec<Vec<Node>>> {
        let mut branches = Vec::new();
        let mut current = Vec::new();

        loop {
            match tokens.get(*index) {
                None => {
                    if let Some(_closing) = close {
                        errors.push(UsageError::new(
                            tokens.last().map(|(_, offset)| *offset).unwrap_or(0),
                            "unterminated group",
                        ));
                        return None;
                    }
                    branches.push(current);
                    return Some(branches);
                }
                Some((token, _)) => {
                    if Some(token) == close {
                        *index += 1;
                        branches.push(current);
                        return Some(branches);
                    }
                    match token {
                        LineToken::Pipe => {
                            *index += 1;
                            branches.push(std::mem::take(&mut current));
                        }
                        LineToken::CloseBracket | LineToken::CloseParen => {
                            // Let the caller report a stray close.
                            branches.push(current);
                            return Some(branches);
                        }
                        _ => {
                            let node = self.parse_term(tokens, index, errors)?;
                            current.push(node);
                        }
                    }
                }
            }
        }
    }

    /// Parses one atom and an optional trailing ellipsis.
    fn parse_term(
        &mut self,
        tokens: &[(LineToken, usize)],
        index: &mut usize,
        errors: &mut Vec<UsageError>,
    ) -> Option<Node> {
        let (token, offset) = &tokens[*index];
        let offset = *offset;

        let node = match token {
            LineToken::OpenBracket => {
                *index += 1;
                if matches!(
                    (tokens.get(*index), tokens.get(*index + 1)),
                    (Some((LineToken::Word(word), _)), Some((LineToken::CloseBracket, _)))
                        if word == "options"
                ) {
                    *index += 2;
                    Node::AnyOptions
                } else {
                    let branches =
                        self.parse_branches(tokens, index, Some(&LineToken::CloseBracket), errors)?;
                    if branches.len() == 1 {
                        Node::Optional(branches.into_iter().next().unwrap_or_default())
                    } else {
                        Node::Optional(vec![Node::Alternation(branches)])
                    }
                }
            }
            LineToken::OpenParen => {
                *index += 1;
                let branches =
                    self.parse_branches(tokens, index, Some(&LineToken::CloseParen), errors)?;
                Node::Alternation(branches)
            }
            LineToken::Word(word) => {
                *index += 1;
                let atom = self.classify_word(word, offset, errors)?;
                Node::Atom(atom)
            }
            LineToken::Ellipsis => {
                errors.push(UsageError::new(offset, "ellipsis must follow a term"));
                return None;
            }
            LineToken::Pipe | LineToken::CloseBracket | LineToken::CloseParen => {
                errors.push(UsageError::new(offset, "unexpected token in usage line"));
                return None;
            }
        };

        if matches!(tokens.get(*index), Some((LineToken::Ellipsis, _))) {
            *index += 1;
            return Some(Node::Repeat(vec![node]));
        }
        Some(node)
    }

    fn classify_word(
        &mut self,
        word: &str,
        offset: usize,
        errors: &mut Vec<UsageError>,
    ) -> Option<Atom> {
        if let Some(inner) = word.strip_prefix('<') {
            let Some(name) = inner.strip_suffix('>') else {
                errors.push(UsageError::new(offset, "variable is missing closing '>'"));
                return None;
            };
            if name.is_empty() {
                errors.push(UsageError::new(offset, "variable has no name"));
                return None;
            }
            self.variables.push(name.to_string());
            return Some(Atom::Variable(name.to_string()));
        }

        if word.starts_with('-') && word.len() > 1 && word != "--" {
            let (spelling, value) = match word.split_once('=') {
                Some((spelling, value)) => {
                    let Some(name) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>'))
                    else {
                        errors.push(UsageError::new(
                            offset,
                            "option value must be a <variable>",
                        ));
                        return None;
                    };
                    (spelling, Some(name.to_string()))
                }
                None => (word, None),
            };
            let index = self.ensure_option(spelling, value, true);
            return Some(Atom::OptionRef(index));
        }

        Some(Atom::Literal(word.to_string()))
    }

    /// Finds or creates the option with the given spelling.
    fn ensure_option(&mut self, spelling: &str, value: Option<String>, attached: bool) -> usize {
        let index = self
            .options
            .iter()
            .position(|spec| spec.spellings.iter().any(|known| known == spelling));

        let index = match index {
            Some(index) => index,
            None => {
                self.options.push(OptionSpec {
                    spellings: vec![spelling.to_string()],
                    value: None,
                    attached: false,
                });
                self.options.len() - 1
            }
        };

        if let Some(value) = value {
            let spec = &mut self.options[index];
            if spec.value.is_none() {
                self.variables.push(value.clone());
                spec.value = Some(value);
                spec.attached = attached;
            }
        }
        index
    }

    fn parse_option_line(&mut self, line: &str, base: usize, errors: &mut Vec<UsageError>) {
        let (spellings, description) = match line.find("  ") {
            Some(split) => (&line[..split], line[split..].trim()),
            None => (line, ""),
        };

        let mut spec_index = None;
        for piece in spellings.split([',', ' ']).filter(|piece| !piece.is_empty()) {
            if piece.starts_with('-') {
                let (spelling, value) = match piece.split_once('=') {
                    Some((spelling, value)) => {
                        let Some(name) =
                            value.strip_prefix('<').and_then(|v| v.strip_suffix('>'))
                        else {
                            errors.push(UsageError::new(base, "option value must be a <variable>"));
                            return;
                        };
                        (spelling, Some(name.to_string()))
                    }
                    None => (piece, None),
                };

                match spec_index {
                    None => {
                        spec_index = Some(self.ensure_option(spelling, value, true));
                    }
                    Some(index) => {
                        let known = self.options[index]
                            .spellings
                            .iter()
                            .any(|existing| existing == spelling);
                        if !known {
                            self.options[index].spellings.push(spelling.to_string());
                        }
                        if let Some(value) = value {
                            if self.options[index].value.is_none() {
                                self.variables.push(value.clone());
                                self.options[index].value = Some(value);
                                self.options[index].attached = true;
                            }
                        }
                    }
                }
            } else if let Some(name) = piece.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
                if let Some(index) = spec_index {
                    if self.options[index].value.is_none() {
                        self.variables.push(name.to_string());
                        self.options[index].value = Some(name.to_string());
                    }
                }
            } else {
                errors.push(UsageError::new(base, "malformed option line"));
                return;
            }
        }

        if description.is_empty() {
            return;
        }
        if let Some(index) = spec_index {
            for spelling in self.options[index].spellings.clone() {
                let entry = self.metadata.entry(spelling).or_default();
                if entry.description.is_empty() {
                    entry.description = description.to_string();
                }
            }
        }
    }

    fn parse_condition_line(&mut self, line: &str, base: usize, errors: &mut Vec<UsageError>) {
        let Some(close) = line.find('>') else {
            errors.push(UsageError::new(base, "variable is missing closing '>'"));
            return;
        };

        let var = &line[..=close];
        let name = &var[1..var.len() - 1];
        if name.is_empty() {
            errors.push(UsageError::new(base, "variable has no name"));
            return;
        }

        let mut command = line[close + 1..].trim().to_string();
        let mut tag = ArgumentTag::empty();
        if let Some(stripped) = command.strip_suffix("[files]") {
            command = stripped.trim_end().to_string();
            tag |= ArgumentTag::ALLOW_FILES;
        }

        if !self.variables.iter().any(|known| known == name) {
            self.variables.push(name.to_string());
        }

        let entry = self.metadata.entry(var.to_string()).or_default();
        entry.command = command;
        entry.tag |= tag;
    }

    // Simulation.

    /// Runs every start position through a node sequence.
    ///
    /// Every atom records what it would have accepted at each position it
    /// was tried at, and every produced position is added to `reached`.
    fn sim_nodes(
        &self,
        nodes: &[Node],
        argv: &[&str],
        starts: &BTreeSet<usize>,
        recorder: &mut Vec<(usize, Expected)>,
        reached: &mut BTreeSet<usize>,
    ) -> BTreeSet<usize> {
        let mut positions = starts.clone();
        for node in nodes {
            if positions.is_empty() {
                break;
            }
            positions = self.sim_node(node, argv, &positions, recorder, reached);
        }
        positions
    }

    fn sim_node(
        &self,
        node: &Node,
        argv: &[&str],
        positions: &BTreeSet<usize>,
        recorder: &mut Vec<(usize, Expected)>,
        reached: &mut BTreeSet<usize>,
    ) -> BTreeSet<usize> {
        match node {
            Node::Atom(atom) => {
                let mut next = BTreeSet::new();
                for &position in positions {
                    next.extend(self.sim_atom(atom, argv, position, recorder));
                }
                reached.extend(next.iter().copied());
                next
            }
            Node::Optional(inner) => {
                let mut next = self.sim_nodes(inner, argv, positions, recorder, reached);
                next.extend(positions.iter().copied());
                next
            }
            Node::AnyOptions => {
                let mut accumulated = positions.clone();
                loop {
                    let mut next = BTreeSet::new();
                    for &position in &accumulated {
                        for index in 0..self.options.len() {
                            next.extend(self.sim_atom(
                                &Atom::OptionRef(index),
                                argv,
                                position,
                                recorder,
                            ));
                        }
                    }
                    reached.extend(next.iter().copied());
                    if next.is_subset(&accumulated) {
                        break;
                    }
                    accumulated.extend(next);
                }
                accumulated
            }
            Node::Alternation(branches) => {
                let mut next = BTreeSet::new();
                for branch in branches {
                    next.extend(self.sim_nodes(branch, argv, positions, recorder, reached));
                }
                next
            }
            Node::Repeat(inner) => {
                let mut accumulated = self.sim_nodes(inner, argv, positions, recorder, reached);
                loop {
                    let next = self.sim_nodes(inner, argv, &accumulated, recorder, reached);
                    if next.is_subset(&accumulated) {
                        break;
                    }
                    accumulated.extend(next);
                }
                accumulated
            }
        }
    }

    fn sim_atom(
        &self,
        atom: &Atom,
        argv: &[&str],
        position: usize,
        recorder: &mut Vec<(usize, Expected)>,
    ) -> BTreeSet<usize> {
        let mut next = BTreeSet::new();
        match atom {
            Atom::Program => {
                if position < argv.len() {
                    next.insert(position + 1);
                }
            }
            Atom::Literal(word) => {
                recorder.push((position, Expected::Literal(word.clone())));
                if argv.get(position) == Some(&word.as_str()) {
                    next.insert(position + 1);
                }
            }
            Atom::Variable(name) => {
                recorder.push((position, Expected::Variable(name.clone())));
                if let Some(token) = argv.get(position) {
                    if accepts_as_value(token) {
                        next.insert(position + 1);
                    }
                }
            }
            Atom::OptionRef(index) => {
                recorder.push((position, Expected::Option(*index)));
                let spec = &self.options[*index];
                let Some(token) = argv.get(position) else {
                    return next;
                };

                let spelled = spec.spellings.iter().any(|spelling| spelling == token);
                let attached_value = spec.value.is_some()
                    && spec
                        .spellings
                        .iter()
                        .any(|spelling| token.strip_prefix(spelling.as_str())
                            .is_some_and(|rest| rest.starts_with('=')));

                if attached_value {
                    next.insert(position + 1);
                } else if spelled {
                    if spec.value.is_some() {
                        recorder.push((position + 1, Expected::OptionValue(*index)));
                        match argv.get(position + 1) {
                            Some(value) if accepts_as_value(value) => {
                                next.insert(position + 2);
                            }
                            _ => {}
                        }
                    } else {
                        next.insert(position + 1);
                    }
                }
            }
        }
        next
    }

    fn has_prefix_expectation(
        &self,
        recorder: &[(usize, Expected)],
        position: usize,
        arg: &str,
    ) -> bool {
        recorder
            .iter()
            .filter(|(recorded, _)| *recorded == position)
            .any(|(_, expected)| match expected {
                Expected::Literal(word) => word.starts_with(arg) && word != arg,
                Expected::Option(index) => self.options[*index]
                    .spellings
                    .iter()
                    .any(|spelling| spelling.starts_with(arg) && spelling != arg),
                Expected::Variable(_) | Expected::OptionValue(_) => false,
            })
    }

    fn expected_to_suggestions(&self, expected: &Expected) -> Vec<Suggestion> {
        match expected {
            Expected::Literal(word) => {
                vec![self.suggestion_for(word.clone(), word)]
            }
            Expected::Variable(name) => {
                let token = format!("<{name}>");
                vec![self.suggestion_for(token.clone(), &token)]
            }
            Expected::Option(index) => {
                let spec = &self.options[*index];
                spec.spellings
                    .iter()
                    .map(|spelling| self.suggestion_for(spec.suggestion_token(spelling), spelling))
                    .collect()
            }
            Expected::OptionValue(index) => {
                let spec = &self.options[*index];
                let Some(name) = &spec.value else {
                    return Vec::new();
                };
                let token = format!("<{name}>");
                let key = if self.metadata.contains_key(&token) {
                    token.clone()
                } else {
                    spec.canonical().to_string()
                };
                vec![self.suggestion_for(token, &key)]
            }
        }
    }

    fn suggestion_for(&self, token: String, metadata_key: &str) -> Suggestion {
        let metadata = self.metadata.get(metadata_key).cloned().unwrap_or_default();
        let mut tag = metadata.tag;
        if token.starts_with('<') && metadata.command.is_empty() {
            tag |= ArgumentTag::ALLOW_FILES;
        }
        Suggestion {
            token,
            command: metadata.command,
            condition: metadata.condition,
            description: metadata.description,
            tag,
        }
    }

    // Value capture.

    fn dfs_nodes(&self, nodes: &[Node], argv: &[&str], states: Vec<ParseState>) -> Vec<ParseState> {
        let mut states = states;
        for node in nodes {
            if states.is_empty() {
                break;
            }
            states = self.dfs_node(node, argv, states);
            dedup_states(&mut states);
        }
        states
    }

    fn dfs_node(&self, node: &Node, argv: &[&str], states: Vec<ParseState>) -> Vec<ParseState> {
        match node {
            Node::Atom(atom) => states
                .iter()
                .flat_map(|state| self.dfs_atom(atom, argv, state))
                .collect(),
            Node::Optional(inner) => {
                let mut next = self.dfs_nodes(inner, argv, states.clone());
                next.extend(states);
                next
            }
            Node::AnyOptions => {
                let mut accumulated = states;
                loop {
                    let mut next = Vec::new();
                    for state in &accumulated {
                        for index in 0..self.options.len() {
                            next.extend(self.dfs_atom(&Atom::OptionRef(index), argv, state));
                        }
                    }
                    let before = accumulated.len();
                    accumulated.extend(next);
                    dedup_states(&mut accumulated);
                    if accumulated.len() == before {
                        break;
                    }
                }
                accumulated
            }
            Node::Alternation(branches) => branches
                .iter()
                .flat_map(|branch| self.dfs_nodes(branch, argv, states.clone()))
                .collect(),
            Node::Repeat(inner) => {
                let mut accumulated = self.dfs_nodes(inner, argv, states);
                loop {
                    let next = self.dfs_nodes(inner, argv, accumulated.clone());
                    let before = accumulated.len();
                    accumulated.extend(next);
                    dedup_states(&mut accumulated);
                    if accumulated.len() == before {
                        break;
                    }
                }
                accumulated
            }
        }
    }

    fn dfs_atom(&self, atom: &Atom, argv: &[&str], state: &ParseState) -> Vec<ParseState> {
        let position = state.pos;
        let Some(token) = argv.get(position) else {
            return Vec::new();
        };

        match atom {
            Atom::Program => {
                let mut next = state.clone();
                next.pos += 1;
                next.count(token);
                vec![next]
            }
            Atom::Literal(word) => {
                if token != word {
                    return Vec::new();
                }
                let mut next = state.clone();
                next.pos += 1;
                next.count(word);
                vec![next]
            }
            Atom::Variable(name) => {
                if !accepts_as_value(token) {
                    return Vec::new();
                }
                let mut next = state.clone();
                next.pos += 1;
                next.capture(&format!("<{name}>"), token);
                vec![next]
            }
            Atom::OptionRef(index) => {
                let spec = &self.options[*index];

                if let Some(value) = spec.value.as_ref() {
                    let attached = spec.spellings.iter().find_map(|spelling| {
                        token
                            .strip_prefix(spelling.as_str())
                            .and_then(|rest| rest.strip_prefix('='))
                    });
                    if let Some(attached) = attached {
                        let mut next = state.clone();
                        next.pos += 1;
                        next.count(spec.canonical());
                        next.capture(&format!("<{value}>"), attached);
                        return vec![next];
                    }
                }

                if !spec.spellings.iter().any(|spelling| spelling == token) {
                    return Vec::new();
                }

                let mut next = state.clone();
                next.pos += 1;
                next.count(spec.canonical());

                if let Some(value) = spec.value.as_ref() {
                    match argv.get(position + 1) {
                        Some(word) if accepts_as_value(word) => {
                            next.pos += 1;
                            next.capture(&format!("<{value}>"), word);
                        }
                        _ => {}
                    }
                }
                vec![next]
            }
        }
    }
}

/// A partial parse: how far into argv we are, and what has been captured.
#[derive(Debug, Clone, Default)]
struct ParseState {
    pos: usize,
    values: BTreeMap<String, ParsedValue>,
}

impl ParseState {
    fn count(&mut self, key: &str) {
        self.values.entry(key.to_string()).or_default().count += 1;
    }

    fn capture(&mut self, key: &str, value: &str) {
        let entry = self.values.entry(key.to_string()).or_default();
        entry.values.push(value.to_string());
        entry.count += 1;
    }
}

/// Keeps one state per position, preferring the earliest-found.
fn dedup_states(states: &mut Vec<ParseState>) {
    let mut seen = BTreeSet::new();
    states.retain(|state| seen.insert(state.pos));
    states.truncate(64);
}

/// Whether a token may be consumed as a variable or option value.
fn accepts_as_value(token: &str) -> bool {
    !token.starts_with('-') || token.len() <= 1
}

#[derive(Debug, Clone, PartialEq)]
enum LineToken {
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,
    Pipe,
    Ellipsis,
    Word(String),
}

/// Splits one usage line into tokens with byte offsets.
fn tokenize_usage_line(line: &str, base: usize) -> Vec<(LineToken, usize)> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let token = match ch {
            '[' => Some(LineToken::OpenBracket),
            ']' => Some(LineToken::CloseBracket),
            '(' => Some(LineToken::OpenParen),
            ')' => Some(LineToken::CloseParen),
            '|' => Some(LineToken::Pipe),
            ch if ch.is_whitespace() => None,
            _ => {
                let mut end = start + ch.len_utf8();
                while let Some((pos, next)) = chars.peek().copied() {
                    if next.is_whitespace() || matches!(next, '[' | ']' | '(' | ')' | '|') {
                        break;
                    }
                    end = pos + next.len_utf8();
                    chars.next();
                }
                let word = &line[start..end];

                if word == "..." {
                    Some(LineToken::Ellipsis)
                } else if let Some(stem) = word.strip_suffix("...") {
                    tokens.push((LineToken::Word(stem.to_string()), base + start));
                    Some(LineToken::Ellipsis)
                } else {
                    Some(LineToken::Word(word.to_string()))
                }
            }
        };

        if let Some(token) = token {
            tokens.push((token, base + start));
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    fn tokens(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.token.as_str()).collect()
    }

    #[test]
    fn it_parses_a_minimal_usage() {
        let parser = UsageParser::from_usage("Usage:\n  foo --bar").unwrap();
        assert_eq!(parser.command_names(), vec!["foo"]);
        assert_eq!(
            tokens(&parser.suggest_next_argument(&argv(&["foo"]))),
            vec!["--bar"]
        );
    }

    #[test]
    fn it_rejects_usage_without_usage_lines() {
        let errors = UsageParser::from_usage("Options:\n  -h  Help").unwrap_err();
        assert_eq!(errors[0].offset, 0);
    }

    #[test]
    fn it_reports_offsets_for_malformed_variables() {
        let errors = UsageParser::from_usage("Usage:\n  foo <bar").unwrap_err();
        assert_eq!(errors[0].offset, 13);
        assert!(errors[0].message.contains("closing"));
    }

    #[test]
    fn it_collects_multiple_command_names() {
        let parser = UsageParser::from_usage("Usage:\n  foo add\n  bar remove").unwrap();
        assert_eq!(parser.command_names(), vec!["foo", "bar"]);
    }

    #[test]
    fn it_suggests_subcommands_and_options() {
        let parser =
            UsageParser::from_usage("Usage:\n  tool add <name>\n  tool remove [--force]").unwrap();

        let first = parser.suggest_next_argument(&argv(&["tool"]));
        assert_eq!(tokens(&first), vec!["add", "remove"]);

        let after_add = parser.suggest_next_argument(&argv(&["tool", "add"]));
        assert_eq!(tokens(&after_add), vec!["<name>"]);

        let after_remove = parser.suggest_next_argument(&argv(&["tool", "remove"]));
        assert_eq!(tokens(&after_remove), vec!["--force"]);
    }

    #[test]
    fn it_suggests_attached_option_values() {
        let parser = UsageParser::from_usage("Usage:\n  foo --opt=<file>").unwrap();
        let suggestions = parser.suggest_next_argument(&argv(&["foo"]));
        assert_eq!(tokens(&suggestions), vec!["--opt="]);
    }

    #[test]
    fn it_suggests_the_value_after_a_separated_option() {
        let parser =
            UsageParser::from_usage("Usage:\n  foo [options]\nOptions:\n  -o <file>  Output")
                .unwrap();
        let suggestions = parser.suggest_next_argument(&argv(&["foo", "-o"]));
        assert_eq!(tokens(&suggestions), vec!["<file>"]);
    }

    #[test]
    fn it_reads_option_descriptions() {
        let parser = UsageParser::from_usage(
            "Usage:\n  foo [options]\nOptions:\n  -f, --force  Force the operation",
        )
        .unwrap();
        assert_eq!(
            parser.description_for_option("--force"),
            Some("Force the operation")
        );
        assert_eq!(
            parser.description_for_option("-f"),
            Some("Force the operation")
        );
    }

    #[test]
    fn it_reads_condition_commands_for_variables() {
        let parser = UsageParser::from_usage(
            "Usage:\n  kill <pid>\nConditions:\n  <pid>  list-processes --ids",
        )
        .unwrap();
        assert_eq!(
            parser.command_for_variable("<pid>"),
            Some("list-processes --ids")
        );

        let suggestions = parser.suggest_next_argument(&argv(&["kill"]));
        assert_eq!(suggestions[0].command, "list-processes --ids");
        assert!(!suggestions[0].tag.contains(ArgumentTag::ALLOW_FILES));
    }

    #[test]
    fn it_allows_files_for_plain_variables() {
        let parser = UsageParser::from_usage("Usage:\n  edit <file>").unwrap();
        let suggestions = parser.suggest_next_argument(&argv(&["edit"]));
        assert!(suggestions[0].tag.contains(ArgumentTag::ALLOW_FILES));
    }

    #[test]
    fn it_validates_arguments() {
        let parser = UsageParser::from_usage("Usage:\n  tool add <name>").unwrap();

        let statuses = parser.validate_arguments(&argv(&["tool", "add", "thing"]));
        assert_eq!(
            statuses,
            vec![
                ArgumentStatus::Valid,
                ArgumentStatus::Valid,
                ArgumentStatus::Valid
            ]
        );

        let statuses = parser.validate_arguments(&argv(&["tool", "ad"]));
        assert_eq!(
            statuses,
            vec![ArgumentStatus::Valid, ArgumentStatus::ValidPrefix]
        );

        let statuses = parser.validate_arguments(&argv(&["tool", "zap"]));
        assert_eq!(
            statuses,
            vec![ArgumentStatus::Valid, ArgumentStatus::Invalid]
        );
    }

    #[test]
    fn it_parses_arguments_into_values_and_counts() {
        let parser =
            UsageParser::from_usage("Usage:\n  tool add <name> [--force]").unwrap();
        let parsed = parser.parse_arguments(&argv(&["tool", "add", "widget", "--force"]));

        assert_eq!(parsed.values["add"].count, 1);
        assert_eq!(parsed.values["<name>"].values, vec!["widget"]);
        assert_eq!(parsed.values["--force"].count, 1);
        assert!(parsed.unused.is_empty());
    }

    #[test]
    fn it_reports_unused_arguments() {
        let parser = UsageParser::from_usage("Usage:\n  tool add").unwrap();
        let parsed = parser.parse_arguments(&argv(&["tool", "add", "extra", "words"]));
        assert_eq!(parsed.unused, vec![2, 3]);
    }

    #[test]
    fn it_repeats_terms_with_ellipsis() {
        let parser = UsageParser::from_usage("Usage:\n  sum <n>...").unwrap();
        let parsed = parser.parse_arguments(&argv(&["sum", "1", "2", "3"]));
        assert_eq!(parsed.values["<n>"].values, vec!["1", "2", "3"]);
    }

    #[test]
    fn it_builds_a_parser_from_direct_options() {
        let mut force = AnnotatedOption::new(OptionForm::DoubleLong, "force");
        force.metadata.description = "Force it".to_string();
        let mut output = AnnotatedOption::new(OptionForm::Short, "o");
        output.value_var = Some("1".to_string());
        output.metadata.command = "list-outputs".to_string();

        let parser = UsageParser::from_options(&[force, output]);

        let suggestions = parser.suggest_next_argument(&argv(&["anything"]));
        assert_eq!(tokens(&suggestions), vec!["--force", "-o"]);
        assert_eq!(suggestions[0].description, "Force it");

        let after_option = parser.suggest_next_argument(&argv(&["anything", "-o"]));
        assert_eq!(tokens(&after_option), vec!["<1>"]);
        assert_eq!(after_option[0].command, "list-outputs");
    }

    #[test]
    fn it_matches_any_command_word_for_direct_options() {
        let option = AnnotatedOption::new(OptionForm::DoubleLong, "bar");
        let parser = UsageParser::from_options(&[option]);
        let parsed = parser.parse_arguments(&argv(&["whatever", "--bar"]));
        assert_eq!(parsed.values["--bar"].count, 1);
    }
}
