//! Shell command splitting for permission checks
//!
//! Commands are parsed with the tree-sitter bash grammar. Each simple
//! command becomes one subcommand with its redirections removed; constructs
//! that make a command unsafe to approve by rule alone are recorded along
//! the way. Input the grammar rejects falls back to a quote-aware split.

use std::sync::{Mutex, OnceLock, PoisonError};

use tree_sitter::{Node, Parser};

/// A command line broken into subcommands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCommand {
    /// Subcommands with redirections removed
    pub subcommands: Vec<String>,
    /// Output redirected to a file other than `/dev/null`
    pub has_file_redirect: bool,
    /// A heredoc or here-string is present
    pub has_heredoc: bool,
    /// Command or process substitution, or parameter expansion
    pub has_substitution: bool,
    /// The bash grammar rejected the command
    pub unparsed: bool,
}

impl ParsedCommand {
    /// Whether the command needs more than rule matching to approve
    pub fn is_unsafe(&self) -> bool {
        self.has_file_redirect || self.has_heredoc || self.has_substitution || self.unparsed
    }
}

static BASH_PARSER: OnceLock<Option<Mutex<Parser>>> = OnceLock::new();

fn bash_parser() -> Option<&'static Mutex<Parser>> {
    BASH_PARSER
        .get_or_init(|| {
            let mut parser = Parser::new();
            let language: tree_sitter::Language = tree_sitter_bash::LANGUAGE.into();
            match parser.set_language(&language) {
                Ok(()) => Some(Mutex::new(parser)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load the bash grammar");
                    None
                }
            }
        })
        .as_ref()
}

/// Split a command line and classify its unsafe constructs
pub fn parse_command(command: &str) -> ParsedCommand {
    match parse_with_tree_sitter(command) {
        Some(parsed) => parsed,
        None => {
            tracing::debug!(command, "Bash grammar rejected command, using basic split");
            parse_with_basic_split(command)
        }
    }
}

fn parse_with_tree_sitter(command: &str) -> Option<ParsedCommand> {
    let tree = bash_parser()?
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .parse(command, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let mut walker = Walker {
        source: command.as_bytes(),
        out: ParsedCommand::default(),
    };
    walker.visit(root);
    Some(walker.out)
}

struct Walker<'a> {
    source: &'a [u8],
    out: ParsedCommand,
}

impl Walker<'_> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "command" | "declaration_command" | "unset_command" | "test_command" => {
                self.simple_command(node)
            }
            "variable_assignment" | "variable_assignments" => {
                self.flag_substitutions(node);
                let text = self.text(node);
                self.out.subcommands.push(text.trim().to_string());
            }
            "file_redirect" => self.file_redirect(node),
            "heredoc_redirect" | "herestring_redirect" => {
                self.out.has_heredoc = true;
                self.nested(node);
            }
            "command_substitution" | "process_substitution" | "expansion" => {
                self.out.has_substitution = true;
            }
            "heredoc_body" | "heredoc_start" | "heredoc_end" | "comment" => {}
            _ => self.nested(node),
        }
    }

    fn nested(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    /// One subcommand from the words of `node`; redirections are classified
    /// and left out of the text
    fn simple_command(&mut self, node: Node) {
        let mut words = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        if children.is_empty() {
            words.push(self.text(node));
        }
        for child in children {
            match child.kind() {
                "file_redirect" | "heredoc_redirect" | "herestring_redirect" => self.visit(child),
                _ => {
                    self.flag_substitutions(child);
                    words.push(self.text(child));
                }
            }
        }

        let sub = words.join(" ");
        let sub = sub.trim();
        if !sub.is_empty() {
            self.out.subcommands.push(sub.to_string());
        }
    }

    fn flag_substitutions(&mut self, node: Node) {
        if matches!(
            node.kind(),
            "command_substitution" | "process_substitution" | "expansion"
        ) {
            self.out.has_substitution = true;
            return;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.flag_substitutions(child);
        }
    }

    fn file_redirect(&mut self, node: Node) {
        let mut op = String::new();
        let mut target = String::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            if !child.is_named() {
                op.push_str(child.kind());
            } else if child.kind() != "file_descriptor" {
                self.flag_substitutions(child);
                target = self.text(child);
            }
        }

        let target = target.trim_matches(|c| c == '"' || c == '\'');
        let duplicates_fd = op.contains('&')
            && !op.starts_with('&')
            && (target.is_empty() || target == "-" || target.chars().all(|c| c.is_ascii_digit()));
        let reads_only = op.starts_with('<') && op != "<>";
        if duplicates_fd || reads_only || target == "/dev/null" {
            return;
        }
        self.out.has_file_redirect = true;
    }
}

/// Quote-aware split on control operators; pieces are re-quoted by `shell-words`
fn parse_with_basic_split(command: &str) -> ParsedCommand {
    let mut out = ParsedCommand {
        unparsed: true,
        ..Default::default()
    };
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in command.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', q) if q != Some('\'') => {
                escaped = true;
                current.push(c);
            }
            ('\'' | '"', None) => {
                quote = Some(c);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            ('&' | '|' | ';' | '\n', None) => flush_piece(&mut current, &mut out),
            _ => current.push(c),
        }
    }
    flush_piece(&mut current, &mut out);
    out
}

fn flush_piece(current: &mut String, out: &mut ParsedCommand) {
    let piece = current.trim();
    if !piece.is_empty() {
        let sub = match shell_words::split(piece) {
            Ok(words) => shell_words::join(words),
            Err(_) => piece.to_string(),
        };
        out.subcommands.push(sub);
    }
    current.clear();
}

/// Whether a subcommand is a `cd` invocation
pub fn is_cd_command(subcommand: &str) -> bool {
    subcommand == "cd" || subcommand.starts_with("cd ")
}
