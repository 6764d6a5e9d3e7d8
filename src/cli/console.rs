//! Terminal output with colored formatting

use colored::*;
use serde_json::Value;
use std::io::{self, Write};

use crate::permissions::{PermissionMode, RuleBehavior, RuleDuration, StoredRule};
use crate::tools::ToolResult;

/// Lines of tool output shown before eliding the rest
const TOOL_OUTPUT_LINES: usize = 8;
const TOOL_OUTPUT_LINE_CHARS: usize = 160;

/// A `/command` typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Compact,
    Permissions,
    Help,
    Exit,
    Unknown(String),
}

impl SlashCommand {
    /// `None` when the line is an ordinary prompt
    pub fn parse(line: &str) -> Option<Self> {
        let command = line.trim().strip_prefix('/')?;
        let name = command.split_whitespace().next().unwrap_or_default();
        Some(match name {
            "compact" => SlashCommand::Compact,
            "permissions" => SlashCommand::Permissions,
            "help" => SlashCommand::Help,
            "exit" | "quit" => SlashCommand::Exit,
            other => SlashCommand::Unknown(other.to_string()),
        })
    }
}

/// Short description of a tool call for the tool line
pub fn summarize_input(tool_name: &str, input: &Value) -> String {
    let field = |name: &str| input.get(name).and_then(Value::as_str);
    let summary = match tool_name {
        "Bash" => field("command"),
        "Read" | "Write" | "Edit" => field("file_path"),
        "NotebookEdit" => field("notebook_path"),
        "Glob" | "Grep" => field("pattern"),
        _ => None,
    };
    match summary {
        Some(s) => s.lines().next().unwrap_or_default().to_string(),
        None => serde_json::to_string(input).unwrap_or_default(),
    }
}

/// First lines of tool output, each cut to a readable width
pub fn preview_output(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let mut preview: Vec<String> = lines
        .iter()
        .take(TOOL_OUTPUT_LINES)
        .map(|line| {
            if line.chars().count() > TOOL_OUTPUT_LINE_CHARS {
                let cut: String = line.chars().take(TOOL_OUTPUT_LINE_CHARS).collect();
                format!("{}…", cut)
            } else {
                line.to_string()
            }
        })
        .collect();
    if lines.len() > TOOL_OUTPUT_LINES {
        preview.push(format!("… +{} lines", lines.len() - TOOL_OUTPUT_LINES));
    }
    preview.join("\n")
}

/// Console handles all terminal output
pub struct Console {
    user_color: Color,
    assistant_color: Color,
    tool_color: Color,
}

impl Console {
    pub fn new() -> Self {
        Self {
            user_color: Color::Cyan,
            assistant_color: Color::White,
            tool_color: Color::Magenta,
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }

    pub fn print_banner(&self, model: &str, cwd: &str) {
        println!("{}", "codewright".bright_blue().bold());
        println!("{}", format!("model: {}  cwd: {}", model, cwd).bright_black());
        println!(
            "{}",
            "/help for commands, Ctrl-C interrupts the running turn".bright_black()
        );
        println!();
    }

    pub fn print_prompt(&self) {
        print!("{} ", ">".color(self.user_color).bold());
        self.flush();
    }

    pub fn print_assistant_chunk(&self, chunk: &str) {
        print!("{}", chunk.color(self.assistant_color));
        self.flush();
    }

    pub fn print_thinking_chunk(&self, chunk: &str) {
        print!("{}", chunk.bright_black().italic());
        self.flush();
    }

    pub fn println(&self) {
        println!();
    }

    pub fn print_tool_start(&self, tool_name: &str, input: &Value) {
        println!(
            "{} {}",
            format!("● {}", tool_name).color(self.tool_color).bold(),
            format!("({})", summarize_input(tool_name, input)).bright_black()
        );
    }

    pub fn print_tool_result(&self, result: &ToolResult) {
        let preview = preview_output(&result.output);
        for line in preview.lines() {
            if result.is_error {
                println!("  {} {}", "⎿".red(), line.red());
            } else {
                println!("  {} {}", "⎿".bright_black(), line.bright_black());
            }
        }
    }

    pub fn print_status(&self, message: &str) {
        println!("{}", message.yellow());
    }

    pub fn print_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }

    pub fn print_block(&self, text: &str) {
        println!("{}", text);
    }

    pub fn print_answer_prompt(&self) {
        print!("{} ", "Your choice (y/s/a/n):".yellow().bold());
        self.flush();
    }

    pub fn print_rules(&self, mode: PermissionMode, rules: &[StoredRule]) {
        println!("{} {}", "Permission mode:".bold(), mode);
        if rules.is_empty() {
            println!("{}", "No permission rules".bright_black());
            return;
        }
        for stored in rules {
            let behavior = match stored.behavior {
                RuleBehavior::Allow => "allow".green(),
                RuleBehavior::Deny => "deny".red(),
                RuleBehavior::Ask => "ask".yellow(),
            };
            let duration = match stored.duration {
                RuleDuration::Temporary => "session",
                RuleDuration::Permanent => "saved",
            };
            println!("  {:<5} {} {}", behavior, stored.rule, format!("({})", duration).bright_black());
        }
    }

    pub fn print_help(&self) {
        println!("{}", "Commands:".bold());
        println!("  /compact      Summarize the conversation to free context");
        println!("  /permissions  Show the permission mode and rules");
        println!("  /exit         Quit");
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
