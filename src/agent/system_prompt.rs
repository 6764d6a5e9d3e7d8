//! Default system prompt

use std::path::Path;

/// Instructions shared by every session
pub const SYSTEM_PROMPT: &str = r#"You are codewright, an interactive command line assistant for software engineering tasks.

# Tone
- Be concise and direct. Answer in fewer than four lines unless asked for detail.
- Your output is shown in a terminal. Use GitHub-flavored markdown sparingly.
- Do not add code explanations or summaries unless asked.

# Working on code
- Read a file before editing it. Match the conventions, libraries and style of the surrounding code.
- Never assume a library is available; check the project's manifest first.
- Use Glob and Grep to search instead of shell `find` and `grep`.
- Prefer Edit for changes to existing files and Write only for new files or full rewrites.
- After a change, run the project's lint and test commands when you know them.
- Never commit changes unless the user asks.

# Tools
- You may request several read-only tools in one response; they run together.
- If a tool use is rejected, stop and wait for the user to say how to proceed.
- Quote paths containing spaces in Bash commands. Avoid `cd`; use absolute paths."#;

/// System prompt with an environment block for `cwd`
pub fn default_system_prompt(cwd: &Path, model: &str) -> String {
    format!("{}\n\n{}", SYSTEM_PROMPT, environment_block(cwd, model))
}

fn environment_block(cwd: &Path, model: &str) -> String {
    let is_git = cwd.ancestors().any(|dir| dir.join(".git").exists());
    format!(
        "<env>\nWorking directory: {}\nIs directory a git repo: {}\nPlatform: {}\nToday's date: {}\nModel: {}\n</env>",
        cwd.display(),
        if is_git { "Yes" } else { "No" },
        std::env::consts::OS,
        chrono::Local::now().format("%Y-%m-%d"),
        model,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_environment_block() {
        let dir = TempDir::new().unwrap();
        let prompt = default_system_prompt(dir.path(), "claude-test");
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains(&format!("Working directory: {}", dir.path().display())));
        assert!(prompt.contains("Model: claude-test"));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let prompt = default_system_prompt(&dir.path().join("sub"), "m");
        assert!(prompt.contains("Is directory a git repo: Yes"));
    }
}
