//! Best effort extraction of the last command typed into a shell pane.

use std::sync::LazyLock;

use regex::Regex;

/// Characters shells commonly end their prompt with.
const PROMPT_ENDINGS: [char; 11] = ['$', '%', '>', '❯', '➜', '✗', '✓', '→', '»', '⟩', '#'];

/// Characters after which fancy prompts put the command.
const PROMPT_SEPARATORS: [char; 5] = ['❯', '➜', '→', '»', '⟩'];

/// Commands that say nothing about what the user works on.
const BORING_COMMANDS: [&str; 7] = ["ls", "cd", "pwd", "echo", "cat", "clear", "history"];

const MAX_COMMAND_WORDS: usize = 10;

static DOLLAR_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^$]*\$\s*(.+)$").expect("prompt pattern is valid"));

/// Whether the pane sits at an idle prompt, meaning the previous command finished.
pub fn is_at_prompt(content: &str) -> bool {
    content
        .trim()
        .lines()
        .last()
        .map(|v| v.trim_end().ends_with(PROMPT_ENDINGS))
        .unwrap_or(false)
}

pub fn is_interesting_command(command: &str) -> bool {
    let words = command.split_whitespace().collect::<Vec<_>>();
    match words.first() {
        Some(first) => words.len() <= MAX_COMMAND_WORDS && !BORING_COMMANDS.contains(first),
        None => false,
    }
}

fn command_on_line(line: &str) -> Option<String> {
    let candidates = [
        DOLLAR_PROMPT
            .captures(line)
            .and_then(|v| v.get(1))
            .map(|v| v.as_str()),
        line.split_once(PROMPT_SEPARATORS).map(|(_, rest)| rest),
        line.strip_prefix(">>> "),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| is_interesting_command(v))
        .map(str::to_string)
}

/// Most recent finished and interesting command visible in the pane.
pub fn last_command(content: &str) -> Option<String> {
    if !is_at_prompt(content) {
        return None;
    }
    let lines = content.trim().lines().collect::<Vec<_>>();
    if lines.len() < 2 {
        return None;
    }
    lines[..lines.len() - 1]
        .iter()
        .rev()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .find_map(command_on_line)
}
