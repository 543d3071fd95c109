//! Daemon that watches what you do during the day (file changes in chosen directories and the
//! contents of tmux panes) and once a day asks an LLM to turn it into a short markdown report.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod evidence;
pub mod fs;
pub mod llm;
pub mod similarity;
pub mod terminal;
pub mod utils;
