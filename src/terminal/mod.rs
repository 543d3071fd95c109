//! Access to terminal multiplexer panes.
//! [Multiplexer] is the contract the terminal tracker works against, [tmux::TmuxMultiplexer] is
//! the implementation backed by the `tmux` binary.

pub mod tmux;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Which part of a pane is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Only what is currently on the screen
    Visible,
    /// The whole scrollback history
    FullScrollback,
}

/// Raised when the multiplexer itself can't be reached, as opposed to a single pane failing.
#[derive(Error, Debug)]
#[error("terminal multiplexer is not available: {0}")]
pub struct MultiplexerUnavailable(pub String);

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Identifiers (`session:window.pane`) of every live pane.
    async fn list_panes(&self) -> Result<Vec<Arc<str>>>;

    /// Current text of a pane.
    async fn capture_pane(&self, pane: &str, mode: CaptureMode) -> Result<String>;
}

/// Checks that `value` looks like `session:window.pane` with numeric window and pane indexes.
pub fn is_valid_pane_id(value: &str) -> bool {
    let Some((session, position)) = value.rsplit_once(':') else {
        return false;
    };
    let Some((window, pane)) = position.split_once('.') else {
        return false;
    };
    let is_index = |v: &str| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit());
    !session.is_empty() && is_index(window) && is_index(pane)
}
