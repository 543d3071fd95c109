use std::{io::ErrorKind, process::Stdio, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::instrument;

use super::{CaptureMode, Multiplexer, MultiplexerUnavailable};

const PANE_FORMAT: &str = "#{session_name}:#{window_index}.#{pane_index}";

/// [Multiplexer] backed by the `tmux` command line client.
pub struct TmuxMultiplexer {
    program: String,
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self {
            program: "tmux".into(),
        }
    }
}

impl TmuxMultiplexer {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    anyhow!(MultiplexerUnavailable(format!("{} not found", self.program)))
                }
                _ => anyhow!(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // tmux reports a missing server on stderr with a failed status
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Err(MultiplexerUnavailable(stderr).into());
            }
            return Err(anyhow!("{} {:?} failed: {stderr}", self.program, args));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn capture_arguments(pane: &str, mode: CaptureMode) -> Vec<&str> {
    let mut args = vec!["capture-pane", "-p", "-t", pane];
    if mode == CaptureMode::FullScrollback {
        args.extend(["-S", "-", "-J"]);
    }
    args
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    #[instrument(skip(self))]
    async fn list_panes(&self) -> Result<Vec<Arc<str>>> {
        let output = self.run(&["list-panes", "-a", "-F", PANE_FORMAT]).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Arc::from)
            .collect())
    }

    #[instrument(skip(self))]
    async fn capture_pane(&self, pane: &str, mode: CaptureMode) -> Result<String> {
        self.run(&capture_arguments(pane, mode)).await
    }
}
