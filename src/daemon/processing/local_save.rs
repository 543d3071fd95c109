use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, error, warn};

use crate::daemon::storage::{
    entities::{CaptureRecord, ChangeRecord, TickEvent},
    record_log::{EvidenceLogs, RecordLog},
};

use super::module::EventProcessor;

/// Consecutive failed writes after which failures are reported as errors.
const ESCALATION_THRESHOLD: usize = 3;

/// Represents saving module. Saving module main goal is to bridge
/// [ProcessingModule](super::ProcessingModule) and the evidence logs.
/// Records that couldn't be written stay pending and are written with the next tick, so a failing
/// disk delays evidence instead of dropping it.
pub struct LocalSaver<C, P> {
    logs: Arc<EvidenceLogs<C, P>>,
    pending_changes: Vec<ChangeRecord>,
    pending_captures: Vec<CaptureRecord>,
    consecutive_failures: usize,
}

impl<C, P> LocalSaver<C, P>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
{
    pub fn new(logs: Arc<EvidenceLogs<C, P>>) -> Self {
        Self {
            logs,
            pending_changes: vec![],
            pending_captures: vec![],
            consecutive_failures: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending_changes.len() + self.pending_captures.len()
    }

    async fn flush(&mut self) -> Result<()> {
        let mut failure = None;

        if !self.pending_changes.is_empty() {
            match self.logs.changes.append(self.pending_changes.clone()).await {
                Ok(()) => self.pending_changes.clear(),
                Err(e) => failure = Some(e.context("writing change log")),
            }
        }
        if !self.pending_captures.is_empty() {
            match self.logs.captures.append(self.pending_captures.clone()).await {
                Ok(()) => self.pending_captures.clear(),
                Err(e) => failure = Some(e.context("writing capture log")),
            }
        }

        match failure {
            None => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Some(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= ESCALATION_THRESHOLD {
                    error!(
                        "Evidence couldn't be persisted {} times in a row, {} records pending: {e:?}",
                        self.consecutive_failures,
                        self.pending()
                    );
                } else {
                    warn!("Evidence couldn't be persisted, retrying next tick: {e:?}");
                }
                Err(e)
            }
        }
    }
}

impl<C, P> EventProcessor for LocalSaver<C, P>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
{
    async fn process_next(&mut self, message: TickEvent) -> Result<()> {
        self.pending_changes.extend(message.changes);
        self.pending_captures.extend(message.captures);
        if self.pending() == 0 {
            return Ok(());
        }
        debug!("Persisting {} records", self.pending());
        self.flush().await
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.pending() == 0 {
            return Ok(());
        }
        self.flush()
            .await
            .map_err(|e| anyhow!("{} records were lost on shutdown: {e}", self.pending()))
    }
}
