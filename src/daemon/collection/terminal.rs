use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::TerminalConfig,
    daemon::storage::entities::CaptureRecord,
    similarity::similarity,
    terminal::{CaptureMode, Multiplexer, MultiplexerUnavailable},
};

use super::prompt::last_command;

/// Captures at least this similar to the previous one of the same pane are dropped.
pub const DUPLICATE_THRESHOLD: f64 = 0.95;

/// Periodically captures panes and keeps those that changed meaningfully. Owns the cache of the
/// last retained capture per pane.
pub struct TerminalTracker {
    multiplexer: Box<dyn Multiplexer>,
    panes: Vec<Arc<str>>,
    mode: CaptureMode,
    last_retained: HashMap<Arc<str>, Arc<str>>,
    unavailable: bool,
}

impl TerminalTracker {
    pub fn new(multiplexer: Box<dyn Multiplexer>, config: &TerminalConfig) -> Self {
        Self {
            multiplexer,
            panes: config.panes.iter().map(|v| Arc::from(v.as_str())).collect(),
            mode: config.capture_mode,
            last_retained: HashMap::new(),
            unavailable: false,
        }
    }

    /// Restores the duplicate cache from already persisted captures, so a restart doesn't record
    /// every pane again.
    pub fn seed(&mut self, records: &[CaptureRecord]) {
        for record in records {
            self.last_retained
                .insert(record.pane_id.clone(), record.content.clone());
        }
    }

    /// Checks the multiplexer error and reports it once until it recovers.
    fn handle_error(&mut self, context: &str, error: anyhow::Error) {
        if error.downcast_ref::<MultiplexerUnavailable>().is_some() {
            if !self.unavailable {
                warn!("Terminal capture disabled until the multiplexer is back: {error}");
                self.unavailable = true;
            }
        } else {
            debug!("{context}: {error:?}");
        }
    }

    async fn targets(&mut self) -> Result<Vec<Arc<str>>> {
        if !self.panes.is_empty() {
            return Ok(self.panes.clone());
        }
        let live = self.multiplexer.list_panes().await?;
        // Forget panes that disappeared
        self.last_retained.retain(|pane, _| live.contains(pane));
        Ok(live)
    }

    /// Captures every target pane. Never fails, an unreachable multiplexer simply yields nothing.
    #[instrument(skip(self))]
    pub async fn capture(&mut self, moment: DateTime<Utc>) -> Vec<CaptureRecord> {
        let targets = match self.targets().await {
            Ok(v) => v,
            Err(e) => {
                self.handle_error("Couldn't list panes", e);
                return vec![];
            }
        };

        let mode = self.mode;
        let multiplexer = &self.multiplexer;
        let captures = join_all(
            targets
                .iter()
                .map(|pane| async move { multiplexer.capture_pane(pane, mode).await }),
        )
        .await;

        let mut records = vec![];
        let mut reachable = false;
        for (pane, capture) in targets.into_iter().zip(captures) {
            let content = match capture {
                Ok(v) => v,
                Err(e) => {
                    self.handle_error(&format!("Skipping pane {pane}"), e);
                    continue;
                }
            };
            reachable = true;

            let content = content.trim_end();
            if content.is_empty() {
                continue;
            }
            if let Some(previous) = self.last_retained.get(&pane) {
                if similarity(previous, content) >= DUPLICATE_THRESHOLD {
                    continue;
                }
            }

            let content: Arc<str> = Arc::from(content);
            self.last_retained.insert(pane.clone(), content.clone());
            records.push(CaptureRecord {
                last_command: last_command(&content),
                pane_id: pane,
                content,
                timestamp: moment,
                is_duplicate: false,
            });
        }

        if reachable && self.unavailable {
            info!("Terminal multiplexer is available again");
            self.unavailable = false;
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;

    use super::TerminalTracker;
    use crate::{
        config::TerminalConfig,
        daemon::storage::entities::CaptureRecord,
        terminal::{CaptureMode, MockMultiplexer, MultiplexerUnavailable},
    };

    fn config(panes: &[&str]) -> TerminalConfig {
        TerminalConfig {
            enable: true,
            panes: panes.iter().map(|v| v.to_string()).collect(),
            capture_mode: CaptureMode::Visible,
        }
    }

    const SCREEN: &str = "user@host:~/code$ cargo test\ntest result: ok. 12 passed\nuser@host:~/code$";

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let mut multiplexer = MockMultiplexer::new();
        multiplexer
            .expect_list_panes()
            .returning(|| Ok(vec![Arc::from("work:0.0")]));
        let mut screens = vec![
            SCREEN.to_string(),
            format!("{SCREEN}   \n\n"),
            "htop".to_string(),
        ]
        .into_iter();
        multiplexer
            .expect_capture_pane()
            .with(eq("work:0.0"), eq(CaptureMode::Visible))
            .times(3)
            .returning(move |_, _| Ok(screens.next().unwrap_or_default()));

        let mut tracker = TerminalTracker::new(Box::new(multiplexer), &config(&[]));
        let moment = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();

        let first = tracker.capture(moment).await;
        assert_eq!(first.len(), 1);
        assert_eq!(&*first[0].pane_id, "work:0.0");
        assert_eq!(first[0].last_command.as_deref(), Some("cargo test"));
        assert!(!first[0].is_duplicate);

        assert!(tracker.capture(moment).await.is_empty());

        let third = tracker.capture(moment).await;
        assert_eq!(third.len(), 1);
        assert_eq!(&*third[0].content, "htop");
    }

    #[tokio::test]
    async fn test_seeded_cache_suppresses_restart_duplicate() {
        let mut multiplexer = MockMultiplexer::new();
        multiplexer
            .expect_capture_pane()
            .returning(|_, _| Ok(SCREEN.to_string()));

        let mut tracker = TerminalTracker::new(Box::new(multiplexer), &config(&["work:0.0"]));
        tracker.seed(&[CaptureRecord {
            pane_id: "work:0.0".into(),
            content: SCREEN.into(),
            timestamp: Utc::now(),
            last_command: None,
            is_duplicate: false,
        }]);

        assert!(tracker.capture(Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_pane_is_skipped() {
        let mut multiplexer = MockMultiplexer::new();
        multiplexer
            .expect_capture_pane()
            .with(eq("gone:0.0"), eq(CaptureMode::Visible))
            .returning(|_, _| Err(anyhow!("can't find pane")));
        multiplexer
            .expect_capture_pane()
            .with(eq("work:0.0"), eq(CaptureMode::Visible))
            .returning(|_, _| Ok("vim src/main.rs".to_string()));

        let mut tracker =
            TerminalTracker::new(Box::new(multiplexer), &config(&["gone:0.0", "work:0.0"]));

        let records = tracker.capture(Utc::now()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(&*records[0].pane_id, "work:0.0");
    }

    #[tokio::test]
    async fn test_unavailable_multiplexer_yields_nothing() {
        let mut multiplexer = MockMultiplexer::new();
        multiplexer
            .expect_list_panes()
            .times(2)
            .returning(|| Err(MultiplexerUnavailable("no server running".into()).into()));

        let mut tracker = TerminalTracker::new(Box::new(multiplexer), &config(&[]));

        assert!(tracker.capture(Utc::now()).await.is_empty());
        assert!(tracker.capture(Utc::now()).await.is_empty());
    }
}
