use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::{daemon::storage::entities::TickEvent, utils::clock::Clock};

use super::{filesystem::FilesystemTracker, terminal::TerminalTracker};

pub struct DataCollectionModule {
    next: mpsc::Sender<TickEvent>,
    filesystem: Option<FilesystemTracker>,
    terminal: Option<TerminalTracker>,
    shutdown: CancellationToken,
    collection_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl DataCollectionModule {
    pub fn new(
        next: mpsc::Sender<TickEvent>,
        filesystem: Option<FilesystemTracker>,
        terminal: Option<TerminalTracker>,
        shutdown: CancellationToken,
        collection_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            filesystem,
            terminal,
            collection_frequency,
            time_provider,
            shutdown,
        }
    }

    /// Runs both trackers side by side. They own disjoint state, so neither waits on the other.
    async fn collect_data(&mut self) -> TickEvent {
        let moment = self.time_provider.time();
        let filesystem = self.filesystem.as_mut();
        let terminal = self.terminal.as_mut();

        let scan = async move {
            match filesystem {
                Some(tracker) => tracker.scan(moment).await.unwrap_or_else(|e| {
                    error!("Filesystem scan failed, keeping previous snapshot {e:?}");
                    vec![]
                }),
                None => vec![],
            }
        };
        let capture = async move {
            match terminal {
                Some(tracker) => tracker.capture(moment).await,
                None => vec![],
            }
        };
        let (changes, captures) = tokio::join!(scan, capture);

        TickEvent {
            changes,
            captures,
            moment,
        }
    }

    /// Executes the collector event loop.
    pub async fn run(mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    return Ok(())
                }
                event = self.collect_data() => event
            };

            let span = info_span!("Processing collected data");
            debug!(
                "Sending tick with {} changes and {} captures",
                event.changes.len(),
                event.captures.len()
            );
            self.next
                .send(event)
                .instrument(span)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}
