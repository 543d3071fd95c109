use std::sync::Arc;

use anyhow::Result;
use collection::{
    collector::DataCollectionModule, filesystem::FilesystemTracker, terminal::TerminalTracker,
};
use processing::{reporting::ReportingProcessor, scheduler::DailyScheduler, ProcessingModule};
use storage::{
    cycle_state::JsonCycleStateStorage,
    entities::{CaptureRecord, ChangeRecord, TickEvent},
    record_log::{FileEvidenceLogs, JsonRecordLog, RecordLog},
    report::MarkdownReportStore,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    llm::{build_summarizer, Summarizer},
    terminal::{tmux::TmuxMultiplexer, Multiplexer},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

pub type DaemonProcessor = ProcessingModule<
    ReportingProcessor<
        JsonRecordLog<ChangeRecord>,
        JsonRecordLog<CaptureRecord>,
        JsonCycleStateStorage,
        MarkdownReportStore,
    >,
>;

/// Represents the starting point for the daemon
pub async fn start_daemon(config: Config) -> Result<()> {
    std::env::set_current_dir("/")?;

    let shutdown_token = CancellationToken::new();
    let summarizer = build_summarizer(&config.llm)?;

    let (collector, processor) = create_pipeline(
        &config,
        Box::new(TmuxMultiplexer::default()),
        summarizer,
        &shutdown_token,
        DefaultClock,
    )
    .await?;

    info!(
        "Daemon started, report due daily at {}, ticking every {:?}",
        config.summarizer.at, config.tick
    );

    let (_, collection_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let result = collector.run().await;
            shutdown_token.cancel();
            result
        },
        processor.run(),
    );

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

async fn create_pipeline(
    config: &Config,
    multiplexer: Box<dyn Multiplexer>,
    summarizer: Box<dyn Summarizer>,
    shutdown_token: &CancellationToken,
    clock: impl Clock + Clone,
) -> Result<(DataCollectionModule, DaemonProcessor)> {
    let (sender, receiver) = mpsc::channel::<TickEvent>(10);
    let logs = Arc::new(FileEvidenceLogs::open(
        config.storage.change_log.clone(),
        config.storage.capture_log.clone(),
    ));

    let seed = logs.captures.load().await.unwrap_or_else(|e| {
        warn!("Couldn't read previous captures, every pane will be recorded again {e:?}");
        vec![]
    });
    let collector = create_collector(
        config,
        sender,
        multiplexer,
        &seed,
        shutdown_token,
        clock.clone(),
    );
    let processor = create_processor(config, logs, receiver, summarizer, clock).await?;
    Ok((collector, processor))
}

fn create_collector(
    config: &Config,
    sender: mpsc::Sender<TickEvent>,
    multiplexer: Box<dyn Multiplexer>,
    seed: &[CaptureRecord],
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> DataCollectionModule {
    let filesystem = config
        .filesystem
        .enable
        .then(|| FilesystemTracker::new(&config.filesystem));
    let terminal = config.terminal.enable.then(|| {
        let mut tracker = TerminalTracker::new(multiplexer, &config.terminal);
        tracker.seed(seed);
        tracker
    });

    DataCollectionModule::new(
        sender,
        filesystem,
        terminal,
        shutdown_token.clone(),
        config.tick,
        Box::new(clock),
    )
}

async fn create_processor(
    config: &Config,
    logs: Arc<FileEvidenceLogs>,
    receiver: mpsc::Receiver<TickEvent>,
    summarizer: Box<dyn Summarizer>,
    clock: impl Clock,
) -> Result<DaemonProcessor> {
    let scheduler = DailyScheduler::load(
        config.summarizer.at,
        JsonCycleStateStorage::new(config.storage.state_file.clone()),
    )
    .await?;
    let reporter = ReportingProcessor::new(
        logs,
        scheduler,
        summarizer,
        MarkdownReportStore::new(config.summarizer.report_dir.clone()),
        config.summarizer.token_limit,
        Box::new(clock),
    );
    Ok(ProcessingModule::new(receiver, reporter))
}
