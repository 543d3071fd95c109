use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use crate::{
    daemon::storage::{
        cycle_state::CycleStateStorage,
        entities::{CaptureRecord, ChangeRecord, TickEvent},
        record_log::{EvidenceLogs, RecordLog},
        report::ReportStore,
    },
    evidence::build_payload,
    llm::Summarizer,
    utils::clock::Clock,
};

use super::{local_save::LocalSaver, module::EventProcessor, scheduler::DailyScheduler};

/// How a report attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report was written and the reported records were removed from the logs
    Produced,
    /// Nothing could be sent, the day is closed without a report and the logs are kept
    NothingToReport,
    /// The attempt failed, the report stays due
    Failed,
}

/// Persists every tick and, once a day, turns the collected evidence into a report.
pub struct ReportingProcessor<C, P, S, R> {
    saver: LocalSaver<C, P>,
    logs: Arc<EvidenceLogs<C, P>>,
    scheduler: DailyScheduler<S>,
    summarizer: Box<dyn Summarizer>,
    reports: R,
    token_limit: usize,
    date_provider: Box<dyn Clock>,
}

impl<C, P, S, R> ReportingProcessor<C, P, S, R>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
    S: CycleStateStorage,
    R: ReportStore,
{
    pub fn new(
        logs: Arc<EvidenceLogs<C, P>>,
        scheduler: DailyScheduler<S>,
        summarizer: Box<dyn Summarizer>,
        reports: R,
        token_limit: usize,
        date_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            saver: LocalSaver::new(logs.clone()),
            logs,
            scheduler,
            summarizer,
            reports,
            token_limit,
            date_provider,
        }
    }

    #[instrument(skip(self))]
    async fn report(&mut self, date: NaiveDate) -> ReportOutcome {
        let (changes, captures) = match self.logs.load().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Couldn't read evidence logs, retrying later {e:?}");
                return ReportOutcome::Failed;
            }
        };

        let payload = build_payload(&changes, &captures, self.token_limit);
        if payload.is_empty() {
            if changes.is_empty() && captures.is_empty() {
                info!("No activity recorded for {date}, skipping report");
            } else {
                warn!(
                    "Token limit {} is below the cost of any single entry, skipping report for {date}",
                    self.token_limit
                );
            }
            return ReportOutcome::NothingToReport;
        }
        info!(
            "Summarizing {} entries ({} tokens, {} omitted) with {}",
            payload.entries.len(),
            payload.total_tokens,
            payload.omitted,
            self.summarizer.describe()
        );

        let summary = match self.summarizer.summarize(date, &payload.render()).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Summarization failed, retrying next tick: {e}");
                return ReportOutcome::Failed;
            }
        };

        match self.reports.store(date, &summary).await {
            Ok(path) => info!("Report for {date} written to {path:?}"),
            Err(e) => {
                error!("Couldn't store report, retrying next tick {e:?}");
                return ReportOutcome::Failed;
            }
        }

        if let Err(e) = self
            .logs
            .remove_reported(changes.len(), captures.len())
            .await
        {
            error!("Report was produced but reported records couldn't be removed from the logs {e:?}");
        }
        ReportOutcome::Produced
    }
}

impl<C, P, S, R> EventProcessor for ReportingProcessor<C, P, S, R>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
    S: CycleStateStorage,
    R: ReportStore,
{
    async fn process_next(&mut self, message: TickEvent) -> Result<()> {
        // Failures are already reported and the records stay pending, the schedule goes on
        let _ = self.saver.process_next(message).await;

        let now = self.date_provider.local_time();
        let Some(date) = self.scheduler.try_begin(now) else {
            return Ok(());
        };

        match self.report(date).await {
            ReportOutcome::Failed => self.scheduler.fail(),
            ReportOutcome::Produced | ReportOutcome::NothingToReport => {
                self.scheduler.complete(date).await?;
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.saver.finalize().await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tokio::time::Instant;

    use super::ReportingProcessor;
    use crate::{
        daemon::{
            processing::{module::EventProcessor, scheduler::DailyScheduler},
            storage::{
                cycle_state::{CycleStateStorage, MemoryCycleStateStorage},
                entities::{ChangeKind, ChangeRecord, TickEvent},
                record_log::{MemoryEvidenceLogs, RecordLog},
                report::MemoryReportStore,
            },
        },
        error::SummarizeError,
        llm::MockSummarizer,
        utils::clock::Clock,
    };

    /// Clock that is moved by hand. Local time equals UTC.
    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn at(hour: u32, minute: u32) -> Self {
            Self(Arc::new(Mutex::new(
                Utc.with_ymd_and_hms(2018, 7, 4, hour, minute, 0).unwrap(),
            )))
        }

        fn set(&self, moment: DateTime<Utc>) {
            *self.0.lock().unwrap() = moment;
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn time(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }

        fn local_time(&self) -> NaiveDateTime {
            self.time().naive_utc()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    fn tick(clock: &ManualClock, name: &str) -> TickEvent {
        let moment = clock.time();
        TickEvent {
            changes: vec![ChangeRecord::structural(
                format!("/w/{name}").into(),
                ChangeKind::Added,
                moment,
            )],
            captures: vec![],
            moment,
        }
    }

    fn empty_tick(clock: &ManualClock) -> TickEvent {
        TickEvent {
            changes: vec![],
            captures: vec![],
            moment: clock.time(),
        }
    }

    fn july(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, day).unwrap()
    }

    #[tokio::test]
    async fn test_report_is_produced_once_and_logs_reset() -> Result<()> {
        let clock = ManualClock::at(18, 0);
        let logs = Arc::new(MemoryEvidenceLogs::default());
        let reports = Arc::new(MemoryReportStore::default());
        let state = Arc::new(MemoryCycleStateStorage::default());

        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_describe()
            .returning(|| "mock/model".into());
        summarizer
            .expect_summarize()
            .withf(|date, evidence| *date == july(4) && evidence.contains("Added /w/main.rs"))
            .times(1)
            .returning(|_, _| Ok("Started the project.".into()));

        let scheduler = DailyScheduler::load(
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            state.clone(),
        )
        .await?;
        let mut processor = ReportingProcessor::new(
            logs.clone(),
            scheduler,
            Box::new(summarizer),
            reports.clone(),
            10_000,
            Box::new(clock.clone()),
        );

        processor.process_next(tick(&clock, "main.rs")).await?;
        assert!(reports.reports().is_empty());
        assert_eq!(logs.changes.load().await?.len(), 1);

        clock.set(Utc.with_ymd_and_hms(2018, 7, 4, 19, 0, 5).unwrap());
        processor.process_next(empty_tick(&clock)).await?;

        assert_eq!(
            reports.reports(),
            vec![(july(4), "Started the project.".to_string())]
        );
        assert!(logs.changes.load().await?.is_empty());
        assert_eq!(state.load().await?.last_report_date, Some(july(4)));

        clock.set(Utc.with_ymd_and_hms(2018, 7, 4, 20, 0, 0).unwrap());
        processor.process_next(tick(&clock, "late.rs")).await?;
        assert_eq!(reports.reports().len(), 1);
        assert_eq!(logs.changes.load().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_saved_during_summarization_survive() -> Result<()> {
        let clock = ManualClock::at(19, 30);
        let logs = Arc::new(MemoryEvidenceLogs::default());
        logs.changes
            .append(vec![ChangeRecord::structural(
                "/w/main.rs".into(),
                ChangeKind::Added,
                clock.time(),
            )])
            .await?;

        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_describe()
            .returning(|| "mock/model".into());
        let writer = logs.clone();
        let late_moment = clock.time();
        summarizer.expect_summarize().times(1).returning(move |_, _| {
            futures::executor::block_on(writer.changes.append(vec![ChangeRecord::structural(
                "/w/late.rs".into(),
                ChangeKind::Added,
                late_moment,
            )]))
            .expect("memory log accepts records");
            Ok("Started the project.".into())
        });

        let scheduler = DailyScheduler::load(
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            MemoryCycleStateStorage::default(),
        )
        .await?;
        let mut processor = ReportingProcessor::new(
            logs.clone(),
            scheduler,
            Box::new(summarizer),
            MemoryReportStore::default(),
            10_000,
            Box::new(clock.clone()),
        );

        processor.process_next(empty_tick(&clock)).await?;

        let left = logs.changes.load().await?;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, std::path::PathBuf::from("/w/late.rs"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_summarization_keeps_evidence_and_retries() -> Result<()> {
        let clock = ManualClock::at(19, 30);
        let logs = Arc::new(MemoryEvidenceLogs::default());
        let reports = Arc::new(MemoryReportStore::default());

        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_describe()
            .returning(|| "mock/model".into());
        let mut attempts = 0;
        summarizer
            .expect_summarize()
            .times(2)
            .returning(move |_, _| {
                attempts += 1;
                if attempts == 1 {
                    Err(SummarizeError::RateLimited("slow down".into()))
                } else {
                    Ok("Recovered.".into())
                }
            });

        let scheduler = DailyScheduler::load(
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            MemoryCycleStateStorage::default(),
        )
        .await?;
        let mut processor = ReportingProcessor::new(
            logs.clone(),
            scheduler,
            Box::new(summarizer),
            reports.clone(),
            10_000,
            Box::new(clock.clone()),
        );

        processor.process_next(tick(&clock, "a.rs")).await?;
        assert!(reports.reports().is_empty());
        assert_eq!(logs.changes.load().await?.len(), 1);

        processor.process_next(empty_tick(&clock)).await?;
        assert_eq!(reports.reports().len(), 1);
        assert!(logs.changes.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_quiet_day_closes_without_calling_summarizer() -> Result<()> {
        let clock = ManualClock::at(19, 30);
        let logs = Arc::new(MemoryEvidenceLogs::default());
        let reports = Arc::new(MemoryReportStore::default());
        let state = Arc::new(MemoryCycleStateStorage::default());

        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().never();

        let scheduler = DailyScheduler::load(
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            state.clone(),
        )
        .await?;
        let mut processor = ReportingProcessor::new(
            logs,
            scheduler,
            Box::new(summarizer),
            reports.clone(),
            10_000,
            Box::new(clock.clone()),
        );

        processor.process_next(empty_tick(&clock)).await?;

        assert!(reports.reports().is_empty());
        assert_eq!(state.load().await?.last_report_date, Some(july(4)));

        tokio::time::timeout(Duration::from_secs(1), processor.finalize()).await??;
        Ok(())
    }
}
