use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;

use crate::{
    daemon::storage::{
        entities::{CaptureRecord, ChangeRecord},
        record_log::{EvidenceLogs, RecordLog},
        report::ReportStore,
    },
    evidence::{build_payload, EvidencePayload},
    llm::Summarizer,
};

const CHECK_EVIDENCE: &str = "\
[2018-07-04 10:00:00] Modified /home/user/code/src/main.rs (major, similarity 0.62, +3 -1)
[2018-07-04 10:05:00] Captured pane work:0.0 ($ cargo test):
    test result: ok. 12 passed";

/// The payload a report would be built from right now.
pub async fn current_payload<C, P>(
    logs: &EvidenceLogs<C, P>,
    token_limit: usize,
) -> Result<EvidencePayload>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
{
    let (changes, captures) = logs.load().await?;
    Ok(build_payload(&changes, &captures, token_limit))
}

pub fn describe_payload(payload: &EvidencePayload) -> String {
    format!(
        "{} entries, ~{} tokens, {} omitted",
        payload.entries.len(),
        payload.total_tokens,
        payload.omitted
    )
}

/// Summarizes the current evidence into a report for `date`. Once the report is stored the
/// summarized records are removed, records the daemon appended in the meantime stay. Returns
/// `None` when there is nothing to send.
pub async fn summarize_now<C, P>(
    logs: &EvidenceLogs<C, P>,
    summarizer: &dyn Summarizer,
    reports: &impl ReportStore,
    date: NaiveDate,
    token_limit: usize,
) -> Result<Option<PathBuf>>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
{
    let (changes, captures) = logs.load().await?;
    let payload = build_payload(&changes, &captures, token_limit);
    if payload.is_empty() {
        return Ok(None);
    }
    let report = summarizer.summarize(date, &payload.render()).await?;
    let path = reports.store(date, &report).await?;
    logs.remove_reported(changes.len(), captures.len()).await?;
    Ok(Some(path))
}

/// Sends a small made up log to the provider.
pub async fn check_provider(summarizer: &dyn Summarizer, date: NaiveDate) -> Result<String> {
    Ok(summarizer.summarize(date, CHECK_EVIDENCE).await?)
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{describe_payload, summarize_now};
    use crate::{
        daemon::storage::{
            entities::{ChangeKind, ChangeRecord},
            record_log::{MemoryEvidenceLogs, RecordLog},
            report::MemoryReportStore,
        },
        error::SummarizeError,
        llm::MockSummarizer,
    };

    fn july_4th() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap()
    }

    async fn logs_with_change() -> Result<MemoryEvidenceLogs> {
        let logs = MemoryEvidenceLogs::default();
        logs.changes
            .append(vec![ChangeRecord::structural(
                PathBuf::from("/w/lib.rs"),
                ChangeKind::Added,
                Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap(),
            )])
            .await?;
        Ok(logs)
    }

    #[tokio::test]
    async fn test_summarize_now_stores_and_resets() -> Result<()> {
        let logs = logs_with_change().await?;
        let reports = MemoryReportStore::default();
        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .withf(|_, evidence| evidence.contains("/w/lib.rs"))
            .times(1)
            .returning(|_, _| Ok("Started the library.".into()));

        let path = summarize_now(&logs, &summarizer, &reports, july_4th(), 1_000).await?;

        assert!(path.is_some());
        assert_eq!(
            reports.reports(),
            vec![(july_4th(), "Started the library.".to_string())]
        );
        assert!(logs.changes.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_summarize_now_keeps_records_appended_while_summarizing() -> Result<()> {
        let logs = Arc::new(logs_with_change().await?);
        let reports = MemoryReportStore::default();
        let mut summarizer = MockSummarizer::new();
        let writer = logs.clone();
        summarizer.expect_summarize().times(1).returning(move |_, _| {
            // The daemon keeps appending while the provider answers
            futures::executor::block_on(writer.changes.append(vec![ChangeRecord::structural(
                PathBuf::from("/w/late.rs"),
                ChangeKind::Added,
                Utc.with_ymd_and_hms(2018, 7, 4, 10, 5, 0).unwrap(),
            )]))
            .expect("memory log accepts records");
            Ok("Started the library.".into())
        });

        summarize_now(logs.as_ref(), &summarizer, &reports, july_4th(), 1_000).await?;

        let left = logs.changes.load().await?;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, PathBuf::from("/w/late.rs"));
        Ok(())
    }

    #[tokio::test]
    async fn test_summarize_now_keeps_logs_on_failure() -> Result<()> {
        let logs = logs_with_change().await?;
        let reports = MemoryReportStore::default();
        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summarize()
            .returning(|_, _| Err(SummarizeError::RateLimited("slow down".into())));

        let result = summarize_now(&logs, &summarizer, &reports, july_4th(), 1_000).await;

        assert!(result.is_err());
        assert!(reports.reports().is_empty());
        assert_eq!(logs.changes.load().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_summarize_now_without_evidence() -> Result<()> {
        let logs = MemoryEvidenceLogs::default();
        let reports = MemoryReportStore::default();
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().never();

        let path = summarize_now(&logs, &summarizer, &reports, july_4th(), 1_000).await?;

        assert_eq!(path, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_describe_payload() -> Result<()> {
        let logs = logs_with_change().await?;
        let payload = super::current_payload(&logs, 1_000).await?;
        assert!(describe_payload(&payload).starts_with("1 entries"));
        Ok(())
    }
}
