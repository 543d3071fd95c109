use std::{
    future::Future,
    marker::PhantomData,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::fs::operations::{quarantine, read_json, write_atomically, FileLock};

use super::entities::{CaptureRecord, ChangeRecord};

/// Interface for abstracting storage of an ordered, append-only log of records.
pub trait RecordLog {
    type Record;

    /// Appends records after everything already stored. Either all records become visible or
    /// none of them.
    fn append(&self, records: Vec<Self::Record>) -> impl Future<Output = Result<()>>;

    /// Retrieves every committed record in insertion order.
    fn load(&self) -> impl Future<Output = Result<Vec<Self::Record>>>;

    /// Removes the oldest `count` records. Records appended after they were loaded stay.
    fn remove_first(&self, count: usize) -> impl Future<Output = Result<()>>;
}

impl<T: Deref> RecordLog for T
where
    T::Target: RecordLog,
{
    type Record = <T::Target as RecordLog>::Record;

    fn append(&self, records: Vec<Self::Record>) -> impl Future<Output = Result<()>> {
        self.deref().append(records)
    }

    fn load(&self) -> impl Future<Output = Result<Vec<Self::Record>>> {
        self.deref().load()
    }

    fn remove_first(&self, count: usize) -> impl Future<Output = Result<()>> {
        self.deref().remove_first(count)
    }
}

/// The main realization of [RecordLog]. Keeps the whole log as a JSON array which is rewritten
/// through a temporary file on every change.
pub struct JsonRecordLog<R> {
    path: PathBuf,
    _record: PhantomData<fn() -> R>,
}

impl<R: Serialize + DeserializeOwned> JsonRecordLog<R> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<R>> {
        Ok(read_json::<Vec<R>>(&self.path).await?.unwrap_or_default())
    }

    async fn append_locked(&self, records: Vec<R>) -> Result<()> {
        let mut stored = match self.read_all().await {
            Ok(stored) => stored,
            Err(e) => {
                // A broken log would block every future append, so it gets set aside.
                warn!("Log {:?} is unreadable, starting a new one: {e}", self.path);
                quarantine(&self.path).await?;
                vec![]
            }
        };
        stored.extend(records);
        write_atomically(&self.path, &serde_json::to_vec_pretty(&stored)?).await?;
        Ok(())
    }

    async fn remove_first_locked(&self, count: usize) -> Result<()> {
        let mut stored = self.read_all().await?;
        stored.drain(..count.min(stored.len()));
        write_atomically(&self.path, &serde_json::to_vec_pretty(&stored)?).await?;
        Ok(())
    }
}

impl<R: Serialize + DeserializeOwned> RecordLog for JsonRecordLog<R> {
    type Record = R;

    async fn append(&self, records: Vec<R>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        let lock = FileLock::exclusive(&self.path).await?;
        let result = self.append_locked(records).await;
        lock.release().await?;
        debug!("Appended {count} records to {:?}", self.path);
        result
    }

    async fn load(&self) -> Result<Vec<R>> {
        let lock = FileLock::shared(&self.path).await?;
        let result = self.read_all().await;
        lock.release().await?;
        result
    }

    async fn remove_first(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let lock = FileLock::exclusive(&self.path).await?;
        let result = self.remove_first_locked(count).await;
        lock.release().await?;
        debug!("Removed {count} records from {:?}", self.path);
        result
    }
}

/// Log kept in memory. Used when nothing has to survive the process, mostly in tests.
pub struct MemoryRecordLog<R> {
    records: Mutex<Vec<R>>,
}

impl<R> Default for MemoryRecordLog<R> {
    fn default() -> Self {
        Self {
            records: Mutex::new(vec![]),
        }
    }
}

impl<R: Clone> RecordLog for MemoryRecordLog<R> {
    type Record = R;

    async fn append(&self, records: Vec<R>) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow!("memory log is poisoned"))?
            .extend(records);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<R>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| anyhow!("memory log is poisoned"))?
            .clone())
    }

    async fn remove_first(&self, count: usize) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("memory log is poisoned"))?;
        let count = count.min(records.len());
        records.drain(..count);
        Ok(())
    }
}

/// Both evidence logs. The change log is written by the filesystem side, the capture log by the
/// terminal side, the report side only reads them and removes what it reported.
pub struct EvidenceLogs<C, P> {
    pub changes: C,
    pub captures: P,
}

pub type FileEvidenceLogs = EvidenceLogs<JsonRecordLog<ChangeRecord>, JsonRecordLog<CaptureRecord>>;

pub type MemoryEvidenceLogs =
    EvidenceLogs<MemoryRecordLog<ChangeRecord>, MemoryRecordLog<CaptureRecord>>;

impl FileEvidenceLogs {
    pub fn open(change_log: PathBuf, capture_log: PathBuf) -> Self {
        Self {
            changes: JsonRecordLog::new(change_log),
            captures: JsonRecordLog::new(capture_log),
        }
    }
}

impl Default for MemoryEvidenceLogs {
    fn default() -> Self {
        Self {
            changes: MemoryRecordLog::default(),
            captures: MemoryRecordLog::default(),
        }
    }
}

impl<C, P> EvidenceLogs<C, P>
where
    C: RecordLog<Record = ChangeRecord>,
    P: RecordLog<Record = CaptureRecord>,
{
    pub async fn load(&self) -> Result<(Vec<ChangeRecord>, Vec<CaptureRecord>)> {
        Ok((self.changes.load().await?, self.captures.load().await?))
    }

    /// Drops records that went into a report. `changes` and `captures` are the lengths of the
    /// logs as they were loaded, anything appended since is kept for the next report.
    pub async fn remove_reported(&self, changes: usize, captures: usize) -> Result<()> {
        self.changes.remove_first(changes).await?;
        self.captures.remove_first(captures).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::{
            entities::{CaptureRecord, ChangeKind, ChangeRecord},
            record_log::{FileEvidenceLogs, JsonRecordLog, MemoryRecordLog, RecordLog},
        },
        fs::operations::sibling_path,
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn change(name: &str, offset: i64) -> ChangeRecord {
        ChangeRecord::structural(
            format!("/watched/{name}").into(),
            ChangeKind::Added,
            Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(offset),
        )
    }

    #[tokio::test]
    async fn test_json_log_appending() -> Result<()> {
        let dir = tempdir()?;
        let log = JsonRecordLog::<ChangeRecord>::new(dir.path().join("changes.json"));

        log.append(vec![change("a", 0)]).await?;
        log.append(vec![change("b", 1), change("c", 2)]).await?;
        log.append(vec![]).await?;

        let stored = log.load().await?;
        assert_eq!(stored, vec![change("a", 0), change("b", 1), change("c", 2)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_json_log_missing_file_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let log = JsonRecordLog::<ChangeRecord>::new(dir.path().join("changes.json"));
        assert!(log.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_json_log_remove_first() -> Result<()> {
        let dir = tempdir()?;
        let log = JsonRecordLog::<ChangeRecord>::new(dir.path().join("changes.json"));
        log.append(vec![change("a", 0), change("b", 1), change("c", 2)])
            .await?;

        log.remove_first(2).await?;
        assert_eq!(log.load().await?, vec![change("c", 2)]);

        log.remove_first(5).await?;
        assert!(log.load().await?.is_empty());
        assert_eq!(tokio::fs::read_to_string(log.path()).await?, "[]");
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_log_remove_first() -> Result<()> {
        let log = MemoryRecordLog::<ChangeRecord>::default();
        log.append(vec![change("a", 0), change("b", 1)]).await?;

        log.remove_first(1).await?;

        assert_eq!(log.load().await?, vec![change("b", 1)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_json_log_recovers_from_corruption() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("changes.json");
        // Simulates a log cut off in the middle of a write by something else.
        tokio::fs::write(&path, "[{\"path\": \"/watched/a\", ").await?;
        let log = JsonRecordLog::<ChangeRecord>::new(path.clone());

        assert!(log.load().await.is_err());
        log.append(vec![change("b", 1)]).await?;

        assert_eq!(log.load().await?, vec![change("b", 1)]);
        assert!(sibling_path(&path, ".corrupt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_shared_log_through_arc() -> Result<()> {
        let log = Arc::new(MemoryRecordLog::<ChangeRecord>::default());
        let writer = log.clone();

        writer.append(vec![change("a", 0)]).await?;

        assert_eq!(log.load().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_evidence_logs_keep_records_appended_after_load() -> Result<()> {
        let dir = tempdir()?;
        let logs = FileEvidenceLogs::open(
            dir.path().join("changes.json"),
            dir.path().join("captures.json"),
        );
        logs.changes.append(vec![change("a", 0)]).await?;
        logs.captures
            .append(vec![CaptureRecord {
                pane_id: "main:0.0".into(),
                content: "$ cargo test".into(),
                timestamp: Utc.from_utc_datetime(&TEST_START_DATE),
                last_command: Some("cargo test".into()),
                is_duplicate: false,
            }])
            .await?;

        let (changes, captures) = logs.load().await?;
        assert_eq!((changes.len(), captures.len()), (1, 1));

        logs.changes.append(vec![change("late", 5)]).await?;
        logs.remove_reported(changes.len(), captures.len()).await?;

        let (changes, captures) = logs.load().await?;
        assert_eq!(changes, vec![change("late", 5)]);
        assert!(captures.is_empty());
        Ok(())
    }
}
