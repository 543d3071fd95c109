use std::{
    future::Future,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::{fs::operations::write_atomically, utils::time::date_to_report_name};

/// Destination of finished daily reports.
pub trait ReportStore {
    /// Stores the report for `date`, replacing an earlier one. Returns where it went.
    fn store(&self, date: NaiveDate, report: &str) -> impl Future<Output = Result<PathBuf>>;
}

impl<T: Deref> ReportStore for T
where
    T::Target: ReportStore,
{
    fn store(&self, date: NaiveDate, report: &str) -> impl Future<Output = Result<PathBuf>> {
        self.deref().store(date, report)
    }
}

/// One markdown file per day, `YYYY-MM-DD.md`.
pub struct MarkdownReportStore {
    dir: PathBuf,
}

impl MarkdownReportStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn report_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(date_to_report_name(date))
    }
}

pub fn render_report(date: NaiveDate, report: &str) -> String {
    format!(
        "# Daily report {}\n\n{}\n",
        date.format("%A, %B %-d, %Y"),
        report.trim()
    )
}

impl ReportStore for MarkdownReportStore {
    async fn store(&self, date: NaiveDate, report: &str) -> Result<PathBuf> {
        let path = self.report_path(date);
        write_atomically(&path, render_report(date, report).as_bytes()).await?;
        Ok(path)
    }
}

/// Keeps reports in memory.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<(NaiveDate, String)>>,
}

impl MemoryReportStore {
    pub fn reports(&self) -> Vec<(NaiveDate, String)> {
        self.reports
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl ReportStore for MemoryReportStore {
    async fn store(&self, date: NaiveDate, report: &str) -> Result<PathBuf> {
        self.reports
            .lock()
            .map_err(|_| anyhow!("report store is poisoned"))?
            .push((date, report.to_string()));
        Ok(PathBuf::from(date_to_report_name(date)))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{MarkdownReportStore, ReportStore};

    #[tokio::test]
    async fn test_markdown_report() -> Result<()> {
        let dir = tempdir()?;
        let store = MarkdownReportStore::new(dir.path().join("reports"));
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

        let path = store.store(date, "  Worked on the parser.\n").await?;

        assert_eq!(path, dir.path().join("reports").join("2018-07-04.md"));
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "# Daily report Wednesday, July 4, 2018\n\nWorked on the parser.\n"
        );
        Ok(())
    }
}
