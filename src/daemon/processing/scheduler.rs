use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::info;

use crate::daemon::storage::cycle_state::{CycleStateStorage, DailyCycleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the configured time of day
    Idle,
    /// Time has come and there's no report for today yet
    ReportDue,
    /// A report is being produced
    ReportInFlight,
    /// Today's report exists
    Done,
}

/// Decides when the daily report is produced. At most one report succeeds per calendar date, a
/// failed attempt makes the report due again on the next check.
pub struct DailyScheduler<S> {
    at: NaiveTime,
    storage: S,
    cycle: DailyCycleState,
    in_flight: Option<NaiveDate>,
}

impl<S: CycleStateStorage> DailyScheduler<S> {
    pub async fn load(at: NaiveTime, storage: S) -> Result<Self> {
        let cycle = storage.load().await?;
        if let Some(date) = cycle.last_report_date {
            info!("Last report was produced for {date}");
        }
        Ok(Self {
            at,
            storage,
            cycle,
            in_flight: None,
        })
    }

    pub fn state(&self, now: NaiveDateTime) -> SchedulerState {
        if self.in_flight.is_some() {
            SchedulerState::ReportInFlight
        } else if self.cycle.last_report_date == Some(now.date()) {
            SchedulerState::Done
        } else if now.time() >= self.at {
            SchedulerState::ReportDue
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.state(now) == SchedulerState::ReportDue
    }

    /// Moves a due report in flight. Returns the date the report is for.
    pub fn try_begin(&mut self, now: NaiveDateTime) -> Option<NaiveDate> {
        if !self.is_due(now) {
            return None;
        }
        let date = now.date();
        self.in_flight = Some(date);
        Some(date)
    }

    /// Marks the report for `date` produced. The in memory state changes even when persisting it
    /// fails, so the same process never reports twice for one date.
    pub async fn complete(&mut self, date: NaiveDate) -> Result<()> {
        self.in_flight = None;
        self.cycle.last_report_date = Some(date);
        self.storage.save(self.cycle).await
    }

    pub fn fail(&mut self) {
        self.in_flight = None;
    }
}
