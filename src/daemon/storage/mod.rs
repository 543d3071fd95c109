//!  Storage is organized through [record_log::RecordLog].
//!  The basic idea is:
//!   - There are two ordered logs, one of filesystem changes and one of terminal captures.
//!   - Logs only grow during a day and lose the reported records after a report was produced.
//!   - Every write replaces the log file atomically, so readers never see half written data.
//!
//!  Finished reports go to a [report::ReportStore], the daily cycle is remembered through
//!  [cycle_state::CycleStateStorage].

pub mod cycle_state;
pub mod entities;
pub mod record_log;
pub mod report;
