use std::{future::Future, ops::Deref, path::PathBuf, sync::Mutex};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fs::operations::{quarantine, read_json, write_atomically};

/// State of the daily cycle. A report for a date is produced at most once, a new date simply
/// compares unequal to `last_report_date`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCycleState {
    pub last_report_date: Option<NaiveDate>,
}

pub trait CycleStateStorage {
    fn load(&self) -> impl Future<Output = Result<DailyCycleState>>;

    fn save(&self, state: DailyCycleState) -> impl Future<Output = Result<()>>;
}

impl<T: Deref> CycleStateStorage for T
where
    T::Target: CycleStateStorage,
{
    fn load(&self) -> impl Future<Output = Result<DailyCycleState>> {
        self.deref().load()
    }

    fn save(&self, state: DailyCycleState) -> impl Future<Output = Result<()>> {
        self.deref().save(state)
    }
}

pub struct JsonCycleStateStorage {
    path: PathBuf,
}

impl JsonCycleStateStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CycleStateStorage for JsonCycleStateStorage {
    async fn load(&self) -> Result<DailyCycleState> {
        match read_json(&self.path).await {
            Ok(state) => Ok(state.unwrap_or_default()),
            Err(e) => {
                warn!("Cycle state {:?} is unreadable, starting over: {e}", self.path);
                quarantine(&self.path).await?;
                Ok(DailyCycleState::default())
            }
        }
    }

    async fn save(&self, state: DailyCycleState) -> Result<()> {
        write_atomically(&self.path, &serde_json::to_vec_pretty(&state)?).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCycleStateStorage {
    state: Mutex<DailyCycleState>,
}

impl MemoryCycleStateStorage {
    pub fn with_state(state: DailyCycleState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl CycleStateStorage for MemoryCycleStateStorage {
    async fn load(&self) -> Result<DailyCycleState> {
        Ok(*self
            .state
            .lock()
            .map_err(|_| anyhow!("cycle state is poisoned"))?)
    }

    async fn save(&self, state: DailyCycleState) -> Result<()> {
        *self
            .state
            .lock()
            .map_err(|_| anyhow!("cycle state is poisoned"))? = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, NaiveTime};
    use tempfile::tempdir;

    use super::{CycleStateStorage, DailyCycleState, JsonCycleStateStorage};
    use crate::{daemon::processing::scheduler::DailyScheduler, fs::operations::sibling_path};

    #[tokio::test]
    async fn test_cycle_state_survives_restart() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("state.json");

        let storage = JsonCycleStateStorage::new(path.clone());
        assert_eq!(storage.load().await?, DailyCycleState::default());

        let state = DailyCycleState {
            last_report_date: NaiveDate::from_ymd_opt(2018, 7, 4),
        };
        storage.save(state).await?;

        let reopened = JsonCycleStateStorage::new(path);
        assert_eq!(reopened.load().await?, state);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_state_is_set_aside() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{\"last_report_date\": \"2018-07").await?;

        let storage = JsonCycleStateStorage::new(path.clone());
        assert_eq!(storage.load().await?, DailyCycleState::default());
        assert!(sibling_path(&path, ".corrupt").exists());

        tokio::fs::write(&path, "not json").await?;
        let scheduler = DailyScheduler::load(
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            JsonCycleStateStorage::new(path),
        )
        .await;
        assert!(scheduler.is_ok());
        Ok(())
    }
}
