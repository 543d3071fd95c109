use anyhow::Result;

use crate::daemon::storage::entities::TickEvent;

/// Represents an event processor. Processors are chained, each one handles a tick after the one
/// before it.
pub trait EventProcessor {
    fn process_next(&mut self, message: TickEvent) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
