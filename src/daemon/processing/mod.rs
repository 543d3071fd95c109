use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, trace};

use super::storage::entities::TickEvent;

pub mod local_save;
pub mod module;
pub mod reporting;
pub mod scheduler;

/// Represents consumer of ticks. This module is responsible for receiving events and handing them
/// to the processor one by one, so processing of one tick never overlaps another.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TickEvent>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TickEvent>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            trace!("Processing event {:?}", event);
            let moment = event.moment;
            match self.processor.process_next(event).await {
                Ok(_) => {
                    debug!("Processed tick of {moment}")
                }
                Err(e) => {
                    error!("Error processing tick of {moment}: {e:?}")
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
