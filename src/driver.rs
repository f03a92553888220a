//! Driver pumps packet source events into an input port

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::port::InPort;
use crate::source::{PacketSource, SourceEvent};
use crate::types::Element;
use crate::{Result, StreamError};

/// Consecutive retryable source errors tolerated before the driver gives up.
const MAX_ERRORS: u32 = 10;

/// Handle to a running driver task
pub struct DriverHandle {
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    task: JoinHandle<Result<u64>>,
}

impl DriverHandle {
    /// Request shutdown. Events already pulled from the source are still
    /// pushed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the driver to stop, returning the number of events pushed.
    ///
    /// # Errors
    ///
    /// Returns the source error that stopped the driver, or
    /// [`StreamError::Source`] if the task panicked.
    pub async fn join(self) -> Result<u64> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StreamError::source_failed_with("driver task failed", Box::new(e))),
        }
    }
}

/// Driver spawns and manages the task feeding a port
///
/// The task owns the source and pushes each event into the port. Pushes run on
/// tokio's blocking pool because a full queue with a blocking SRI makes them
/// wait for the reader.
pub struct Driver;

impl Driver {
    /// Spawn a driver task for the given source and port
    pub fn spawn<T, S>(source: S, port: Arc<InPort<T>>) -> DriverHandle
    where
        T: Element,
        S: PacketSource<T>,
    {
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move { Self::pump_task(source, port, cancel_task).await });
        DriverHandle { cancel, task }
    }

    async fn pump_task<T, S>(
        mut source: S,
        port: Arc<InPort<T>>,
        cancel: CancellationToken,
    ) -> Result<u64>
    where
        T: Element,
        S: PacketSource<T>,
    {
        info!(port = %port.name(), "Driver task started");
        let mut event_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Driver cancelled");
                    break;
                }
                result = source.next_event() => result,
            };

            match result {
                Ok(Some(event)) => {
                    error_count = 0;
                    event_count += 1;
                    trace!("Event {}: stream_id={}", event_count, event.stream_id());

                    let port = Arc::clone(&port);
                    let pushed = tokio::task::spawn_blocking(move || push_event(&port, event)).await;
                    if let Err(e) = pushed {
                        error!("Push task failed: {}", e);
                        return Err(StreamError::source_failed_with("push task failed", Box::new(e)));
                    }
                }
                Ok(None) => {
                    info!("Source ended after {} events", event_count);
                    break;
                }
                Err(e) if e.is_retryable() => {
                    error_count += 1;
                    warn!("Source error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!("Too many source errors, shutting down");
                        return Err(e);
                    }

                    // Exponential backoff: 50ms, 100ms, 200ms, ...
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!("Source failed: {}", e);
                    return Err(e);
                }
            }
        }

        debug!("Driver task ended (pushed {} events)", event_count);
        Ok(event_count)
    }
}

fn push_event<T: Element>(port: &InPort<T>, event: SourceEvent<T>) {
    match event {
        SourceEvent::Sri(sri) => port.push_sri(sri),
        SourceEvent::Data { stream_id, data, time, eos } => {
            port.push_packet(data, time, eos, &stream_id)
        }
    }
}
