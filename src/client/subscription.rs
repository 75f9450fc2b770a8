//! An owned handle on the live event feed.
//!
//! A background task keeps the stream open, reconnecting after a fixed delay
//! whenever it drops, and forwards decoded events over a bounded channel.
//! Dropping the handle aborts the task, so a controller that switches
//! sessions never leaks a connection.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::CockpitApi;
use crate::live::LiveEvent;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

const CHANNEL_CAPACITY: usize = 256;

pub struct EventSubscription {
    rx: mpsc::Receiver<LiveEvent>,
    task: JoinHandle<()>,
}

impl EventSubscription {
    /// Start streaming. Must be called from within a tokio runtime.
    pub fn spawn<A>(api: Arc<A>, retry_delay: Duration) -> Self
    where
        A: CockpitApi + ?Sized + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            loop {
                match api.open_event_stream().await {
                    Ok(mut stream) => {
                        debug!("Event stream connected");
                        while let Some(event) = stream.next().await {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        debug!("Event stream closed, reconnecting");
                    }
                    Err(e) => warn!(error = %e, "Failed to open event stream"),
                }
                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(retry_delay).await;
            }
        });
        Self { rx, task }
    }

    /// Next event, or `None` once the background task has stopped.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
