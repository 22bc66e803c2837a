//! Streams cluster events about a unit pod to a log sink
//!
//! The watcher runs as a background task until it is stopped or the server
//! closes the watch. Stopping never blocks longer than the configured grace
//! period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use podwright_common::naming::pod_name;
use podwright_common::{ControllerConfig, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClusterClient, PodEvent};

/// Destination for pod events.
///
/// Fire-and-forget: implementations log their own failures and never
/// interrupt the watch.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn publish(&self, unit_id: &str, event: &PodEvent);
}

/// Sink that writes events to the tracing log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn publish(&self, unit_id: &str, event: &PodEvent) {
        if event.type_ == "Warning" {
            warn!(
                unit = %unit_id,
                reason = %event.reason,
                source = %event.source,
                count = event.count,
                "{}",
                event.message
            );
        } else {
            info!(
                unit = %unit_id,
                reason = %event.reason,
                source = %event.source,
                count = event.count,
                "{}",
                event.message
            );
        }
    }
}

/// Starts event watches for unit pods
pub struct EventWatcher {
    client: Arc<dyn ClusterClient>,
    sink: Arc<dyn LogSink>,
    config: Arc<ControllerConfig>,
}

impl EventWatcher {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        sink: Arc<dyn LogSink>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            client,
            sink,
            config,
        }
    }

    /// Spawn a watch on the unit pod's events
    pub fn start(&self, unit_id: &str) -> WatchHandle {
        let cancel = CancellationToken::new();
        let watch = run_watch(
            self.client.clone(),
            self.sink.clone(),
            self.config.clone(),
            unit_id.to_string(),
            cancel.clone(),
        );
        let done = cancel.clone();
        let task = tokio::spawn(async move {
            let forwarded = watch.await;
            done.cancel();
            forwarded
        });
        info!(unit = %unit_id, "event watch started");
        WatchHandle {
            unit_id: unit_id.to_string(),
            cancel,
            task,
            grace: Duration::from_millis(self.config.watch_stop_grace_millis),
        }
    }
}

/// Running event watch
pub struct WatchHandle {
    unit_id: String,
    cancel: CancellationToken,
    task: JoinHandle<usize>,
    grace: Duration,
}

impl WatchHandle {
    /// Token that stops the watch when cancelled; it is also cancelled once
    /// the watch ends on its own
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the watch and wait up to the grace period for it to end.
    ///
    /// Returns the number of events forwarded, or `None` when the task did
    /// not finish in time (it is aborted) or panicked.
    pub async fn stop(mut self) -> Option<usize> {
        self.cancel.cancel();
        let finished = tokio::time::timeout(self.grace, &mut self.task).await;
        match finished {
            Ok(Ok(forwarded)) => {
                debug!(unit = %self.unit_id, forwarded, "event watch stopped");
                Some(forwarded)
            }
            Ok(Err(e)) => {
                warn!(unit = %self.unit_id, error = %e, "event watch task failed");
                None
            }
            Err(_) => {
                warn!(
                    unit = %self.unit_id,
                    grace_ms = self.grace.as_millis() as u64,
                    "event watch did not stop within grace period, aborting"
                );
                self.task.abort();
                None
            }
        }
    }

    /// Wait for the server to close the watch
    pub async fn join(self) -> Option<usize> {
        self.task.await.ok()
    }
}

async fn run_watch(
    client: Arc<dyn ClusterClient>,
    sink: Arc<dyn LogSink>,
    config: Arc<ControllerConfig>,
    unit_id: String,
    cancel: CancellationToken,
) -> usize {
    let pod = pod_name(&unit_id);
    let stream = match open_stream(&*client, &config, &pod).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(unit = %unit_id, pod = %pod, error = %e, "failed to open event watch");
            return 0;
        }
    };
    forward_events(stream, &*sink, &unit_id, &cancel).await
}

async fn open_stream(
    client: &dyn ClusterClient,
    config: &ControllerConfig,
    pod: &str,
) -> Result<crate::client::PodEventStream> {
    client
        .watch_pod_events(&config.namespace, pod, config.watch_timeout_seconds)
        .await
}

/// Forward events until the stream ends, errors, or `cancel` fires
pub(crate) async fn forward_events<S>(
    stream: S,
    sink: &dyn LogSink,
    unit_id: &str,
    cancel: &CancellationToken,
) -> usize
where
    S: Stream<Item = Result<PodEvent>> + Unpin,
{
    let mut stream = stream;
    let mut forwarded = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(unit = %unit_id, "event watch cancelled");
                break;
            }
            next = stream.next() => {
                match next {
                    Some(Ok(event)) => {
                        sink.publish(unit_id, &event).await;
                        forwarded += 1;
                    }
                    Some(Err(e)) => {
                        warn!(unit = %unit_id, error = %e, "event watch error");
                        break;
                    }
                    None => {
                        debug!(unit = %unit_id, "event watch closed by server");
                        break;
                    }
                }
            }
        }
    }
    forwarded
}
