//! Worker event loop with panic isolation.

use crate::message::{ClientEvent, WorkerEvent, WorkerMessage};
use crate::worker::{ServiceWorker, WorkerError};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Owner's side of a running worker
pub struct WorkerHandle {
    tx: UnboundedSender<WorkerEvent>,
    events: UnboundedReceiver<ClientEvent>,
    worker: Arc<ServiceWorker>,
    join: JoinHandle<()>,
}

/// Spawn the event loop for `worker`.
///
/// Each event is handled in its own task so a panic is reported as
/// [`ClientEvent::Crashed`] instead of taking the loop down.
pub fn spawn_worker(worker: Arc<ServiceWorker>) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (client_tx, events) = mpsc::unbounded_channel();

    let looped = Arc::clone(&worker);
    let join = tokio::spawn(async move {
        info!("Worker {} started", looped.version());
        run_event_loop(&looped, rx, client_tx).await;
        info!("Worker {} stopped", looped.version());
    });

    WorkerHandle {
        tx,
        events,
        worker,
        join,
    }
}

async fn run_event_loop(
    worker: &Arc<ServiceWorker>,
    mut rx: UnboundedReceiver<WorkerEvent>,
    client_tx: UnboundedSender<ClientEvent>,
) {
    while let Some(event) = rx.recv().await {
        if matches!(event, WorkerEvent::Shutdown) {
            debug!("Worker {} received shutdown", worker.version());
            break;
        }

        let task_worker = Arc::clone(worker);
        let result = tokio::spawn(async move { process_event(&task_worker, event).await }).await;

        match result {
            Ok(reports) => {
                for report in reports {
                    let _ = client_tx.send(report);
                }
            }
            Err(e) if e.is_panic() => {
                error!("Worker {} panicked: {}", worker.version(), e);
                let _ = client_tx.send(ClientEvent::Crashed {
                    error: e.to_string(),
                });
            }
            Err(e) => warn!("Worker {} event cancelled: {}", worker.version(), e),
        }
    }

    debug!("Worker {} channel closed", worker.version());
}

/// Handle one event, returning what to report back
async fn process_event(worker: &ServiceWorker, event: WorkerEvent) -> Vec<ClientEvent> {
    match event {
        WorkerEvent::Install => {
            let precached = match worker.install().await {
                Ok(precached) => precached,
                Err(e) => {
                    return vec![ClientEvent::InstallFailed {
                        error: e.to_string(),
                    }];
                }
            };

            // Skip waiting
            vec![ClientEvent::Installed { precached }, activate(worker).await]
        }

        WorkerEvent::Activate => vec![activate(worker).await],

        WorkerEvent::Message(message) => worker
            .handle_message(&message)
            .await
            .map(ClientEvent::BulkCacheFinished)
            .into_iter()
            .collect(),

        WorkerEvent::Sync { tag } => worker
            .handle_sync(&tag)
            .await
            .map(ClientEvent::BulkCacheFinished)
            .into_iter()
            .collect(),

        // Handled in the loop
        WorkerEvent::Shutdown => Vec::new(),
    }
}

async fn activate(worker: &ServiceWorker) -> ClientEvent {
    match worker.activate().await {
        Ok(report) => ClientEvent::Activated {
            deleted_buckets: report.deleted_buckets,
            claimed_clients: report.claimed_clients,
        },
        Err(e) => ClientEvent::ActivationFailed {
            error: e.to_string(),
        },
    }
}

impl WorkerHandle {
    fn send(&self, event: WorkerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn worker(&self) -> Arc<ServiceWorker> {
        Arc::clone(&self.worker)
    }

    /// Start install; activation follows on success
    pub fn install(&self) -> bool {
        self.send(WorkerEvent::Install)
    }

    pub fn activate(&self) -> bool {
        self.send(WorkerEvent::Activate)
    }

    /// Fire-and-forget page message
    pub fn post_message(&self, message: WorkerMessage) -> bool {
        self.send(WorkerEvent::Message(message))
    }

    /// Post a JSON message as a page would. Unknown shapes are dropped.
    pub fn post_json(&self, json: &str) -> bool {
        match WorkerMessage::from_json(json) {
            Some(message) => self.post_message(message),
            None => {
                debug!("Ignoring unknown worker message: {}", json);
                false
            }
        }
    }

    /// Fire a background sync
    pub fn sync(&self, tag: &str) -> bool {
        self.send(WorkerEvent::Sync {
            tag: tag.to_string(),
        })
    }

    /// Next event reported by the worker
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Wait until the worker is active, or report why it never will be
    pub async fn wait_until_active(&mut self) -> Result<(), WorkerError> {
        while let Some(event) = self.next_event().await {
            match event {
                ClientEvent::Activated { .. } => return Ok(()),
                ClientEvent::InstallFailed { error }
                | ClientEvent::ActivationFailed { error }
                | ClientEvent::Crashed { error } => return Err(WorkerError::Lifecycle(error)),
                _ => {}
            }
        }
        Err(WorkerError::Stopped)
    }

    /// Stop after the events already queued
    pub async fn shutdown(self) {
        let _ = self.tx.send(WorkerEvent::Shutdown);
        if let Err(e) = self.join.await {
            warn!("Worker loop ended abnormally: {}", e);
        }
    }
}
