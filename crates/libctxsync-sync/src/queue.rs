//! Single-consumer FIFO of sync events
//!
//! Enqueuing while idle spawns one consumer task; it drains the buffer
//! one event at a time and exits when the buffer is empty. A failed event
//! rejects only its own future.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::event::SyncEvent;
use crate::notifications::QueueNotification;

/// Handles one event at a time on behalf of the queue
pub trait SyncProcessor: Send + Sync + 'static {
    fn process(&self, event: &SyncEvent) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Events waiting, not counting the one in flight
    pub depth: usize,
    pub processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<SyncEvent>,
}

struct Pending {
    event: SyncEvent,
    done: oneshot::Sender<Result<(), SyncError>>,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<Pending>,
    processing: bool,
    current: Option<SyncEvent>,
}

pub struct SyncQueue<P> {
    processor: Arc<P>,
    inner: Arc<Mutex<Inner>>,
    notify: broadcast::Sender<QueueNotification>,
}

impl<P> Clone for SyncQueue<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            inner: Arc::clone(&self.inner),
            notify: self.notify.clone(),
        }
    }
}

impl<P: SyncProcessor> SyncQueue<P> {
    pub fn new(processor: P) -> Self {
        let (notify, _) = broadcast::channel(256);
        Self {
            processor: Arc::new(processor),
            inner: Arc::new(Mutex::new(Inner::default())),
            notify,
        }
    }

    /// Add an event and get a future that resolves when it has been processed.
    ///
    /// The event is queued immediately, before the returned future is
    /// polled. Must be called from within a tokio runtime.
    pub fn enqueue(&self, event: SyncEvent) -> impl Future<Output = Result<(), SyncError>> + Send + 'static {
        let (done, rx) = oneshot::channel();
        let trigger = event.trigger;
        let (depth, start) = {
            let mut inner = self.lock();
            inner.pending.push_back(Pending { event, done });
            let start = !inner.processing;
            inner.processing = true;
            (inner.pending.len(), start)
        };
        let _ = self.notify.send(QueueNotification::Enqueued { trigger, depth });
        debug!(%trigger, depth, "sync event enqueued");

        if start {
            self.spawn_consumer();
        }

        async move { rx.await.unwrap_or(Err(SyncError::QueueClosed)) }
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.lock();
        QueueStatus {
            depth: inner.pending.len(),
            processing: inner.processing,
            current: inner.current.clone(),
        }
    }

    /// Reject every pending event with `QueueCleared`.
    ///
    /// The event in flight, if any, still completes. Returns how many
    /// events were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<Pending> = self.lock().pending.drain(..).collect();
        let count = drained.len();
        for pending in drained {
            let _ = pending.done.send(Err(SyncError::QueueCleared));
        }
        if count > 0 {
            debug!(count, "sync queue cleared");
        }
        count
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueNotification> {
        self.notify.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_consumer(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut processed = 0usize;
            loop {
                let next = {
                    let mut inner = queue.lock();
                    match inner.pending.pop_front() {
                        Some(p) => {
                            inner.current = Some(p.event.clone());
                            Some(p)
                        }
                        None => {
                            inner.processing = false;
                            inner.current = None;
                            None
                        }
                    }
                };
                let Some(Pending { event, done }) = next else {
                    break;
                };

                let trigger = event.trigger;
                let _ = queue.notify.send(QueueNotification::ProcessingStarted { trigger });

                // Run on its own task so a panicking processor fails only this event
                let processor = Arc::clone(&queue.processor);
                let task = tokio::spawn(async move { processor.process(&event).await });
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(SyncError::ItemFailed {
                        trigger,
                        message: e.to_string(),
                    }),
                };

                match &result {
                    Ok(()) => {
                        let _ = queue.notify.send(QueueNotification::Processed { trigger });
                    }
                    Err(e) => {
                        warn!(%trigger, error = %e, "sync event failed");
                        let _ = queue.notify.send(QueueNotification::Error {
                            trigger,
                            message: e.to_string(),
                        });
                    }
                }
                processed += 1;
                let _ = done.send(result);
            }
            let _ = queue
                .notify
                .send(QueueNotification::ProcessingCompleted { processed });
        });
    }
}
