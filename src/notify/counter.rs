//! Camera-event counting and termination signaling.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{Mutex, mpsc};

use crate::domain::{EventKind, ProgressEvent};
use crate::error::{RefineryError, Result};

/// Queued once each time the counter reaches its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationSignal {
    /// 1-based number of this signal since the channel was bound
    pub sequence: u64,
}

/// Counts camera events toward a fixed threshold.
#[derive(Debug)]
pub struct TerminationCounter {
    count: u32,
    threshold: u32,
    emitted: u64,
}

impl TerminationCounter {
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
            emitted: 0,
        }
    }

    /// Count one event. Returns a signal when the threshold is reached,
    /// after which the count starts over.
    pub fn record(&mut self) -> Option<TerminationSignal> {
        self.count += 1;
        if self.count < self.threshold {
            return None;
        }
        self.count = 0;
        self.emitted += 1;
        Some(TerminationSignal {
            sequence: self.emitted,
        })
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Applies decoded events to the shared counter.
///
/// Shared by every connection task; the counter and the signal queue are
/// updated under one lock so signals are never duplicated or reordered.
#[derive(Debug)]
pub struct EventDispatcher {
    counter: Mutex<TerminationCounter>,
    signals: mpsc::UnboundedSender<TerminationSignal>,
}

impl EventDispatcher {
    pub fn new(threshold: u32) -> (Arc<Self>, TerminationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Self {
            counter: Mutex::new(TerminationCounter::new(threshold)),
            signals: tx,
        });
        (dispatcher, TerminationReceiver { rx })
    }

    /// Handle one event; returns whether it queued a termination signal.
    pub async fn dispatch(&self, event: &ProgressEvent) -> bool {
        match event.kind {
            EventKind::Step => {
                debug!("Trainer step: {}", event.payload);
                false
            }
            EventKind::Camera => {
                let mut counter = self.counter.lock().await;
                match counter.record() {
                    Some(signal) => {
                        info!(
                            "Camera threshold {} reached; queueing termination #{}",
                            counter.threshold(),
                            signal.sequence
                        );
                        // Receiver gone means the run is over; nothing to wake.
                        let _ = self.signals.send(signal);
                        true
                    }
                    None => {
                        debug!(
                            "Camera event '{}' ({}/{})",
                            event.payload,
                            counter.count(),
                            counter.threshold()
                        );
                        false
                    }
                }
            }
        }
    }

    pub async fn reset(&self) {
        self.counter.lock().await.reset();
    }

    pub async fn count(&self) -> u32 {
        self.counter.lock().await.count()
    }
}

/// Single consumer of termination signals.
#[derive(Debug)]
pub struct TerminationReceiver {
    rx: mpsc::UnboundedReceiver<TerminationSignal>,
}

impl TerminationReceiver {
    /// Wait for the next signal; `None` waits without bound.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<TerminationSignal> {
        let next = match timeout {
            None => self.rx.recv().await,
            Some(limit) => tokio::time::timeout(limit, self.rx.recv())
                .await
                .map_err(|_| RefineryError::TerminationTimeout(limit.as_millis() as u64))?,
        };
        next.ok_or_else(|| RefineryError::Notification("termination channel closed".to_string()))
    }

    /// Discard signals left over from an earlier iteration.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!("Discarded {} stale termination signal(s)", drained);
        }
        drained
    }
}
