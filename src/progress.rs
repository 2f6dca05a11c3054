use tokio::sync::mpsc;
use tracing::debug;

use crate::types::ProgressEvent;

/// Publishing side of the progress stream. A sink without a receiver is a no-op;
/// a full or closed channel drops the event rather than stalling the run.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, percent: u8, status: impl Into<String>) {
        let event = ProgressEvent { percent: percent.min(100), status: status.into() };
        debug!(percent = event.percent, status = %event.status, "progress");
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Progress through the fetch phase: 30% at start, 90% once every entity completed.
pub fn fetch_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    let done = completed.min(total) as f64 / total as f64;
    (30.0 + done * 60.0).round() as u8
}
