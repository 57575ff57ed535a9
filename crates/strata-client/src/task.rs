//! Cancellation and progress reporting for long-running operations

use crate::{ClientError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Which phase of an operation a progress event belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Listing,
    Uploading,
    Deleting,
    Renaming,
}

/// One progress event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Phase of the operation
    pub stage: Stage,
    /// Units done so far (pages, parts or entries)
    pub completed: u64,
    /// Total units, when known up front
    pub total: Option<u64>,
}

/// Cancellation token and optional progress channel shared by one operation.
///
/// Cancellation is checked between network calls, never during one: effects
/// that already happened stay in place.
#[derive(Clone, Debug, Default)]
pub struct TaskContext {
    /// Cancelled by the caller to stop the operation at its next checkpoint
    pub cancel: CancellationToken,
    /// Receives progress events; dropped receivers are ignored
    pub progress: Option<UnboundedSender<Progress>>,
}

impl TaskContext {
    /// A context that is never cancelled and reports nowhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send progress events to `sender`
    pub fn with_progress(mut self, sender: UnboundedSender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Fail with [`ClientError::Cancelled`] once the token has been cancelled
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit a progress event
    pub fn report(&self, stage: Stage, completed: u64, total: Option<u64>) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(Progress {
                stage,
                completed,
                total,
            });
        }
    }
}
