//! Progress reporting port.
//!
//! The pipeline reports `(phase, percent, message)` after each major step.
//! Reporting is fire-and-forget: a failing sink is logged and ignored.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::domain::Phase;

/// One progress report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// 0..=100
    pub percent: u8,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(phase: Phase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Error a sink may report. The pipeline never propagates it.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("progress receiver closed")]
    Closed,
}

/// Receives progress reports.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: &ProgressUpdate) -> Result<(), ProgressError>;
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: &ProgressUpdate) -> Result<(), ProgressError> {
        Ok(())
    }
}

/// Logs each report as a structured `progress` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, update: &ProgressUpdate) -> Result<(), ProgressError> {
        info!(
            event = "progress",
            phase = %update.phase,
            percent = update.percent,
            message = %update.message,
        );
        Ok(())
    }
}

/// Forwards reports over an unbounded channel, e.g. to a status poller.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, update: &ProgressUpdate) -> Result<(), ProgressError> {
        self.tx.send(update.clone()).map_err(|_| ProgressError::Closed)
    }
}
