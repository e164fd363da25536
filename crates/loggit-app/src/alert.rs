//! Out-of-band user alerts.

use std::sync::{Mutex, PoisonError};

/// Receives user-facing alerts raised by [`AppService`](crate::AppService).
pub trait AlertSink: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// Sends alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, title: &str, message: &str) {
        tracing::warn!(title, message, "user alert");
    }
}

/// A recorded alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns and clears the recorded alerts.
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Alert {
                title: title.to_string(),
                message: message.to_string(),
            });
    }
}
