// crates/ledgerflow-core/src/runtime/notify.rs
// ============================================================================
// Module: Ledgerflow Notification Sinks
// Description: Stderr, file, no-op, and in-memory notification sinks.
// Purpose: Route engine events as JSON lines without a delivery dependency.
// Dependencies: crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! Sinks serialize each [`NotificationEvent`] as one JSON line. Email or IM
//! gateways consume the file or stderr stream; the engines never block on
//! delivery and only log sink failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::NotificationEvent;
use crate::interfaces::DispatchError;
use crate::interfaces::NotificationSink;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that writes JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrNotificationSink;

impl NotificationSink for StderrNotificationSink {
    fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(event)
            .map_err(|err| DispatchError::DispatchFailed(err.to_string()))?;
        writeln!(io::stderr(), "{payload}")
            .map_err(|err| DispatchError::DispatchFailed(err.to_string()))
    }
}

/// Sink that appends JSON lines to a file.
#[derive(Debug)]
pub struct FileNotificationSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileNotificationSink {
    /// Opens the notification log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl NotificationSink for FileNotificationSink {
    fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(event)
            .map_err(|err| DispatchError::DispatchFailed(err.to_string()))?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| DispatchError::DispatchFailed("notification file mutex poisoned".to_string()))?;
        writeln!(file, "{payload}").map_err(|err| DispatchError::DispatchFailed(err.to_string()))?;
        file.flush().map_err(|err| DispatchError::DispatchFailed(err.to_string()))
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn dispatch(&self, _event: &NotificationEvent) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Sink that keeps events in memory for inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    /// Captured events in dispatch order.
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl InMemoryNotificationSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured events.
    #[must_use]
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Removes and returns the captured events.
    pub fn drain(&self) -> Vec<NotificationEvent> {
        self.events.lock().map(|mut events| std::mem::take(&mut *events)).unwrap_or_default()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        self.events
            .lock()
            .map_err(|_| DispatchError::DispatchFailed("notification buffer mutex poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

impl<S> NotificationSink for Box<S>
where
    S: NotificationSink + ?Sized,
{
    fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        (**self).dispatch(event)
    }
}
