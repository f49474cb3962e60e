//! Fatal-termination hook.

use parking_lot::Mutex;
use std::sync::Arc;

/// Capability for stopping the process on unrecoverable conditions.
///
/// The engine never exits the process directly; it requests termination
/// through this hook so tests can assert that termination was demanded
/// without ending the test process. The host must treat a call as a
/// guarantee that no further processing happens.
pub trait ErrorStateHandler: Send + Sync {
    /// Requests process termination with a descriptive message.
    fn terminate(&self, message: &str);
}

/// An error-state handler that records termination requests.
#[derive(Debug, Default, Clone)]
pub struct RecordingErrorHandler {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingErrorHandler {
    /// Creates a new recording handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if termination was requested at least once.
    pub fn terminated(&self) -> bool {
        !self.messages.lock().is_empty()
    }

    /// Returns all recorded termination messages.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl ErrorStateHandler for RecordingErrorHandler {
    fn terminate(&self, message: &str) {
        tracing::error!(message, "termination requested");
        self.messages.lock().push(message.to_string());
    }
}
