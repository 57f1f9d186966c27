use std::sync::mpsc::Sender;
use std::time::Duration;

/// A single progress update emitted by the core. The excluded CLI wrapper
/// (or any other caller) drains a channel of these to render progress bars,
/// log lines, or metrics -- the core itself never decides how they are
/// displayed. See spec §6 "Progress & error reporting".
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: &'static str,
    pub source_id: Option<i32>,
    pub count: u64,
    pub elapsed: Duration,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: &'static str, source_id: Option<i32>, count: u64, elapsed: Duration) -> Self {
        ProgressEvent {
            phase,
            source_id,
            count,
            elapsed,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A thin wrapper around an optional sender so components don't have to
/// special-case "nobody is listening for progress".
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sender: Option<Sender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        ProgressReporter { sender: Some(sender) }
    }

    pub fn none() -> Self {
        ProgressReporter { sender: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            // progress reporting must never abort the pipeline; a dropped
            // receiver just means nobody is watching anymore.
            let _ = sender.send(event);
        }
    }
}
