//! Background jobs and their plumbing.
//!
//! Every job runs on its own named thread. It receives immutable snapshots
//! at dispatch time and reports back exclusively through [`WorkerEvent`]s;
//! it never touches the orchestrator's stores. A job is either skipped
//! entirely (cancel requested before it started) or runs to completion
//! while holding the run lock of its kind.

pub mod calibration;
pub mod categorizer;
pub mod dictionary;
pub mod disparity;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::MessageConfig;
use crate::model::{CalibrationModel, ClassifierModel, DetectionResult, DistanceMeasurement};

pub use calibration::CalibrationJob;
pub use categorizer::CategorizerJob;
pub use dictionary::DictionaryJob;
pub use disparity::DisparityJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Calibration,
    Dictionary,
    Categorizer,
    Disparity,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Calibration,
        WorkerKind::Dictionary,
        WorkerKind::Categorizer,
        WorkerKind::Disparity,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            WorkerKind::Calibration => 0,
            WorkerKind::Dictionary => 1,
            WorkerKind::Categorizer => 2,
            WorkerKind::Disparity => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkerKind::Calibration => "calibration",
            WorkerKind::Dictionary => "dictionary",
            WorkerKind::Categorizer => "categorizer",
            WorkerKind::Disparity => "disparity",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Skipped because a cancel was requested before it started.
    Cancelled,
    /// Ran but produced no result; the reason was also sent as a message.
    Failed(String),
}

/// Notifications from a worker to the orchestrator.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Monotonic percentage; 100 means done.
    Progress { kind: WorkerKind, percent: u8 },
    Message {
        kind: WorkerKind,
        text: String,
        timeout: Duration,
    },
    Calibrated(Box<CalibrationModel>),
    DictionaryTrained(Box<ClassifierModel>),
    Detections(DetectionResult),
    Distance(DistanceMeasurement),
    /// Always the last event of a job.
    Finished { kind: WorkerKind, outcome: Outcome },
}

/// A job's channel back to the orchestrator.
#[derive(Debug, Clone)]
pub struct EventSink {
    kind: WorkerKind,
    sender: Sender<WorkerEvent>,
    messages: MessageConfig,
}

impl EventSink {
    pub fn new(kind: WorkerKind, sender: Sender<WorkerEvent>, messages: MessageConfig) -> Self {
        Self {
            kind,
            sender,
            messages,
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn progress(&self, percent: u8) {
        self.send(WorkerEvent::Progress {
            kind: self.kind,
            percent: percent.min(100),
        });
    }

    /// Short-lived diagnostic.
    pub fn message(&self, text: impl Into<String>) {
        self.message_for(text, self.messages.transient());
    }

    /// Informational status line.
    pub fn status(&self, text: impl Into<String>) {
        self.message_for(text, self.messages.status());
    }

    fn message_for(&self, text: impl Into<String>, timeout: Duration) {
        let text = text.into();
        debug!(worker = %self.kind, %text, "Worker message");
        self.send(WorkerEvent::Message {
            kind: self.kind,
            text,
            timeout,
        });
    }

    pub fn deliver(&self, event: WorkerEvent) {
        self.send(event);
    }

    fn send(&self, event: WorkerEvent) {
        if self.sender.send(event).is_err() {
            debug!(worker = %self.kind, "Orchestrator gone, dropping event");
        }
    }
}

/// Cancel request checked once, when a job starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending request, resetting the flag.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// A unit of background work.
pub trait Job: Send + 'static {
    const KIND: WorkerKind;

    /// Run to completion, reporting through `sink`.
    fn run(self, sink: &EventSink) -> Outcome;
}

/// Everything a job needs from its orchestrator besides its inputs.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub sender: Sender<WorkerEvent>,
    pub cancel: CancelToken,
    /// Held for the whole run; one instance of a kind at a time.
    pub run_lock: Arc<Mutex<()>>,
    pub messages: MessageConfig,
}

/// Handle to a spawned job.
#[derive(Debug)]
pub struct WorkerHandle {
    kind: WorkerKind,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// True once the job has delivered its events and returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = %self.kind, "Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.join_inner();
    }
}

/// Start `job` on a dedicated thread.
pub fn spawn<J: Job>(job: J, ctx: WorkerContext) -> io::Result<WorkerHandle> {
    let kind = J::KIND;
    let thread = thread::Builder::new()
        .name(format!("{kind}-worker"))
        .spawn(move || {
            let sink = EventSink::new(kind, ctx.sender, ctx.messages);
            let outcome = {
                let _running = ctx.run_lock.lock();
                if ctx.cancel.take() {
                    info!(worker = %kind, "Cancelled before start");
                    Outcome::Cancelled
                } else {
                    debug!(worker = %kind, "Started");
                    job.run(&sink)
                }
            };
            debug!(worker = %kind, ?outcome, "Finished");
            sink.deliver(WorkerEvent::Finished { kind, outcome });
        })?;
    Ok(WorkerHandle {
        kind,
        thread: Some(thread),
    })
}
