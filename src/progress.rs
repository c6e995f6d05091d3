//! Whole-batch progress aggregation and cancellation support.
//!
//! The decoding engine reports progress for the file it is currently working
//! on, as either a `progress` ratio (0.0 – 1.0) or a `percent` value
//! (0 – 100). [`ProgressPayload`] normalizes both shapes once, at the engine
//! boundary. [`BatchProgressState`] then folds the current job's fraction, the
//! number of completed jobs, and the archive compression progress into a
//! single percentage for the whole batch.
//!
//! # Example
//!
//! ```
//! use framepack::{BatchProgressState, ProgressPayload};
//!
//! let mut state = BatchProgressState::new(4);
//! state.completed = 1;
//! state.current_job_fraction = ProgressPayload::Percent(50.0).fraction();
//!
//! // (25 + 12.5) * 0.95 = 35.6
//! assert_eq!(state.percent(), 36);
//! ```

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::engine::{EngineEvent, EngineListener};

/// Share of the blended percentage owned by frame extraction.
pub const EXTRACTION_WEIGHT: f64 = 0.95;

/// Share of the blended percentage owned by archive compression.
pub const ARCHIVE_WEIGHT: f64 = 0.05;

/// A progress report emitted by the engine or the archive writer.
///
/// Both shapes describe the same ratio; [`fraction`](ProgressPayload::fraction)
/// maps either onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressPayload {
    /// A `progress` field in `[0, 1]`.
    Ratio(f64),
    /// A `percent` field in `[0, 100]`.
    Percent(f64),
}

impl ProgressPayload {
    /// Build a payload from the two optional fields an event may carry.
    ///
    /// [`FfmpegEngine`](crate::FfmpegEngine) emits typed payloads directly;
    /// this and [`from_json`](ProgressPayload::from_json) are for external
    /// [`Engine`](crate::Engine) implementations whose progress arrives as
    /// loose `progress`/`percent` fields.
    ///
    /// `progress` wins when both are present. Returns `None` when neither is,
    /// or when the value present is not a finite number.
    pub fn from_fields(progress: Option<f64>, percent: Option<f64>) -> Option<Self> {
        match (progress, percent) {
            (Some(ratio), _) if ratio.is_finite() => Some(ProgressPayload::Ratio(ratio)),
            (_, Some(percent)) if percent.is_finite() => Some(ProgressPayload::Percent(percent)),
            _ => None,
        }
    }

    /// Parse a loosely-typed event object such as `{"progress": 0.4}` or
    /// `{"percent": 40}`.
    pub fn from_json(event: &Value) -> Option<Self> {
        Self::from_fields(
            event.get("progress").and_then(Value::as_f64),
            event.get("percent").and_then(Value::as_f64),
        )
    }

    /// The payload as a fraction, clamped to `[0, 1]`.
    pub fn fraction(self) -> f64 {
        let raw = match self {
            ProgressPayload::Ratio(ratio) => ratio,
            ProgressPayload::Percent(percent) => percent / 100.0,
        };
        raw.clamp(0.0, 1.0)
    }
}

/// The raw inputs of the whole-batch percentage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchProgressState {
    /// Number of files in the batch.
    pub total: usize,
    /// Jobs that have finished, successfully or not.
    pub completed: usize,
    /// Engine progress of the job in flight, in `[0, 1]`.
    pub current_job_fraction: f64,
    /// Archive compression progress, in `[0, 1]`.
    pub archive_fraction: f64,
}

impl BatchProgressState {
    /// Initial state for a batch of `total` files.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Weight of a single file in the extraction contribution (0 – 100).
    pub fn per_file_weight(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 / self.total as f64
        }
    }

    /// Extraction contribution in `[0, 100]`, before blending.
    ///
    /// Completed files count fully; the file in flight counts in proportion
    /// to its own engine progress.
    pub fn extraction_contribution(&self) -> f64 {
        let weight = self.per_file_weight();
        self.completed as f64 * weight + self.current_job_fraction * 100.0 * (weight / 100.0)
    }

    /// The blended whole-batch percentage.
    pub fn percent(&self) -> u8 {
        let blended = self.extraction_contribution() * EXTRACTION_WEIGHT
            + self.archive_fraction * 100.0 * ARCHIVE_WEIGHT;
        blended.round().clamp(0.0, 100.0) as u8
    }

    /// `true` once the blended percentage reaches 100.
    pub fn is_done(&self) -> bool {
        self.percent() >= 100
    }
}

/// What the batch is doing when a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BatchPhase {
    /// Running the job for the file at this index.
    Extracting(usize),
    /// Serializing the archive.
    Archiving,
    /// The run has ended.
    Finished,
}

/// A snapshot of batch progress delivered to [`ProgressCallback::on_progress`].
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// Current phase.
    pub phase: BatchPhase,
    /// Blended whole-batch percentage (0 – 100).
    pub percent: u8,
    /// The state the percentage was computed from.
    pub state: BatchProgressState,
    /// Name of the file being processed, while extracting.
    pub current_file: Option<String>,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
}

/// Trait for receiving progress updates during a batch run.
///
/// Implementations must be [`Send`] and [`Sync`] because engine events may be
/// delivered from whichever thread the engine reports on.
pub trait ProgressCallback: Send + Sync {
    /// Called every time the batch state changes.
    fn on_progress(&self, info: &BatchProgress);

    /// Called for engine log lines while a run is active.
    fn on_message(&self, _message: &str) {}
}

/// Discards all notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &BatchProgress) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// The batch checks the token between files only; a job already handed to
/// the engine always runs to completion.
///
/// # Example
///
/// ```
/// use framepack::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

struct TrackerState {
    progress: BatchProgressState,
    phase: BatchPhase,
    current_file: Option<String>,
    active: bool,
    started_at: Instant,
}

/// Owns the [`BatchProgressState`] of one batch and notifies the callback.
///
/// Registered with the engine as its [`EngineListener`] for the duration of a
/// run. Events arriving while no run is active are ignored.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>) -> Self {
        Self {
            callback,
            state: Mutex::new(TrackerState {
                progress: BatchProgressState::default(),
                phase: BatchPhase::Finished,
                current_file: None,
                active: false,
                started_at: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // A panicking callback must not wedge the batch.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current raw state.
    pub(crate) fn snapshot(&self) -> BatchProgressState {
        self.lock().progress
    }

    pub(crate) fn begin_run(&self, total: usize) {
        let mut state = self.lock();
        state.progress = BatchProgressState::new(total);
        state.phase = if total > 0 {
            BatchPhase::Extracting(0)
        } else {
            BatchPhase::Archiving
        };
        state.current_file = None;
        state.active = true;
        state.started_at = Instant::now();
        drop(state);
        self.notify();
    }

    pub(crate) fn start_job(&self, index: usize, file_name: &str) {
        self.update(|state| {
            state.phase = BatchPhase::Extracting(index);
            state.current_file = Some(file_name.to_string());
            state.progress.current_job_fraction = 0.0;
        });
    }

    pub(crate) fn complete_job(&self) {
        self.update(|state| {
            state.progress.completed = (state.progress.completed + 1).min(state.progress.total);
            state.progress.current_job_fraction = 0.0;
        });
    }

    pub(crate) fn start_archive(&self) {
        self.update(|state| {
            state.phase = BatchPhase::Archiving;
            state.current_file = None;
            state.progress.current_job_fraction = 0.0;
        });
    }

    pub(crate) fn set_archive_progress(&self, payload: ProgressPayload) {
        self.update(|state| {
            state.progress.archive_fraction = payload.fraction();
        });
    }

    /// Mark the run as ended. Later engine events are ignored.
    pub(crate) fn finish(&self) {
        self.update(|state| {
            state.phase = BatchPhase::Finished;
            state.current_file = None;
        });
        self.lock().active = false;
    }

    /// Return to the initial state without notifying.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        state.progress = BatchProgressState::default();
        state.phase = BatchPhase::Finished;
        state.current_file = None;
        state.active = false;
    }

    fn update(&self, change: impl FnOnce(&mut TrackerState)) {
        {
            let mut state = self.lock();
            if !state.active {
                return;
            }
            change(&mut state);
        }
        self.notify();
    }

    fn notify(&self) {
        let info = {
            let state = self.lock();
            BatchProgress {
                phase: state.phase,
                percent: state.progress.percent(),
                state: state.progress,
                current_file: state.current_file.clone(),
                elapsed: state.started_at.elapsed(),
            }
        };
        self.callback.on_progress(&info);
    }
}

impl EngineListener for ProgressTracker {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Progress(payload) => self.update(|state| {
                if matches!(state.phase, BatchPhase::Extracting(_)) {
                    state.progress.current_job_fraction = payload.fraction();
                }
            }),
            EngineEvent::Log { message } => {
                if self.lock().active {
                    self.callback.on_message(message);
                }
            }
        }
    }
}
