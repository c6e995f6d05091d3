//! The batch orchestrator.
//!
//! A [`Batch`] owns its engine and runs one [`ExtractionJob`] per submitted
//! file, strictly one after another, harvesting each job's frames into an
//! [`ArchiveTree`]. When every file has been processed the tree is serialized
//! into a single archive.
//!
//! The run is a small state machine:
//!
//! ```text
//! Idle ──start──▶ Running(0) ──▶ Running(1) ──▶ … ──▶ Finalizing ──▶ Done
//!                                                          └──────▶ Failed
//! ```
//!
//! [`advance`](Batch::advance) performs exactly one transition;
//! [`run`](Batch::run) advances until the archive is ready.
//! [`reset`](Batch::reset) returns to `Idle` from any state.
//!
//! # Example
//!
//! ```no_run
//! use framepack::{Batch, BatchOptions, Engine, FfmpegEngine, SubmittedFile};
//!
//! let mut engine = FfmpegEngine::new();
//! engine.load()?;
//!
//! let mut batch = Batch::new(engine, BatchOptions::default());
//! batch.add_file(SubmittedFile::open("lecture.mp4")?)?;
//!
//! let archive = batch.run()?;
//! std::fs::write(&archive.file_name, &archive.data)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    archive::{ArchiveTree, ArchiveWriter, FinishedArchive, ZipArchiveWriter, archive_file_name},
    collector::collect,
    configuration::BatchOptions,
    engine::Engine,
    error::FramepackError,
    input::SubmittedFile,
    job::{ExtractionJob, JobOutcome},
    progress::{BatchProgressState, ProgressPayload, ProgressTracker},
};

/// Where a [`Batch`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Accepting files; no run in progress.
    Idle,
    /// About to process the file at this index.
    Running(usize),
    /// Every file has been processed; the archive is next.
    Finalizing,
    /// The archive is ready.
    Done,
    /// The archive could not be serialized. Only [`Batch::reset`] leaves this
    /// state.
    Failed,
}

impl BatchState {
    /// `true` between start and the end of the run.
    pub fn is_active(self) -> bool {
        matches!(self, BatchState::Running(_) | BatchState::Finalizing)
    }
}

impl Display for BatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Idle => write!(f, "idle"),
            BatchState::Running(index) => write!(f, "running file #{index}"),
            BatchState::Finalizing => write!(f, "finalizing"),
            BatchState::Done => write!(f, "done"),
            BatchState::Failed => write!(f, "failed"),
        }
    }
}

/// A batch of video files and the engine that processes them.
pub struct Batch<E: Engine, W: ArchiveWriter = ZipArchiveWriter> {
    engine: E,
    writer: W,
    options: BatchOptions,
    files: Vec<SubmittedFile>,
    state: BatchState,
    tree: ArchiveTree,
    outcomes: Vec<JobOutcome>,
    tracker: Arc<ProgressTracker>,
    started_at: Option<DateTime<Utc>>,
    archive: Option<FinishedArchive>,
}

impl<E: Engine, W: ArchiveWriter> Debug for Batch<E, W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("state", &self.state)
            .field("files", &self.files)
            .field("progress", &self.tracker.snapshot())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<E: Engine> Batch<E> {
    /// Create an empty batch that writes ZIP archives.
    pub fn new(engine: E, options: BatchOptions) -> Self {
        Self::with_writer(engine, ZipArchiveWriter::new(), options)
    }
}

impl<E: Engine, W: ArchiveWriter> Batch<E, W> {
    /// Create an empty batch with a custom archive writer.
    pub fn with_writer(engine: E, writer: W, options: BatchOptions) -> Self {
        let tracker = Arc::new(ProgressTracker::new(Arc::clone(&options.progress)));
        Self {
            engine,
            writer,
            options,
            files: Vec::new(),
            state: BatchState::Idle,
            tree: ArchiveTree::new(),
            outcomes: Vec::new(),
            tracker,
            started_at: None,
            archive: None,
        }
    }

    /// Submit a file.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::InvalidState`] unless the batch is idle.
    pub fn add_file(&mut self, file: SubmittedFile) -> Result<(), FramepackError> {
        self.ensure_idle("add files")?;
        self.files.push(file);
        Ok(())
    }

    /// Submit several files, in order.
    pub fn add_files<I>(&mut self, files: I) -> Result<(), FramepackError>
    where
        I: IntoIterator<Item = SubmittedFile>,
    {
        self.ensure_idle("add files")?;
        self.files.extend(files);
        Ok(())
    }

    /// Withdraw the file at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::InvalidState`] unless the batch is idle, or
    /// [`FramepackError::InvalidInput`] if `index` is out of range.
    pub fn remove_file(&mut self, index: usize) -> Result<SubmittedFile, FramepackError> {
        self.ensure_idle("remove files")?;
        if index >= self.files.len() {
            return Err(FramepackError::InvalidInput(format!(
                "no file at position {index} (batch holds {})",
                self.files.len()
            )));
        }
        Ok(self.files.remove(index))
    }

    /// Submitted files, in order.
    pub fn files(&self) -> &[SubmittedFile] {
        &self.files
    }

    /// Current state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// The options the batch was created with.
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Raw progress state.
    pub fn progress(&self) -> BatchProgressState {
        self.tracker.snapshot()
    }

    /// Blended whole-batch percentage.
    pub fn percent(&self) -> u8 {
        self.progress().percent()
    }

    /// `true` once the archive is ready.
    pub fn is_done(&self) -> bool {
        self.state == BatchState::Done
    }

    /// Per-file results of the current run, in processing order.
    pub fn outcomes(&self) -> &[JobOutcome] {
        &self.outcomes
    }

    /// The archive tree accumulated so far.
    pub fn archive_tree(&self) -> &ArchiveTree {
        &self.tree
    }

    /// Suggested name of the archive, once a run has started.
    pub fn archive_name(&self) -> Option<String> {
        self.started_at.map(archive_file_name)
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The engine, mutably. Intended for loading it before a run.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Start a run over the submitted files.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::InvalidState`] unless the batch is idle, and
    /// [`FramepackError::EngineUnavailable`] if the engine is not loaded. In
    /// both cases the run does not start.
    pub fn start(&mut self) -> Result<BatchState, FramepackError> {
        self.ensure_idle("start")?;
        if !self.engine.is_loaded() {
            return Err(FramepackError::EngineUnavailable);
        }

        let total = self.files.len();
        log::debug!("Starting batch of {total} file(s)");

        self.tree.clear();
        self.outcomes.clear();
        self.archive = None;
        self.started_at = Some(Utc::now());
        self.tracker.begin_run(total);
        self.engine.attach(self.tracker.clone());

        self.state = if total == 0 {
            BatchState::Finalizing
        } else {
            BatchState::Running(0)
        };
        Ok(self.state)
    }

    /// Perform exactly one state transition and return the new state.
    ///
    /// # Errors
    ///
    /// - Start errors, see [`start`](Batch::start).
    /// - [`FramepackError::Cancelled`] when the cancellation token fired
    ///   before the next file. The run is abandoned and the batch is idle
    ///   again, with its files.
    /// - [`FramepackError::ArchiveSerialization`] when finalization fails.
    ///   The batch is then [`Failed`](BatchState::Failed).
    /// - [`FramepackError::InvalidState`] once the run is over.
    pub fn advance(&mut self) -> Result<BatchState, FramepackError> {
        match self.state {
            BatchState::Idle => self.start(),
            BatchState::Running(index) => {
                if self.options.is_cancelled() {
                    log::info!("Batch cancelled before file #{index}");
                    self.abandon();
                    return Err(FramepackError::Cancelled);
                }
                self.process(index);
                self.state = if index + 1 < self.files.len() {
                    BatchState::Running(index + 1)
                } else {
                    BatchState::Finalizing
                };
                Ok(self.state)
            }
            BatchState::Finalizing => self.finalize(),
            BatchState::Done | BatchState::Failed => Err(FramepackError::InvalidState(format!(
                "the run is over ({}); reset the batch first",
                self.state
            ))),
        }
    }

    /// Run every remaining transition and hand out the archive.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Batch::advance).
    pub fn run(&mut self) -> Result<FinishedArchive, FramepackError> {
        while self.state != BatchState::Done {
            self.advance()?;
        }
        self.take_archive().ok_or_else(|| {
            FramepackError::InvalidState("the archive has already been taken".to_string())
        })
    }

    /// Take the finished archive. Returns `Some` once per run.
    pub fn take_archive(&mut self) -> Option<FinishedArchive> {
        if self.state == BatchState::Done {
            self.archive.take()
        } else {
            None
        }
    }

    /// Return to `Idle`, discarding the files, the archive tree, the outcomes,
    /// and the progress. A run in flight is abandoned.
    pub fn reset(&mut self) {
        if self.state.is_active() {
            log::debug!("Abandoning batch while {}", self.state);
        }
        self.engine.detach();
        self.tracker.reset();
        self.files.clear();
        self.tree.clear();
        self.outcomes.clear();
        self.started_at = None;
        self.archive = None;
        self.state = BatchState::Idle;
    }

    fn ensure_idle(&self, action: &str) -> Result<(), FramepackError> {
        if self.state == BatchState::Idle {
            Ok(())
        } else {
            Err(FramepackError::InvalidState(format!(
                "cannot {action} while {}",
                self.state
            )))
        }
    }

    /// One file: stage, execute, harvest.
    fn process(&mut self, index: usize) {
        let file = self.files[index].clone();
        self.tracker.start_job(index, file.name());

        let job = ExtractionJob::new(index, &file, &self.options.filter);
        let status = job.run(&mut self.engine, &file);
        let folder = self.tree.create_folder(job.base_name());
        let artifact_count = collect(
            &mut self.engine,
            &job,
            &folder,
            &mut self.tree,
            self.options.placeholder_language,
        );
        let outcome = JobOutcome {
            index,
            file_name: file.name().to_string(),
            folder,
            status,
            artifact_count,
        };

        log::debug!(
            "File #{index} ({}) done: {} frame(s) into {}/",
            outcome.file_name,
            outcome.artifact_count,
            outcome.folder
        );
        self.outcomes.push(outcome);
        self.tracker.complete_job();
    }

    fn finalize(&mut self) -> Result<BatchState, FramepackError> {
        self.tracker.start_archive();
        let tracker = Arc::clone(&self.tracker);
        let result = self.writer.serialize(&self.tree, &mut |percent| {
            tracker.set_archive_progress(ProgressPayload::Percent(percent));
        });

        match result {
            Ok(data) => {
                self.tracker.set_archive_progress(ProgressPayload::Percent(100.0));
                let file_name = archive_file_name(self.started_at.unwrap_or_else(Utc::now));
                log::debug!("Archive {file_name} ready ({} bytes)", data.len());
                self.archive = Some(FinishedArchive {
                    file_name,
                    data,
                    entry_count: self.tree.entry_count(),
                });
                self.state = BatchState::Done;
                self.end_run();
                Ok(self.state)
            }
            Err(error) => {
                log::error!("Archive serialization failed: {error}");
                self.state = BatchState::Failed;
                self.end_run();
                Err(match error {
                    FramepackError::ArchiveSerialization(reason) => {
                        FramepackError::ArchiveSerialization(reason)
                    }
                    other => FramepackError::ArchiveSerialization(other.to_string()),
                })
            }
        }
    }

    /// Stop listening to the engine; later events are ignored.
    fn end_run(&mut self) {
        self.engine.detach();
        self.tracker.finish();
    }

    fn abandon(&mut self) {
        self.end_run();
        self.tracker.reset();
        self.tree.clear();
        self.outcomes.clear();
        self.started_at = None;
        self.state = BatchState::Idle;
    }
}
