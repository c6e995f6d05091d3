//! # framepack
//!
//! Batch-extract representative frames from video files and pack them into a
//! single archive.
//!
//! `framepack` runs every submitted video through an FFmpeg filter that keeps
//! frames at scene changes and at a fixed interval, drops near-duplicates, and
//! collects the surviving frames as PNG images, one folder per video, in one
//! ZIP archive. While the batch runs, per-file decoder progress is folded into
//! a single whole-batch percentage.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framepack::{Batch, BatchOptions, Engine, FfmpegEngine, FilterSettings, SubmittedFile};
//!
//! let mut engine = FfmpegEngine::new();
//! engine.load()?;
//!
//! let options = BatchOptions::new()
//!     .with_filter(FilterSettings::new().with_frame_difference(8).with_frame_interval(300));
//! let mut batch = Batch::new(engine, options);
//! batch.add_file(SubmittedFile::open("intro.mp4")?)?;
//! batch.add_file(SubmittedFile::open("talk.webm")?)?;
//!
//! let archive = batch.run()?;
//! std::fs::write(&archive.file_name, &archive.data)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Progress
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framepack::{BatchOptions, BatchProgress, ProgressCallback};
//!
//! struct Printer;
//!
//! impl ProgressCallback for Printer {
//!     fn on_progress(&self, info: &BatchProgress) {
//!         println!("{:>3}% {:?}", info.percent, info.current_file);
//!     }
//! }
//!
//! let options = BatchOptions::new().with_progress(Arc::new(Printer));
//! ```
//!
//! Extraction owns 95 % of the bar, split evenly across files; archive
//! compression owns the last 5 %.
//!
//! ## Failure policy
//!
//! A file that fails to decode, or yields no frames, does not stop the batch:
//! its folder receives a `README.txt` note instead of images. Only an
//! unloaded engine and a failed archive serialization are reported as errors.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod archive;
pub mod batch;
pub mod collector;
pub mod configuration;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod input;
pub mod job;
pub mod progress;

pub use archive::{
    ArchiveEntry, ArchiveFolder, ArchiveTree, ArchiveWriter, FinishedArchive, PLACEHOLDER_NAME,
    ZipArchiveWriter, archive_file_name,
};
pub use batch::{Batch, BatchState};
pub use collector::collect;
pub use configuration::{
    BatchOptions, DEFAULT_FRAME_DIFFERENCE, DEFAULT_FRAME_INTERVAL, DEFAULT_QUALITY,
    FilterSettings, PlaceholderLanguage,
};
pub use engine::{DirEntry, Engine, EngineEvent, EngineListener};
pub use error::FramepackError;
pub use ffmpeg::{FfmpegEngine, FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use input::{
    MAX_FILE_SIZE, SubmittedFile, VIDEO_EXTENSIONS, check_video_path, has_video_extension,
};
pub use job::{ExtractionJob, JobOutcome, JobStatus};
pub use progress::{
    ARCHIVE_WEIGHT, BatchPhase, BatchProgress, BatchProgressState, CancellationToken,
    EXTRACTION_WEIGHT, ProgressCallback, ProgressPayload,
};
