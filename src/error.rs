//! Error types for the `framepack` crate.
//!
//! This module defines [`FramepackError`], the unified error type returned by
//! all fallible operations in the crate. Per-file extraction failures are not
//! errors at the batch level: they are folded into
//! [`JobOutcome`](crate::JobOutcome)s and archive placeholders. Only start
//! preconditions and archive serialization failures reach the caller.

use std::io::Error as IoError;

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;
use zip::result::ZipError;

/// The unified error type for all `framepack` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramepackError {
    /// The decoding engine has not been loaded.
    ///
    /// Raised before a batch starts; no file is touched.
    #[error("Decoding engine is not loaded")]
    EngineUnavailable,

    /// A single engine operation failed (missing virtual file, scratch I/O,
    /// decoder setup).
    #[error("Engine error: {0}")]
    Engine(String),

    /// A submitted file or argument was rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The batch was asked to do something its current state does not allow.
    #[error("Invalid batch state: {0}")]
    InvalidState(String),

    /// The archive could not be serialized. Fatal to the run.
    #[error("Failed to serialize archive: {0}")]
    ArchiveSerialization(String),

    /// The run was stopped via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for FramepackError {
    fn from(error: FfmpegError) -> Self {
        FramepackError::FfmpegError(error.to_string())
    }
}

impl From<ZipError> for FramepackError {
    fn from(error: ZipError) -> Self {
        FramepackError::ArchiveSerialization(error.to_string())
    }
}
