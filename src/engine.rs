//! The decoding engine boundary.
//!
//! An [`Engine`] turns video bytes into named image outputs given an
//! FFmpeg-style argument list. Inputs and outputs live in the engine's own
//! virtual filesystem: callers write the input under a name, execute a
//! command, list the directory to discover outputs, then read and delete
//! them. [`FfmpegEngine`](crate::FfmpegEngine) is the production
//! implementation.
//!
//! An engine session is single-tenant. The batch owns its engine through
//! `&mut` and never issues two commands at once, and the virtual filesystem
//! is cleared of one job's files before the next job writes its input.

use std::sync::Arc;

use crate::{error::FramepackError, progress::ProgressPayload};

/// An event emitted by the engine while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A diagnostic line.
    Log {
        /// The message text.
        message: String,
    },
    /// Progress of the command currently executing.
    Progress(ProgressPayload),
}

/// Receives [`EngineEvent`]s from an engine.
pub trait EngineListener: Send + Sync {
    /// Called for every event. Must not block.
    fn on_event(&self, event: &EngineEvent);
}

/// One entry of a virtual directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name, without any directory part.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirEntry {
    /// A regular file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }
}

/// A single-tenant decoding session with a virtual filesystem.
pub trait Engine {
    /// Whether [`load`](Engine::load) has completed.
    fn is_loaded(&self) -> bool;

    /// Initialize the engine. Idempotent.
    fn load(&mut self) -> Result<(), FramepackError>;

    /// Store `data` under `name` in the virtual filesystem.
    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), FramepackError>;

    /// Execute a command and return its exit status (0 = success).
    ///
    /// `Err` is reserved for the engine itself being unusable; a command that
    /// runs and fails reports a non-zero status instead.
    fn exec(&mut self, args: &[String]) -> Result<i32, FramepackError>;

    /// List the entries of a virtual directory. `"/"` is the root.
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, FramepackError>;

    /// Read a virtual file.
    fn read_file(&self, name: &str) -> Result<Vec<u8>, FramepackError>;

    /// Delete a virtual file.
    fn delete_file(&mut self, name: &str) -> Result<(), FramepackError>;

    /// Route events to `listener`, replacing any previous one.
    fn attach(&mut self, listener: Arc<dyn EngineListener>);

    /// Stop delivering events.
    fn detach(&mut self);
}
