//! The archive tree and its serialization.
//!
//! [`ArchiveTree`] accumulates harvested frames per file, in submission
//! order. At the end of a run an [`ArchiveWriter`] turns it into a single
//! blob; [`ZipArchiveWriter`] is the writer used by default.
//!
//! # Example
//!
//! ```
//! use framepack::{ArchiveTree, ArchiveWriter, ZipArchiveWriter};
//!
//! let mut tree = ArchiveTree::new();
//! let folder = tree.create_folder("clip");
//! tree.add_file(&folder, "clip_001.png", vec![0x89, b'P', b'N', b'G']);
//!
//! let mut last_percent = 0.0;
//! let bytes = ZipArchiveWriter::new().serialize(&tree, &mut |percent| last_percent = percent)?;
//! assert!(!bytes.is_empty());
//! assert_eq!(last_percent, 100.0);
//! # Ok::<(), framepack::FramepackError>(())
//! ```

use std::io::{Cursor, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::error::FramepackError;

/// Name of the note written into a folder whose file produced no frames.
pub const PLACEHOLDER_NAME: &str = "README.txt";

/// One file inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File name inside its folder.
    pub name: String,
    /// Contents.
    pub data: Vec<u8>,
}

/// A per-file folder of the archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveFolder {
    /// Folder name.
    pub name: String,
    /// Entries in insertion order.
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveFolder {
    /// `true` when the folder holds only the no-frames placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.entries.as_slice(), [entry] if entry.name == PLACEHOLDER_NAME)
    }
}

/// Folders of harvested frames, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveTree {
    folders: Vec<ArchiveFolder>,
}

impl ArchiveTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder named after `base_name` and return its actual name.
    ///
    /// Every submitted file gets a folder of its own: when `base_name` is
    /// already taken, ` (2)`, ` (3)`, … is appended.
    pub fn create_folder(&mut self, base_name: &str) -> String {
        let mut name = base_name.to_string();
        let mut suffix = 2;
        while self.folder(&name).is_some() {
            name = format!("{base_name} ({suffix})");
            suffix += 1;
        }
        self.folders.push(ArchiveFolder {
            name: name.clone(),
            entries: Vec::new(),
        });
        name
    }

    /// Append an entry to `folder`, creating the folder if needed.
    pub fn add_file(&mut self, folder: &str, name: impl Into<String>, data: Vec<u8>) {
        let entry = ArchiveEntry {
            name: name.into(),
            data,
        };
        match self.folders.iter_mut().find(|existing| existing.name == folder) {
            Some(existing) => existing.entries.push(entry),
            None => self.folders.push(ArchiveFolder {
                name: folder.to_string(),
                entries: vec![entry],
            }),
        }
    }

    /// Write the no-frames note into `folder`.
    pub fn add_placeholder(&mut self, folder: &str, text: &str) {
        self.add_file(folder, PLACEHOLDER_NAME, text.as_bytes().to_vec());
    }

    /// Look a folder up by name.
    pub fn folder(&self, name: &str) -> Option<&ArchiveFolder> {
        self.folders.iter().find(|folder| folder.name == name)
    }

    /// All folders, in submission order.
    pub fn folders(&self) -> &[ArchiveFolder] {
        &self.folders
    }

    /// Every entry as `(folder/name, data)`, in archive order.
    pub fn paths(&self) -> impl Iterator<Item = (String, &[u8])> + '_ {
        self.folders.iter().flat_map(|folder| {
            folder.entries.iter().map(move |entry| {
                (
                    format!("{}/{}", folder.name, entry.name),
                    entry.data.as_slice(),
                )
            })
        })
    }

    /// Total number of entries across all folders.
    pub fn entry_count(&self) -> usize {
        self.folders.iter().map(|folder| folder.entries.len()).sum()
    }

    /// Total payload size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.folders
            .iter()
            .flat_map(|folder| folder.entries.iter())
            .map(|entry| entry.data.len() as u64)
            .sum()
    }

    /// `true` when no folder has been added.
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Drop every folder.
    pub fn clear(&mut self) {
        self.folders.clear();
    }
}

/// Serializes an [`ArchiveTree`] into one blob.
pub trait ArchiveWriter {
    /// Serialize `tree`, reporting progress as a percentage (0 – 100).
    fn serialize(
        &mut self,
        tree: &ArchiveTree,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<u8>, FramepackError>;
}

/// Writes the tree as a ZIP archive, one directory per folder.
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveWriter {
    compression: CompressionMethod,
}

impl Default for ZipArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchiveWriter {
    /// A writer using DEFLATE compression.
    pub fn new() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
        }
    }

    /// Store entries without compression. PNG data barely compresses further.
    #[must_use]
    pub fn stored(mut self) -> Self {
        self.compression = CompressionMethod::Stored;
        self
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn serialize(
        &mut self,
        tree: &ArchiveTree,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<u8>, FramepackError> {
        let options = SimpleFileOptions::default().compression_method(self.compression);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        let total = tree.entry_count();
        let mut written = 0usize;
        progress(0.0);

        for folder in tree.folders() {
            writer.add_directory(format!("{}/", folder.name), options)?;
            for entry in &folder.entries {
                writer.start_file(format!("{}/{}", folder.name, entry.name), options)?;
                writer.write_all(&entry.data)?;
                written += 1;
                progress(written as f64 / total as f64 * 100.0);
            }
        }

        let bytes = writer.finish()?.into_inner();
        progress(100.0);
        log::debug!(
            "Serialized {total} entries ({} bytes of payload) into {} bytes",
            tree.total_bytes(),
            bytes.len()
        );
        Ok(bytes)
    }
}

/// The finished, serialized archive of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedArchive {
    /// Suggested file name (see [`archive_file_name`]).
    pub file_name: String,
    /// The serialized archive.
    pub data: Vec<u8>,
    /// Number of entries written.
    pub entry_count: usize,
}

/// Suggested archive name for a run started at `started_at`.
///
/// Sortable, and safe on every common filesystem:
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use framepack::archive_file_name;
///
/// let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
/// assert_eq!(archive_file_name(at), "frames_2026-10-16T08-30-00-000Z.zip");
/// ```
pub fn archive_file_name(started_at: DateTime<Utc>) -> String {
    let timestamp = started_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("frames_{timestamp}.zip")
}
