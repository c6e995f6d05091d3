//! Submitted video files.
//!
//! A [`SubmittedFile`] is an immutable name + bytes pair. Identity is its
//! position in the batch, so two files may share a name.

use std::{fmt, fs, path::Path, sync::Arc};

use crate::error::FramepackError;

/// Largest file accepted for extraction (1 GiB).
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// File extensions recognized as video.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mpeg", ".mpg", ".ogg", ".ogv", ".webm", ".mov", ".avi", ".mkv", ".ts", ".mts",
    ".m2ts", ".3gp", ".3g2",
];

/// A video file submitted for extraction.
#[derive(Clone)]
pub struct SubmittedFile {
    name: String,
    data: Arc<[u8]>,
}

impl fmt::Debug for SubmittedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmittedFile")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

impl SubmittedFile {
    /// Wrap in-memory bytes under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`FramepackError::InvalidInput`] if `name` is empty.
    pub fn new(
        name: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self, FramepackError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FramepackError::InvalidInput(
                "file name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            data: data.into(),
        })
    }

    /// Read a file from disk. The submitted name is the path's file name.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramepackError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FramepackError::InvalidInput(format!("{} has no file name", path.display()))
            })?;
        let data = fs::read(path)?;
        Self::new(name, data)
    }

    /// Original file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// File contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The name with its last extension removed.
    ///
    /// A name that is nothing but an extension (`.mp4`) is kept whole.
    pub fn base_name(&self) -> &str {
        strip_extension(&self.name)
    }
}

pub(crate) fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) if dot + 1 == name.len() => name,
        Some(dot) => &name[..dot],
    }
}

/// Whether `name` carries one of the [`VIDEO_EXTENSIONS`].
pub fn has_video_extension(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|extension| lowered.ends_with(extension))
}

/// Check a path before reading it: known video extension, at most
/// [`MAX_FILE_SIZE`] bytes. Returns the file size.
pub fn check_video_path<P: AsRef<Path>>(path: P) -> Result<u64, FramepackError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !has_video_extension(&name) {
        return Err(FramepackError::InvalidInput(format!(
            "{} is not a recognized video file",
            path.display()
        )));
    }

    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(FramepackError::InvalidInput(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(FramepackError::InvalidInput(format!(
            "{} exceeds the 1 GiB size limit",
            path.display()
        )));
    }
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_last_extension() {
        assert_eq!(strip_extension("clip.mp4"), "clip");
        assert_eq!(strip_extension("archive.tar.mkv"), "archive.tar");
        assert_eq!(strip_extension("noext"), "noext");
        assert_eq!(strip_extension(".mp4"), ".mp4");
        assert_eq!(strip_extension("trailing."), "trailing.");
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(SubmittedFile::new("", Vec::<u8>::new()).is_err());
        assert!(SubmittedFile::new("   ", Vec::<u8>::new()).is_err());
    }

    #[test]
    fn reports_size_and_name() {
        let file = SubmittedFile::new("holiday.MOV", vec![0u8; 42]).unwrap();
        assert_eq!(file.size(), 42);
        assert_eq!(file.base_name(), "holiday");
        assert!(has_video_extension(file.name()));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_video_extension("A.MKV"));
        assert!(has_video_extension("b.m2ts"));
        assert!(!has_video_extension("notes.txt"));
        assert!(!has_video_extension("mp4"));
    }

    #[test]
    fn path_check_rejects_unknown_extensions() {
        let directory = tempfile::tempdir().unwrap();
        let text = directory.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(check_video_path(&text).is_err());

        let video = directory.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        assert_eq!(check_video_path(&video).unwrap(), 18);

        let file = SubmittedFile::open(&video).unwrap();
        assert_eq!(file.name(), "clip.mp4");
        assert_eq!(file.data(), b"not really a video");
    }
}
