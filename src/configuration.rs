//! Batch configuration.
//!
//! [`FilterSettings`] holds the two user-tunable heuristics of the frame
//! selector plus output quality. [`BatchOptions`] threads those settings,
//! a progress callback, and a cancellation token through a batch run.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use framepack::{BatchOptions, BatchProgress, CancellationToken, FilterSettings, ProgressCallback};
//!
//! struct PrintProgress;
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &BatchProgress) {
//!         println!("{}%", info.percent);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = BatchOptions::new()
//!     .with_filter(FilterSettings::new().with_frame_difference(3).with_frame_interval(150))
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default scene-difference threshold, in percent.
pub const DEFAULT_FRAME_DIFFERENCE: u32 = 5;

/// Default minimum spacing between interval captures, in frames.
pub const DEFAULT_FRAME_INTERVAL: u32 = 250;

/// Default `-q:v` value handed to the engine.
pub const DEFAULT_QUALITY: u32 = 6;

/// Settings that shape the frame-selection filter.
///
/// A frame is kept when its scene score exceeds
/// [`scene_threshold`](FilterSettings::scene_threshold) or when its index is a
/// multiple of the frame interval. Near-duplicate frames are then dropped by
/// `mpdecimate` unless decimation is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSettings {
    frame_difference: u32,
    frame_interval: u32,
    quality: u32,
    decimate: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            frame_difference: DEFAULT_FRAME_DIFFERENCE,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            quality: DEFAULT_QUALITY,
            decimate: true,
        }
    }
}

impl FilterSettings {
    /// Create settings with the defaults: 5 %, every 250 frames, quality 6.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scene-difference threshold in percent. Clamped to 1 – 100.
    #[must_use]
    pub fn with_frame_difference(mut self, percent: u32) -> Self {
        self.frame_difference = percent.clamp(1, 100);
        self
    }

    /// Set the frame interval. Clamped to 1 – 1000.
    #[must_use]
    pub fn with_frame_interval(mut self, frames: u32) -> Self {
        self.frame_interval = frames.clamp(1, 1000);
        self
    }

    /// Set the `-q:v` quality scale (2 best – 31 worst). Clamped to 1 – 31.
    #[must_use]
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality.clamp(1, 31);
        self
    }

    /// Enable or disable near-duplicate decimation. Enabled by default.
    #[must_use]
    pub fn with_decimate(mut self, decimate: bool) -> Self {
        self.decimate = decimate;
        self
    }

    /// Scene-difference threshold in percent.
    pub fn frame_difference(&self) -> u32 {
        self.frame_difference
    }

    /// Frame interval.
    pub fn frame_interval(&self) -> u32 {
        self.frame_interval
    }

    /// Quality scale.
    pub fn quality(&self) -> u32 {
        self.quality
    }

    /// Whether decimation is enabled.
    pub fn decimate(&self) -> bool {
        self.decimate
    }

    /// The scene score threshold as the `select` filter expects it (0 – 1).
    pub fn scene_threshold(&self) -> f64 {
        f64::from(self.frame_difference) / 100.0
    }

    /// The filtergraph description passed to the engine with `-vf`.
    ///
    /// ```
    /// use framepack::FilterSettings;
    ///
    /// assert_eq!(
    ///     FilterSettings::new().filter_expression(),
    ///     "select=gt(scene\\,0.05)+not(mod(n\\,250)),mpdecimate=hi=64:lo=32:frac=0.33,showinfo",
    /// );
    /// ```
    pub fn filter_expression(&self) -> String {
        let select = format!(
            "select=gt(scene\\,{})+not(mod(n\\,{}))",
            self.scene_threshold(),
            self.frame_interval
        );
        if self.decimate {
            format!("{select},mpdecimate=hi=64:lo=32:frac=0.33,showinfo")
        } else {
            format!("{select},showinfo")
        }
    }
}

/// Language of the note left in a folder when a file produced no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderLanguage {
    /// English. The default.
    #[default]
    English,
    /// Russian.
    Russian,
}

impl PlaceholderLanguage {
    /// The placeholder text for `file_name`.
    pub fn no_frames_note(self, file_name: &str) -> String {
        match self {
            PlaceholderLanguage::English => format!("No screenshots produced for {file_name}"),
            PlaceholderLanguage::Russian => {
                format!("Не удалось создать скриншоты для {file_name}")
            }
        }
    }
}

/// Configuration for a batch run.
///
/// All fields have defaults; a default-constructed value runs with
/// [`FilterSettings::default`], no progress callback, and no cancellation.
#[derive(Clone)]
pub struct BatchOptions {
    pub(crate) filter: FilterSettings,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) placeholder_language: PlaceholderLanguage,
}

impl Debug for BatchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BatchOptions")
            .field("filter", &self.filter)
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("placeholder_language", &self.placeholder_language)
            .finish()
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            filter: FilterSettings::default(),
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            placeholder_language: PlaceholderLanguage::default(),
        }
    }

    /// Set the frame-selection settings.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterSettings) -> Self {
        self.filter = filter;
        self
    }

    /// Attach a progress callback, invoked on every state change.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token, checked before each file.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Choose the language of the no-frames placeholder.
    #[must_use]
    pub fn with_placeholder_language(mut self, language: PlaceholderLanguage) -> Self {
        self.placeholder_language = language;
        self
    }

    /// The frame-selection settings.
    pub fn filter(&self) -> &FilterSettings {
        &self.filter
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
