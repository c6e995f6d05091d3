//! FFmpeg-backed decoding engine and log level configuration.
//!
//! [`FfmpegEngine`] implements [`Engine`] on top of `ffmpeg-next`. Its
//! virtual filesystem is a private scratch directory that lives as long as
//! the engine. [`Engine::exec`] understands the subset of the `ffmpeg`
//! command line the extraction jobs use:
//!
//! ```text
//! -i <input> [-vf <filtergraph>] [-vsync 0] [-q:v <n>] <output pattern>
//! ```
//!
//! Every frame leaving the filter graph is encoded as PNG (or JPEG, when the
//! pattern ends in `.jpg`) and stored under the pattern's next number,
//! starting at 1.
//!
//! FFmpeg also has its own internal logging, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. [`set_ffmpeg_log_level`]
//! tunes what it prints to stderr.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use ffmpeg_next::{
    Rational, codec::context::Context as CodecContext, filter::Graph as FilterGraph,
    frame::Video as VideoFrame, media::Type, util::log::Level,
};
use ffmpeg_sys_next::AVPixelFormat;
use image::{
    ExtendedColorType, ImageEncoder, ImageFormat,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    },
};
use tempfile::TempDir;

use crate::{
    engine::{DirEntry, Engine, EngineEvent, EngineListener},
    error::FramepackError,
    progress::ProgressPayload,
};

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only unrecoverable conditions that abort the process.
    Panic,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages, including `showinfo` output.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This does **not** affect Rust-side `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Get the current FFmpeg internal log verbosity level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}

/// A parsed `exec` argument list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Invocation {
    pub(crate) input: String,
    pub(crate) filter: Option<String>,
    pub(crate) quality: Option<u32>,
    pub(crate) output_pattern: String,
}

/// Parse the supported subset of the `ffmpeg` command line.
pub(crate) fn parse_invocation(args: &[String]) -> Result<Invocation, String> {
    let mut input = None;
    let mut filter = None;
    let mut quality = None;
    let mut outputs = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" => input = Some(option_value(&mut iter, arg)?),
            "-vf" | "-filter:v" => filter = Some(option_value(&mut iter, arg)?),
            "-q:v" | "-qscale:v" => {
                let value = option_value(&mut iter, arg)?;
                quality = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("Invalid value '{value}' for option '{arg}'"))?,
                );
            }
            "-vsync" | "-fps_mode" => {
                let value = option_value(&mut iter, arg)?;
                if value != "0" && value != "passthrough" {
                    return Err(format!("Unsupported value '{value}' for option '{arg}'"));
                }
            }
            "-y" | "-nostdin" => {}
            other if other.starts_with('-') => {
                return Err(format!("Unrecognized option '{other}'"));
            }
            other => outputs.push(other.to_string()),
        }
    }

    let input = input.ok_or("No input specified (missing -i)")?;
    let output_pattern = match outputs.as_slice() {
        [output] => output.clone(),
        [] => return Err("At least one output file must be specified".to_string()),
        _ => return Err("Only one output pattern is supported".to_string()),
    };

    Ok(Invocation {
        input,
        filter,
        quality,
        output_pattern,
    })
}

fn option_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    option: &str,
) -> Result<String, String> {
    iter.next()
        .cloned()
        .ok_or_else(|| format!("Missing argument for option '{option}'"))
}

/// Substitute `number` into an image2-style pattern (`%d`, `%03d`, `%%`).
pub(crate) fn expand_output_pattern(pattern: &str, number: usize) -> Result<String, String> {
    let mut expanded = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut substituted = false;

    while let Some(character) = chars.next() {
        if character != '%' {
            expanded.push(character);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            expanded.push('%');
            continue;
        }

        let mut width = String::new();
        while let Some(digit) = chars.peek().copied().filter(char::is_ascii_digit) {
            width.push(digit);
            chars.next();
        }
        if chars.next() != Some('d') {
            return Err(format!("Invalid output pattern '{pattern}'"));
        }
        let width: usize = if width.is_empty() {
            0
        } else {
            width
                .parse()
                .map_err(|_| format!("Invalid output pattern '{pattern}'"))?
        };
        expanded.push_str(&format!("{number:0width$}"));
        substituted = true;
    }

    if !substituted {
        return Err(format!(
            "Output pattern '{pattern}' has no frame number placeholder"
        ));
    }
    Ok(expanded)
}

/// Validate a virtual file name and strip a leading `/`.
pub(crate) fn virtual_name(name: &str) -> Result<&str, FramepackError> {
    let trimmed = name.strip_prefix('/').unwrap_or(name);
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(FramepackError::Engine(format!(
            "Invalid virtual file name '{name}'"
        )));
    }
    Ok(trimmed)
}

/// Map FFmpeg's `-q:v` scale (2 best – 31 worst) onto JPEG quality.
fn jpeg_quality(qscale: Option<u32>) -> u8 {
    let qscale = qscale.unwrap_or(2).clamp(1, 31);
    100u32.saturating_sub((qscale - 1) * 3).clamp(10, 100) as u8
}

/// Map FFmpeg's `-q:v` scale onto PNG compression effort.
fn png_compression(qscale: Option<u32>) -> CompressionType {
    match qscale {
        Some(0..=3) => CompressionType::Best,
        Some(4..=10) | None => CompressionType::Default,
        Some(_) => CompressionType::Fast,
    }
}

fn output_format(pattern: &str) -> Result<ImageFormat, FramepackError> {
    match ImageFormat::from_path(pattern) {
        Ok(ImageFormat::Png) => Ok(ImageFormat::Png),
        Ok(ImageFormat::Jpeg) => Ok(ImageFormat::Jpeg),
        _ => Err(FramepackError::InvalidInput(format!(
            "Unsupported output image format for '{pattern}'"
        ))),
    }
}

fn estimate_frame_count(stream_frames: i64, duration_micros: i64, frame_rate: Rational) -> u64 {
    if stream_frames > 0 {
        return stream_frames as u64;
    }
    if frame_rate.denominator() == 0 || duration_micros <= 0 {
        return 0;
    }
    let frames_per_second = frame_rate.numerator() as f64 / frame_rate.denominator() as f64;
    (duration_micros as f64 / 1_000_000.0 * frames_per_second).round() as u64
}

/// Copy an RGB24 frame into a tightly-packed buffer, dropping row padding.
fn frame_to_rgb_buffer(video_frame: &VideoFrame) -> Vec<u8> {
    let width = video_frame.width() as usize;
    let height = video_frame.height() as usize;
    let stride = video_frame.stride(0);
    let row_length = width * 3;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * height].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * height);
        for row in 0..height {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}

fn encode_frame(
    video_frame: &VideoFrame,
    format: ImageFormat,
    qscale: Option<u32>,
) -> Result<Vec<u8>, FramepackError> {
    let buffer = frame_to_rgb_buffer(video_frame);
    let (width, height) = (video_frame.width(), video_frame.height());
    let mut encoded = Vec::new();

    if format == ImageFormat::Jpeg {
        JpegEncoder::new_with_quality(&mut encoded, jpeg_quality(qscale)).write_image(
            &buffer,
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
    } else {
        PngEncoder::new_with_quality(
            &mut encoded,
            png_compression(qscale),
            PngFilterType::Adaptive,
        )
        .write_image(&buffer, width, height, ExtendedColorType::Rgb8)?;
    }

    Ok(encoded)
}

/// Decoding engine backed by the FFmpeg libraries.
///
/// Call [`load`](Engine::load) before use; it initializes FFmpeg and creates
/// the scratch directory. The directory is removed when the engine drops.
///
/// # Example
///
/// ```no_run
/// use framepack::{Engine, FfmpegEngine};
///
/// let mut engine = FfmpegEngine::new();
/// engine.load()?;
/// engine.write_file("in.mp4", &std::fs::read("input.mp4")?)?;
/// let status = engine.exec(&[
///     "-i".into(), "in.mp4".into(),
///     "-vf".into(), "select=not(mod(n\\,100))".into(),
///     "frame_%03d.png".into(),
/// ])?;
/// assert_eq!(status, 0);
/// # Ok::<(), framepack::FramepackError>(())
/// ```
#[derive(Default)]
pub struct FfmpegEngine {
    scratch: Option<TempDir>,
    listener: Option<Arc<dyn EngineListener>>,
}

impl Debug for FfmpegEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegEngine")
            .field("scratch", &self.scratch.as_ref().map(TempDir::path))
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl FfmpegEngine {
    /// Create an engine that has not been loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the scratch directory, once loaded.
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    fn scratch_dir(&self) -> Result<&Path, FramepackError> {
        self.scratch_path().ok_or(FramepackError::EngineUnavailable)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, FramepackError> {
        Ok(self.scratch_dir()?.join(virtual_name(name)?))
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(listener) = &self.listener {
            listener.on_event(&event);
        }
    }

    fn log_line(&self, message: String) {
        log::trace!("ffmpeg: {message}");
        self.emit(EngineEvent::Log { message });
    }

    fn run_invocation(
        &self,
        scratch: &Path,
        invocation: &Invocation,
    ) -> Result<usize, FramepackError> {
        let input_path = self.resolve(&invocation.input)?;
        if !input_path.is_file() {
            return Err(FramepackError::Engine(format!(
                "{}: No such file or directory",
                invocation.input
            )));
        }
        let format = output_format(&invocation.output_pattern)?;

        let mut input_context = ffmpeg_next::format::input(&input_path)?;
        let duration_micros = input_context.duration();

        let (stream_index, time_base, expected_frames, mut decoder) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or_else(|| {
                    FramepackError::Engine(format!(
                        "No video stream found in {}",
                        invocation.input
                    ))
                })?;
            let decoder_context = CodecContext::from_parameters(stream.parameters())?;
            (
                stream.index(),
                stream.time_base(),
                estimate_frame_count(stream.frames(), duration_micros, stream.avg_frame_rate()),
                decoder_context.decoder().video()?,
            )
        };

        log::debug!(
            "Filtering {} (stream={}, ~{} frames) into {}",
            invocation.input,
            stream_index,
            expected_frames,
            invocation.output_pattern
        );

        let mut run = FilterRun {
            engine: self,
            scratch,
            invocation,
            format,
            time_base,
            expected_frames,
            graph: None,
            filtered_frame: VideoFrame::empty(),
            decoded: 0,
            written: 0,
            reported_percent: None,
        };
        let mut decoded_frame = VideoFrame::empty();

        for (stream, packet) in input_context.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                run.push(&mut decoded_frame)?;
            }
        }

        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            run.push(&mut decoded_frame)?;
        }

        run.finish()
    }
}

/// State of one `exec`: decoded frames flow through the graph into files.
struct FilterRun<'a> {
    engine: &'a FfmpegEngine,
    scratch: &'a Path,
    invocation: &'a Invocation,
    format: ImageFormat,
    time_base: Rational,
    expected_frames: u64,
    graph: Option<FilterGraph>,
    filtered_frame: VideoFrame,
    decoded: u64,
    written: usize,
    reported_percent: Option<u64>,
}

impl FilterRun<'_> {
    /// Build the graph lazily so the buffer source matches the frames the
    /// decoder actually produces.
    fn build_graph(&self, frame: &VideoFrame) -> Result<FilterGraph, FramepackError> {
        let mut graph = FilterGraph::new();

        let buffer_args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1",
            frame.width(),
            frame.height(),
            AVPixelFormat::from(frame.format()) as i32,
            self.time_base.numerator(),
            self.time_base.denominator(),
        );

        let buffer = ffmpeg_next::filter::find("buffer").ok_or_else(|| {
            FramepackError::Engine("FFmpeg 'buffer' filter not found".to_string())
        })?;
        let buffersink = ffmpeg_next::filter::find("buffersink").ok_or_else(|| {
            FramepackError::Engine("FFmpeg 'buffersink' filter not found".to_string())
        })?;
        graph.add(&buffer, "in", &buffer_args)?;
        graph.add(&buffersink, "out", "")?;

        let spec = match &self.invocation.filter {
            Some(filter) => format!("{filter},format=rgb24"),
            None => "format=rgb24".to_string(),
        };
        graph.output("in", 0)?.input("out", 0)?.parse(&spec)?;
        graph.validate()?;

        Ok(graph)
    }

    fn push(&mut self, frame: &mut VideoFrame) -> Result<(), FramepackError> {
        if let Some(timestamp) = frame.timestamp() {
            frame.set_pts(Some(timestamp));
        }

        if self.graph.is_none() {
            self.graph = Some(self.build_graph(frame)?);
        }
        if let Some(graph) = self.graph.as_mut() {
            graph
                .get("in")
                .ok_or_else(|| FramepackError::Engine("Filter 'in' not found".to_string()))?
                .source()
                .add(frame)?;
        }

        self.decoded += 1;
        self.report_progress();
        self.drain()
    }

    fn report_progress(&mut self) {
        if self.expected_frames == 0 {
            return;
        }
        let ratio = (self.decoded as f64 / self.expected_frames as f64).min(1.0);
        let percent = (ratio * 100.0) as u64;
        if self.reported_percent != Some(percent) {
            self.reported_percent = Some(percent);
            self.engine.emit(EngineEvent::Progress(ProgressPayload::Ratio(ratio)));
        }
    }

    fn drain(&mut self) -> Result<(), FramepackError> {
        loop {
            let received = match self.graph.as_mut() {
                Some(graph) => graph
                    .get("out")
                    .map(|mut sink| sink.sink().frame(&mut self.filtered_frame).is_ok())
                    .unwrap_or(false),
                None => false,
            };
            if !received {
                return Ok(());
            }
            self.write_frame()?;
        }
    }

    fn write_frame(&mut self) -> Result<(), FramepackError> {
        let number = self.written + 1;
        let name = expand_output_pattern(&self.invocation.output_pattern, number)
            .map_err(FramepackError::InvalidInput)?;
        let encoded = encode_frame(&self.filtered_frame, self.format, self.invocation.quality)?;
        fs::write(self.scratch.join(virtual_name(&name)?), encoded)?;
        self.written = number;

        self.engine.log_line(format!(
            "n:{} pts:{} {}x{} -> {}",
            self.decoded,
            self.filtered_frame.pts().unwrap_or(0),
            self.filtered_frame.width(),
            self.filtered_frame.height(),
            name,
        ));
        Ok(())
    }

    fn finish(mut self) -> Result<usize, FramepackError> {
        if let Some(graph) = self.graph.as_mut() {
            graph
                .get("in")
                .ok_or_else(|| FramepackError::Engine("Filter 'in' not found".to_string()))?
                .source()
                .flush()?;
        }
        self.drain()?;
        self.engine.emit(EngineEvent::Progress(ProgressPayload::Ratio(1.0)));
        Ok(self.written)
    }
}

impl Engine for FfmpegEngine {
    fn is_loaded(&self) -> bool {
        self.scratch.is_some()
    }

    fn load(&mut self) -> Result<(), FramepackError> {
        if self.scratch.is_some() {
            return Ok(());
        }

        ffmpeg_next::init()?;
        let scratch = tempfile::Builder::new().prefix("framepack-").tempdir()?;
        log::debug!("Engine loaded, scratch directory {}", scratch.path().display());
        self.scratch = Some(scratch);
        Ok(())
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), FramepackError> {
        let path = self.resolve(name)?;
        fs::write(path, data)?;
        Ok(())
    }

    fn exec(&mut self, args: &[String]) -> Result<i32, FramepackError> {
        let scratch = self.scratch_dir()?.to_path_buf();

        let invocation = match parse_invocation(args) {
            Ok(invocation) => invocation,
            Err(message) => {
                self.log_line(message);
                return Ok(1);
            }
        };

        log::debug!("exec: {}", args.join(" "));
        match self.run_invocation(&scratch, &invocation) {
            Ok(written) => {
                self.log_line(format!(
                    "{}: {written} frame(s) written",
                    invocation.input
                ));
                Ok(0)
            }
            Err(error) => {
                self.log_line(format!("{}: {error}", invocation.input));
                Ok(1)
            }
        }
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, FramepackError> {
        let scratch = self.scratch_dir()?;
        if !matches!(path, "/" | "" | ".") {
            return Err(FramepackError::Engine(format!(
                "{path}: No such directory"
            )));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(scratch)? {
            let entry = entry?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(entries)
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, FramepackError> {
        let path = self.resolve(name)?;
        fs::read(path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => FramepackError::Engine(format!("{name}: No such file")),
            _ => FramepackError::IoError(error),
        })
    }

    fn delete_file(&mut self, name: &str) -> Result<(), FramepackError> {
        let path = self.resolve(name)?;
        fs::remove_file(path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => FramepackError::Engine(format!("{name}: No such file")),
            _ => FramepackError::IoError(error),
        })
    }

    fn attach(&mut self, listener: Arc<dyn EngineListener>) {
        self.listener = Some(listener);
    }

    fn detach(&mut self) {
        self.listener = None;
    }
}
