use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framepack::{
    Batch, BatchOptions, BatchPhase, BatchProgress, Engine, FfmpegEngine, FfmpegLogLevel,
    FilterSettings, FinishedArchive, JobOutcome, JobStatus, PlaceholderLanguage,
    ProgressCallback, SubmittedFile, check_video_path,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framepack extract lecture.mp4 talk.webm --out frames --progress\n  framepack extract clip.mov --out frames --frame-diff 10 --frame-interval 500 --json\n  framepack filter --frame-diff 3 --no-decimate\n  framepack completions zsh > _framepack";

#[derive(Debug, Parser)]
#[command(
    name = "framepack",
    version,
    about = "Extract representative frames from videos into a single ZIP archive",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output, including decoder diagnostics.
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Parser, Clone)]
struct FilterArgs {
    /// Scene-change threshold in percent (1-100).
    #[arg(long, default_value_t = framepack::DEFAULT_FRAME_DIFFERENCE)]
    frame_diff: u32,

    /// Also capture every Nth frame (1-1000).
    #[arg(long, default_value_t = framepack::DEFAULT_FRAME_INTERVAL)]
    frame_interval: u32,

    /// Output quality scale, 2 (best) to 31 (worst).
    #[arg(long, default_value_t = framepack::DEFAULT_QUALITY)]
    quality: u32,

    /// Keep near-duplicate frames.
    #[arg(long)]
    no_decimate: bool,
}

impl FilterArgs {
    fn settings(&self) -> FilterSettings {
        FilterSettings::new()
            .with_frame_difference(self.frame_diff)
            .with_frame_interval(self.frame_interval)
            .with_quality(self.quality)
            .with_decimate(!self.no_decimate)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract frames from one or more videos into a ZIP archive.
    #[command(
        about = "Extract frames into an archive",
        after_help = "Examples:\n  framepack extract a.mp4 b.mkv --out frames\n  framepack extract *.mp4 --out frames --progress --placeholder-language ru"
    )]
    Extract {
        /// Input video files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory the archive is written to.
        #[arg(long)]
        out: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Language of the note left for videos without frames (en, ru).
        #[arg(long, default_value = "en")]
        placeholder_language: String,

        /// Show a progress bar.
        #[arg(long)]
        progress: bool,

        /// Print a machine-readable JSON summary.
        #[arg(long)]
        json: bool,

        /// Allow overwriting an existing archive.
        #[arg(long)]
        overwrite: bool,
    },

    /// Print the filter expression the given settings produce.
    #[command(about = "Print the frame-selection filter")]
    Filter {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn parse_placeholder_language(value: &str) -> Option<PlaceholderLanguage> {
    match value.to_ascii_lowercase().as_str() {
        "en" | "english" => Some(PlaceholderLanguage::English),
        "ru" | "russian" => Some(PlaceholderLanguage::Russian),
        _ => None,
    }
}

fn warn(message: impl AsRef<str>) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.as_ref().yellow());
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            warn(format!("overwriting {}", path.display()));
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framepack::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

/// Read the inputs that pass validation; the rest are skipped with a warning.
fn load_inputs(paths: &[PathBuf]) -> Vec<SubmittedFile> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let loaded = check_video_path(path).and_then(|_| SubmittedFile::open(path));
        match loaded {
            Ok(file) => files.push(file),
            Err(error) => warn(format!("skipping {}: {error}", path.display())),
        }
    }
    files
}

struct TerminalProgress {
    bar: Option<ProgressBar>,
    verbose: bool,
}

impl TerminalProgress {
    fn new(show_bar: bool, verbose: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = if show_bar {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::with_template(
                "{spinner:.green} {bar:40.cyan/blue} {pos:>3}% {msg}",
            )?;
            bar.set_style(style.progress_chars("##-"));
            Some(bar)
        } else {
            None
        };
        Ok(Self { bar, verbose })
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &BatchProgress) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.set_position(u64::from(info.percent));
        match info.phase {
            BatchPhase::Extracting(index) => {
                let name = info.current_file.as_deref().unwrap_or_default();
                bar.set_message(format!("[{}/{}] {name}", index + 1, info.state.total));
            }
            BatchPhase::Archiving => bar.set_message("packing archive"),
            _ => {}
        }
    }

    fn on_message(&self, message: &str) {
        if !self.verbose {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(format!("{} {message}", "ffmpeg".dimmed())),
            None => eprintln!("{} {message}", "ffmpeg".dimmed()),
        }
    }
}

fn status_label(status: &JobStatus) -> String {
    match status {
        JobStatus::Succeeded => "ok".to_string(),
        JobStatus::Failed { exit_code } => format!("exit {exit_code}"),
        JobStatus::EngineError(reason) => format!("engine error: {reason}"),
    }
}

fn print_summary(outcomes: &[JobOutcome], archive: &FinishedArchive, path: &Path) {
    for outcome in outcomes {
        let label = status_label(&outcome.status);
        let label = if outcome.status.is_success() {
            label.green()
        } else {
            label.red()
        };
        println!(
            "{:>4} frame(s)  {}  {} [{label}]",
            outcome.artifact_count,
            outcome.file_name,
            format!("-> {}/", outcome.folder).dimmed(),
        );
    }
    println!(
        "{} {} ({} entries, {} bytes)",
        "saved".green().bold(),
        path.display(),
        archive.entry_count,
        archive.data.len()
    );
}

fn json_summary(
    outcomes: &[JobOutcome],
    archive: &FinishedArchive,
    path: &Path,
) -> serde_json::Value {
    json!({
        "archive": path.display().to_string(),
        "entries": archive.entry_count,
        "bytes": archive.data.len(),
        "files": outcomes.iter().map(|outcome| json!({
            "name": outcome.file_name,
            "folder": outcome.folder,
            "frames": outcome.artifact_count,
            "success": outcome.status.is_success(),
            "exit_code": outcome.status.exit_code(),
        })).collect::<Vec<_>>(),
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Extract {
            inputs,
            out,
            filter,
            placeholder_language,
            progress,
            json,
            overwrite,
        } => {
            let language = parse_placeholder_language(&placeholder_language).ok_or(format!(
                "unsupported --placeholder-language: {placeholder_language}"
            ))?;

            let files = load_inputs(&inputs);
            if files.is_empty() {
                return Err("no usable video files were given".into());
            }
            if cli.global.verbose {
                eprintln!(
                    "{} {} file(s), filter {}",
                    "extracting".cyan().bold(),
                    files.len(),
                    filter.settings().filter_expression()
                );
            }

            fs::create_dir_all(&out)?;

            let reporter = Arc::new(TerminalProgress::new(progress && !json, cli.global.verbose)?);
            let options = BatchOptions::new()
                .with_filter(filter.settings())
                .with_placeholder_language(language)
                .with_progress(reporter.clone());

            let mut engine = FfmpegEngine::new();
            engine.load()?;

            let mut batch = Batch::new(engine, options);
            batch.add_files(files)?;
            batch.start()?;
            let archive_name = batch.archive_name().ok_or("batch did not start")?;
            let path = out.join(&archive_name);
            ensure_writable_path(&path, overwrite)?;

            let result = batch.run();
            reporter.finish();
            let archive = result?;
            fs::write(&path, &archive.data)?;

            if json {
                let payload = json_summary(batch.outcomes(), &archive, &path);
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_summary(batch.outcomes(), &archive, &path);
            }
        }
        Commands::Filter { filter } => {
            println!("{}", filter.settings().filter_expression());
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framepack", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Commands, ensure_writable_path, parse_log_level, parse_placeholder_language,
    };
    use clap::Parser;
    use framepack::PlaceholderLanguage;

    #[test]
    fn parse_log_level_aliases() {
        assert!(parse_log_level("warn").is_some());
        assert!(parse_log_level("WARNING").is_some());
        assert!(parse_log_level("trace").is_some());
        assert!(parse_log_level("loud").is_none());
    }

    #[test]
    fn parse_placeholder_language_aliases() {
        assert_eq!(
            parse_placeholder_language("RU"),
            Some(PlaceholderLanguage::Russian)
        );
        assert_eq!(
            parse_placeholder_language("english"),
            Some(PlaceholderLanguage::English)
        );
        assert_eq!(parse_placeholder_language("de"), None);
    }

    #[test]
    fn filter_flags_reach_the_settings() {
        let cli = Cli::parse_from([
            "framepack",
            "filter",
            "--frame-diff",
            "250",
            "--frame-interval",
            "10",
            "--no-decimate",
        ]);
        let Commands::Filter { filter } = cli.command else {
            panic!("expected the filter command");
        };
        let settings = filter.settings();
        assert_eq!(settings.frame_difference(), 100);
        assert_eq!(settings.frame_interval(), 10);
        assert!(!settings.decimate());
    }

    #[test]
    fn existing_archive_is_refused_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.zip");
        assert!(ensure_writable_path(&path, false).is_ok());

        std::fs::write(&path, b"old").unwrap();
        let error = ensure_writable_path(&path, false).unwrap_err();
        assert!(error.to_string().contains("--overwrite"));
        assert!(ensure_writable_path(&path, true).is_ok());
    }

    #[test]
    fn extract_requires_inputs() {
        assert!(Cli::try_parse_from(["framepack", "extract", "--out", "frames"]).is_err());
        assert!(
            Cli::try_parse_from(["framepack", "extract", "a.mp4", "--out", "frames", "--verbose"])
                .is_ok()
        );
    }
}
