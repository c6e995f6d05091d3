//! Per-file extraction jobs.
//!
//! An [`ExtractionJob`] drives one [`SubmittedFile`] through the engine: it
//! writes the bytes into the virtual filesystem under a name unique to the
//! file's batch index, then executes the frame-selection filter. Discovery,
//! harvest, and cleanup of the outputs belong to the
//! [collector](crate::collector).

use crate::{configuration::FilterSettings, engine::Engine, input::SubmittedFile};

/// How a job's engine command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The engine exited with status 0.
    Succeeded,
    /// The engine ran the command and exited with a non-zero status.
    Failed {
        /// The engine's exit status.
        exit_code: i32,
    },
    /// The engine could not run the command at all.
    EngineError(String),
}

impl JobStatus {
    /// `true` for [`JobStatus::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }

    /// The exit status, if the command ran.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobStatus::Succeeded => Some(0),
            JobStatus::Failed { exit_code } => Some(*exit_code),
            JobStatus::EngineError(_) => None,
        }
    }
}

/// The recorded result of one file of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Position of the file in the batch.
    pub index: usize,
    /// Original file name.
    pub file_name: String,
    /// Archive folder the file's frames (or placeholder) went into.
    pub folder: String,
    /// How the engine command ended.
    pub status: JobStatus,
    /// Number of frames harvested into the archive.
    pub artifact_count: usize,
}

/// The extraction work for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    index: usize,
    file_name: String,
    input_name: String,
    base_name: String,
    settings: FilterSettings,
}

impl ExtractionJob {
    /// Prepare the job for `file` at position `index` of the batch.
    ///
    /// [`SubmittedFile`] guarantees a non-blank name, so every file yields a
    /// job.
    pub fn new(index: usize, file: &SubmittedFile, settings: &FilterSettings) -> Self {
        Self {
            index,
            file_name: file.name().to_string(),
            input_name: format!("in_{index}_{}", flatten_name(file.name())),
            base_name: flatten_name(file.base_name()),
            settings: *settings,
        }
    }

    /// Position of the file in the batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Original file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Name of the input in the engine's virtual filesystem.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// File name without its extension; prefix of every output.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Prefix shared by this job's outputs (`<base>_`).
    pub fn output_prefix(&self) -> String {
        format!("{}_", self.base_name)
    }

    /// The numbered output pattern handed to the engine.
    pub fn output_pattern(&self) -> String {
        format!("{}_%03d.png", self.base_name.replace('%', "%%"))
    }

    /// The full engine argument list.
    pub fn arguments(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.input_name.clone(),
            "-vf".to_string(),
            self.settings.filter_expression(),
            "-vsync".to_string(),
            "0".to_string(),
            "-q:v".to_string(),
            self.settings.quality().to_string(),
            self.output_pattern(),
        ]
    }

    /// Materialize the input and execute the filter.
    ///
    /// Never fails: engine errors and non-zero exits are reported through the
    /// returned [`JobStatus`] so the batch can carry on with the next file.
    pub fn run<E: Engine + ?Sized>(&self, engine: &mut E, file: &SubmittedFile) -> JobStatus {
        log::debug!(
            "Job {}: {} ({} bytes) as {}",
            self.index,
            self.file_name,
            file.size(),
            self.input_name
        );

        if let Err(error) = engine.write_file(&self.input_name, file.data()) {
            log::warn!("Could not stage {}: {error}", self.file_name);
            return JobStatus::EngineError(error.to_string());
        }

        match engine.exec(&self.arguments()) {
            Ok(0) => JobStatus::Succeeded,
            Ok(exit_code) => {
                log::warn!("Engine returned {exit_code} for {}", self.file_name);
                JobStatus::Failed { exit_code }
            }
            Err(error) => {
                log::warn!("Engine failed on {}: {error}", self.file_name);
                JobStatus::EngineError(error.to_string())
            }
        }
    }
}

/// Virtual names live in a flat namespace.
fn flatten_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SubmittedFile {
        SubmittedFile::new(name, vec![1u8, 2, 3]).unwrap()
    }

    #[test]
    fn derives_collision_free_names() {
        let settings = FilterSettings::default();
        let first = ExtractionJob::new(0, &file("clip.mp4"), &settings);
        let second = ExtractionJob::new(1, &file("clip.mp4"), &settings);

        assert_eq!(first.input_name(), "in_0_clip.mp4");
        assert_eq!(second.input_name(), "in_1_clip.mp4");
        assert_eq!(first.base_name(), "clip");
        assert_eq!(first.output_pattern(), "clip_%03d.png");
        assert_eq!(first.output_prefix(), "clip_");
    }

    #[test]
    fn arguments_carry_the_filter_and_quality() {
        let settings = FilterSettings::new()
            .with_frame_difference(3)
            .with_frame_interval(150)
            .with_quality(4);
        let job = ExtractionJob::new(2, &file("talk.webm"), &settings);

        assert_eq!(
            job.arguments(),
            vec![
                "-i",
                "in_2_talk.webm",
                "-vf",
                "select=gt(scene\\,0.03)+not(mod(n\\,150)),mpdecimate=hi=64:lo=32:frac=0.33,showinfo",
                "-vsync",
                "0",
                "-q:v",
                "4",
                "talk_%03d.png",
            ]
        );
    }

    #[test]
    fn percent_signs_are_escaped_in_the_pattern() {
        let job = ExtractionJob::new(0, &file("100%.mp4"), &FilterSettings::default());
        assert_eq!(job.output_pattern(), "100%%_%03d.png");
        assert_eq!(job.output_prefix(), "100%_");
    }

    #[test]
    fn job_status_exit_codes() {
        assert_eq!(JobStatus::Succeeded.exit_code(), Some(0));
        assert_eq!(JobStatus::Failed { exit_code: 1 }.exit_code(), Some(1));
        assert_eq!(JobStatus::EngineError("gone".into()).exit_code(), None);
        assert!(!JobStatus::Failed { exit_code: 1 }.is_success());
    }
}
