//! Output harvest and virtual filesystem cleanup.
//!
//! After a job's command has run, its outputs sit in the engine's root
//! directory as `<base>_NNN.png`. [`collect`] moves them into the archive
//! tree and leaves the engine's filesystem empty of the job's files, whether
//! or not the command succeeded.

use std::cmp::Ordering;

use crate::{
    archive::ArchiveTree, configuration::PlaceholderLanguage, engine::Engine, job::ExtractionJob,
};

/// Whether `name` is one of the outputs produced for `prefix`.
pub fn is_job_output(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) && name.to_ascii_lowercase().ends_with(".png")
}

/// Order outputs sharing one prefix and extension by their frame number.
pub(crate) fn frame_order(left: &str, right: &str) -> Ordering {
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

/// Harvest `job`'s outputs from `engine` into `folder` of `tree`.
///
/// Matching outputs are added in frame order: shorter names first, then
/// lexicographic, so `clip_1000.png` follows `clip_999.png` once the
/// three-digit counter overflows. Each output is deleted after it is read;
/// a failed read is logged and the file skipped, but its deletion is still
/// attempted. When nothing was harvested a placeholder note is written
/// instead. The job's input is deleted last.
///
/// Returns the number of frames harvested.
pub fn collect<E: Engine + ?Sized>(
    engine: &mut E,
    job: &ExtractionJob,
    folder: &str,
    tree: &mut ArchiveTree,
    language: PlaceholderLanguage,
) -> usize {
    let prefix = job.output_prefix();
    let mut outputs: Vec<String> = match engine.list_dir("/") {
        Ok(entries) => entries
            .into_iter()
            .filter(|entry| {
                !entry.is_dir
                    && entry.name != job.input_name()
                    && is_job_output(&entry.name, &prefix)
            })
            .map(|entry| entry.name)
            .collect(),
        Err(error) => {
            log::warn!("Could not list outputs of {}: {error}", job.file_name());
            Vec::new()
        }
    };
    outputs.sort_by(|left, right| frame_order(left, right));

    let mut harvested = 0;
    for name in &outputs {
        match engine.read_file(name) {
            Ok(data) => {
                tree.add_file(folder, name.as_str(), data);
                harvested += 1;
            }
            Err(error) => log::warn!("Skipping unreadable output {name}: {error}"),
        }
        if let Err(error) = engine.delete_file(name) {
            log::warn!("Could not delete output {name}: {error}");
        }
    }

    if harvested == 0 {
        log::info!("No frames extracted from {}", job.file_name());
        tree.add_placeholder(folder, &language.no_frames_note(job.file_name()));
    }

    if let Err(error) = engine.delete_file(job.input_name()) {
        log::debug!("Could not delete input {}: {error}", job.input_name());
    }

    harvested
}
