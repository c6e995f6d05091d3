//! FFmpeg-backed engine tests.
//!
//! Tests that decode need `tests/fixtures/sample_video.mp4` and return early
//! when it is absent.

use std::path::Path;
use std::sync::{Arc, Mutex};

use framepack::{
    Batch, BatchOptions, Engine, EngineEvent, EngineListener, FfmpegEngine, FilterSettings,
    JobStatus, ProgressPayload, SubmittedFile,
};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

#[derive(Default)]
struct EventLog(Mutex<Vec<EngineEvent>>);

impl EngineListener for EventLog {
    fn on_event(&self, event: &EngineEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|arg| arg.to_string()).collect()
}

// ── Virtual filesystem ─────────────────────────────────────────────

#[test]
fn virtual_filesystem_round_trip() {
    let mut engine = FfmpegEngine::new();
    engine.load().expect("Failed to load engine");
    engine.load().expect("Loading twice is a no-op");
    assert!(engine.is_loaded());

    engine.write_file("in_0_a.mp4", b"payload").unwrap();
    let names: Vec<String> = engine
        .list_dir("/")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["in_0_a.mp4"]);
    assert_eq!(engine.read_file("/in_0_a.mp4").unwrap(), b"payload");

    engine.delete_file("in_0_a.mp4").unwrap();
    assert!(engine.list_dir("/").unwrap().is_empty());
    assert!(engine.read_file("in_0_a.mp4").is_err());
    assert!(engine.delete_file("in_0_a.mp4").is_err());
}

#[test]
fn names_outside_the_root_are_rejected() {
    let mut engine = FfmpegEngine::new();
    engine.load().unwrap();
    assert!(engine.write_file("../escape.mp4", b"x").is_err());
    assert!(engine.list_dir("/nested").is_err());
}

#[test]
fn scratch_directory_is_removed_on_drop() {
    let mut engine = FfmpegEngine::new();
    engine.load().unwrap();
    let scratch = engine.scratch_path().unwrap().to_path_buf();
    assert!(scratch.is_dir());

    drop(engine);
    assert!(!scratch.exists());
}

// ── Command execution ──────────────────────────────────────────────

#[test]
fn garbage_input_exits_non_zero() {
    let mut engine = FfmpegEngine::new();
    engine.load().unwrap();
    let events = Arc::new(EventLog::default());
    engine.attach(events.clone());

    engine.write_file("in_0_bad.mp4", b"this is not a video").unwrap();
    let status = engine
        .exec(&args(&["-i", "in_0_bad.mp4", "bad_%03d.png"]))
        .unwrap();

    assert_ne!(status, 0);
    assert!(
        events
            .0
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, EngineEvent::Log { .. }))
    );
}

#[test]
fn missing_input_exits_non_zero() {
    let mut engine = FfmpegEngine::new();
    engine.load().unwrap();
    let status = engine
        .exec(&args(&["-i", "in_0_missing.mp4", "missing_%03d.png"]))
        .unwrap();
    assert_eq!(status, 1);
}

#[test]
fn extracts_numbered_frames() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut engine = FfmpegEngine::new();
    engine.load().unwrap();
    let events = Arc::new(EventLog::default());
    engine.attach(events.clone());

    engine
        .write_file("in_0_sample.mp4", &std::fs::read(path).unwrap())
        .unwrap();
    let status = engine
        .exec(&args(&[
            "-i",
            "in_0_sample.mp4",
            "-vf",
            "select=not(mod(n\\,10))",
            "-vsync",
            "0",
            "-q:v",
            "6",
            "sample_%03d.png",
        ]))
        .unwrap();
    assert_eq!(status, 0);

    let outputs: Vec<String> = engine
        .list_dir("/")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .filter(|name| name.starts_with("sample_"))
        .collect();
    assert!(!outputs.is_empty());
    assert_eq!(outputs[0], "sample_001.png");

    let first = engine.read_file(&outputs[0]).unwrap();
    let image = image::load_from_memory(&first).expect("Output should decode as an image");
    assert!(image.width() > 0);

    let events = events.0.lock().unwrap();
    let last_progress = events.iter().rev().find_map(|event| match event {
        EngineEvent::Progress(payload) => Some(*payload),
        _ => None,
    });
    assert_eq!(last_progress, Some(ProgressPayload::Ratio(1.0)));
}

#[test]
fn batch_over_the_fixture() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut engine = FfmpegEngine::new();
    engine.load().unwrap();
    let options = BatchOptions::new().with_filter(FilterSettings::new().with_frame_interval(25));
    let mut batch = Batch::new(engine, options);
    batch.add_file(SubmittedFile::open(path).unwrap()).unwrap();
    batch
        .add_file(SubmittedFile::new("broken.mp4", b"nope".to_vec()).unwrap())
        .unwrap();

    let archive = batch.run().expect("Batch should complete");

    assert_eq!(batch.percent(), 100);
    let outcomes = batch.outcomes();
    assert_eq!(outcomes[0].status, JobStatus::Succeeded);
    assert!(outcomes[0].artifact_count > 0);
    assert!(!outcomes[1].status.is_success());
    assert!(archive.entry_count > outcomes[0].artifact_count);
    assert!(batch.engine().list_dir("/").unwrap().is_empty());
}
