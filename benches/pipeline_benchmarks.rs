//! Benchmarks for progress aggregation, archive serialization, and
//! fixture-based extraction.
//!
//! Run with: cargo bench
//!
//! The extraction benchmark needs `tests/fixtures/sample_video.mp4`.

use std::{hint::black_box, path::Path};

use criterion::Criterion;
use framepack::{
    ArchiveTree, ArchiveWriter, Batch, BatchOptions, BatchProgressState, Engine, FfmpegEngine,
    FfmpegLogLevel, ProgressPayload, SubmittedFile, ZipArchiveWriter,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn sample_tree(folders: usize, frames: usize, frame_size: usize) -> ArchiveTree {
    let mut tree = ArchiveTree::new();
    for folder_index in 0..folders {
        let folder = tree.create_folder(&format!("video_{folder_index}"));
        for frame in 1..=frames {
            let data = (0..frame_size).map(|byte| (byte * frame) as u8).collect();
            tree.add_file(&folder, format!("video_{folder_index}_{frame:03}.png"), data);
        }
    }
    tree
}

fn benchmark_progress_aggregation(criterion: &mut Criterion) {
    criterion.bench_function("blend percent (100 files)", |bencher| {
        bencher.iter(|| {
            let mut state = BatchProgressState::new(100);
            let mut sum = 0u32;
            for completed in 0..100 {
                state.completed = completed;
                for percent in [0.0, 25.0, 50.0, 75.0] {
                    state.current_job_fraction = ProgressPayload::Percent(percent).fraction();
                    sum += u32::from(black_box(&state).percent());
                }
            }
            sum
        });
    });
}

fn benchmark_archive_serialization(criterion: &mut Criterion) {
    let tree = sample_tree(8, 16, 32 * 1024);

    criterion.bench_function("zip 128 frames (deflate)", |bencher| {
        bencher.iter(|| {
            ZipArchiveWriter::new()
                .serialize(black_box(&tree), &mut |_| {})
                .unwrap()
        });
    });

    criterion.bench_function("zip 128 frames (stored)", |bencher| {
        bencher.iter(|| {
            ZipArchiveWriter::new()
                .stored()
                .serialize(black_box(&tree), &mut |_| {})
                .unwrap()
        });
    });
}

fn benchmark_fixture_batch(criterion: &mut Criterion) {
    framepack::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }
    let file = SubmittedFile::open(SAMPLE_VIDEO).unwrap();

    let mut group = criterion.benchmark_group("batch");
    group.sample_size(10);
    group.bench_function("extract and pack one video", |bencher| {
        bencher.iter(|| {
            let mut engine = FfmpegEngine::new();
            engine.load().unwrap();
            let mut batch = Batch::new(engine, BatchOptions::default());
            batch.add_file(file.clone()).unwrap();
            batch.run().unwrap()
        });
    });
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_progress_aggregation,
    benchmark_archive_serialization,
    benchmark_fixture_batch,
);
criterion::criterion_main!(benches);
