//! Shared test doubles.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use framepack::{
    ArchiveTree, ArchiveWriter, BatchProgress, DirEntry, Engine, EngineEvent, EngineListener,
    FramepackError, ProgressCallback, ProgressPayload, SubmittedFile,
};

/// What one `exec` call does.
#[derive(Debug, Clone)]
pub struct Script {
    pub exit_code: i32,
    pub frames: usize,
    pub progress: Vec<ProgressPayload>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            exit_code: 0,
            frames: 2,
            progress: vec![ProgressPayload::Ratio(0.5), ProgressPayload::Percent(100.0)],
        }
    }
}

impl Script {
    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            frames: 0,
            progress: vec![ProgressPayload::Percent(30.0)],
        }
    }

    pub fn frames(frames: usize) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }
}

/// An in-memory engine: a `BTreeMap` filesystem and scripted commands.
#[derive(Default)]
pub struct MemoryEngine {
    loaded: bool,
    files: BTreeMap<String, Vec<u8>>,
    listener: Option<Arc<dyn EngineListener>>,
    detached: Option<Arc<dyn EngineListener>>,
    scripts: VecDeque<Script>,
    pub commands: Vec<Vec<String>>,
    pub max_resident_inputs: usize,
    pub unreadable: Vec<String>,
    pub exec_error: bool,
}

impl MemoryEngine {
    pub fn loaded() -> Self {
        Self {
            loaded: true,
            ..Self::default()
        }
    }

    pub fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: scripts.into_iter().collect(),
            ..Self::loaded()
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Deliver an event to the most recently detached listener.
    pub fn replay_to_detached(&self, event: &EngineEvent) {
        if let Some(listener) = &self.detached {
            listener.on_event(event);
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(listener) = &self.listener {
            listener.on_event(&event);
        }
    }
}

impl Engine for MemoryEngine {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn load(&mut self) -> Result<(), FramepackError> {
        self.loaded = true;
        Ok(())
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), FramepackError> {
        self.files.insert(name.to_string(), data.to_vec());
        let resident = self.files.keys().filter(|name| name.starts_with("in_")).count();
        self.max_resident_inputs = self.max_resident_inputs.max(resident);
        Ok(())
    }

    fn exec(&mut self, args: &[String]) -> Result<i32, FramepackError> {
        if !self.loaded {
            return Err(FramepackError::EngineUnavailable);
        }
        self.commands.push(args.to_vec());
        if self.exec_error {
            return Err(FramepackError::Engine("engine crashed".to_string()));
        }

        let script = self.scripts.pop_front().unwrap_or_default();
        for payload in &script.progress {
            self.emit(EngineEvent::Progress(*payload));
        }
        self.emit(EngineEvent::Log {
            message: format!("produced {} frame(s)", script.frames),
        });

        let pattern = args.last().cloned().unwrap_or_default();
        for number in 1..=script.frames {
            let name = pattern
                .replace("%03d", &format!("{number:03}"))
                .replace("%%", "%");
            self.files.insert(name, format!("frame {number}").into_bytes());
        }
        Ok(script.exit_code)
    }

    fn list_dir(&self, _path: &str) -> Result<Vec<DirEntry>, FramepackError> {
        Ok(self.files.keys().map(DirEntry::file).collect())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, FramepackError> {
        if self.unreadable.iter().any(|unreadable| unreadable == name) {
            return Err(FramepackError::Engine(format!("cannot read {name}")));
        }
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| FramepackError::Engine(format!("{name} not found")))
    }

    fn delete_file(&mut self, name: &str) -> Result<(), FramepackError> {
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FramepackError::Engine(format!("{name} not found")))
    }

    fn attach(&mut self, listener: Arc<dyn EngineListener>) {
        self.listener = Some(listener);
    }

    fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.detached = Some(listener);
        }
    }
}

/// A writer that always fails.
pub struct FailingWriter;

impl ArchiveWriter for FailingWriter {
    fn serialize(
        &mut self,
        _tree: &ArchiveTree,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<u8>, FramepackError> {
        progress(40.0);
        Err(FramepackError::ArchiveSerialization("disk full".to_string()))
    }
}

/// Records every snapshot it receives.
#[derive(Default)]
pub struct RecordingProgress {
    pub snapshots: Mutex<Vec<BatchProgress>>,
    pub messages: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn percents(&self) -> Vec<u8> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .map(|snapshot| snapshot.percent)
            .collect()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &BatchProgress) {
        self.snapshots.lock().unwrap().push(info.clone());
    }

    fn on_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub fn video(name: &str) -> SubmittedFile {
    SubmittedFile::new(name, format!("bytes of {name}").into_bytes()).unwrap()
}
