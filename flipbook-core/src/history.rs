//! Snapshot-based undo/redo history.
//!
//! Every mutating command stages a deep copy of the sequence *before* it
//! mutates anything. Undo and redo never rewrite frame files: they swap which
//! snapshot is live and hand the previous live sequence to the opposite stack.
//! Every step that can fail runs before either stack or the live sequence
//! changes.
//!
//! ```ignore
//! let mut history = ActionHistory::new(FsHistoryStore::new(history_dir), 50);
//! history.prepare(&sequence)?;
//!
//! history.stage(&sequence)?;
//! // ... mutate the sequence ...
//!
//! history.undo(&mut sequence)?;
//! history.redo(&mut sequence)?;
//! ```

use crate::frame::CursorOverlay;
use crate::sequence::FrameSequence;
use crate::{Error, FrameRecord, Result};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

/// Storage backend for history snapshots
pub trait HistoryStore {
    /// Snapshot handle owned by the history stacks
    type Snapshot;

    /// Takes a deep copy of `sequence`. Must be complete when it returns.
    fn capture(&mut self, sequence: &FrameSequence) -> Result<Self::Snapshot>;

    /// Makes a snapshot that takes over the live `sequence`, copying only
    /// where the store must. Leaves `sequence` usable until [`retire`] runs.
    ///
    /// [`retire`]: HistoryStore::retire
    fn adopt(&mut self, sequence: &FrameSequence) -> Result<Self::Snapshot>;

    /// Lets go of a live sequence whose data now belongs to an adopted snapshot
    fn retire(&mut self, sequence: FrameSequence) -> Result<()>;

    /// Deep-copies an existing snapshot
    fn duplicate(&mut self, snapshot: &Self::Snapshot) -> Result<Self::Snapshot>;

    /// Fails with `SnapshotUnavailable` when the snapshot's backing data is gone
    fn verify(&self, snapshot: &Self::Snapshot) -> Result<()>;

    /// Builds the live sequence from a snapshot.
    ///
    /// The snapshot stays untouched on failure. On success the live sequence
    /// owns the data and the caller drops the handle without releasing it.
    fn restore(&mut self, snapshot: &Self::Snapshot) -> Result<FrameSequence>;

    /// Frees the snapshot's backing data
    fn release(&mut self, snapshot: Self::Snapshot) -> Result<()>;
}

/// Snapshots stored as directories of copied frame files.
///
/// Restoring a snapshot makes its directory the live working directory.
#[derive(Debug, Clone)]
pub struct FsHistoryStore {
    root: PathBuf,
}

impl FsHistoryStore {
    /// Creates a store that keeps snapshot directories under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn next_dir(&self) -> PathBuf {
        self.root.join(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl HistoryStore for FsHistoryStore {
    type Snapshot = FrameSequence;

    fn capture(&mut self, sequence: &FrameSequence) -> Result<FrameSequence> {
        let dir = self.next_dir();
        match sequence.duplicate_into(&dir) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let _ = fs::remove_dir_all(&dir);
                Err(e)
            }
        }
    }

    fn adopt(&mut self, sequence: &FrameSequence) -> Result<FrameSequence> {
        Ok(sequence.clone())
    }

    fn retire(&mut self, _sequence: FrameSequence) -> Result<()> {
        Ok(())
    }

    fn duplicate(&mut self, snapshot: &FrameSequence) -> Result<FrameSequence> {
        self.capture(snapshot)
    }

    fn verify(&self, snapshot: &FrameSequence) -> Result<()> {
        let intact = snapshot.root().is_dir()
            && snapshot.iter().all(|frame| frame.image_location.is_file());
        if !intact {
            return Err(Error::SnapshotUnavailable(snapshot.root().to_path_buf()));
        }
        Ok(())
    }

    fn restore(&mut self, snapshot: &FrameSequence) -> Result<FrameSequence> {
        Ok(snapshot.clone())
    }

    fn release(&mut self, mut snapshot: FrameSequence) -> Result<()> {
        snapshot.discard()
    }
}

#[derive(Debug, Clone)]
struct MemoryFrame {
    file_name: OsString,
    bytes: Vec<u8>,
    delay_ms: u32,
    cursor_overlay: Option<CursorOverlay>,
}

/// Snapshot held entirely in memory
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    frames: Vec<MemoryFrame>,
    dpi: f64,
}

impl MemorySnapshot {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Snapshots kept as in-memory file contents.
///
/// Restored sequences are written to fresh directories under the scratch root.
#[derive(Debug, Clone)]
pub struct MemoryHistoryStore {
    scratch: PathBuf,
}

impl MemoryHistoryStore {
    pub fn new(scratch: impl Into<PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    type Snapshot = MemorySnapshot;

    fn capture(&mut self, sequence: &FrameSequence) -> Result<MemorySnapshot> {
        let mut frames = Vec::with_capacity(sequence.len());
        for record in sequence.iter() {
            let file_name = record
                .image_location
                .file_name()
                .ok_or_else(|| Error::MissingFrame(record.image_location.display().to_string()))?;
            frames.push(MemoryFrame {
                file_name: file_name.to_os_string(),
                bytes: fs::read(&record.image_location)?,
                delay_ms: record.delay_ms(),
                cursor_overlay: record.cursor_overlay.clone(),
            });
        }

        Ok(MemorySnapshot {
            frames,
            dpi: sequence.dpi(),
        })
    }

    fn adopt(&mut self, sequence: &FrameSequence) -> Result<MemorySnapshot> {
        self.capture(sequence)
    }

    fn retire(&mut self, mut sequence: FrameSequence) -> Result<()> {
        sequence.discard()
    }

    fn duplicate(&mut self, snapshot: &MemorySnapshot) -> Result<MemorySnapshot> {
        Ok(snapshot.clone())
    }

    fn verify(&self, _snapshot: &MemorySnapshot) -> Result<()> {
        Ok(())
    }

    fn restore(&mut self, snapshot: &MemorySnapshot) -> Result<FrameSequence> {
        let dir = self.scratch.join(uuid::Uuid::new_v4().simple().to_string());
        fs::create_dir_all(&dir)?;

        let mut frames = Vec::with_capacity(snapshot.frames.len());
        for frame in &snapshot.frames {
            let location = dir.join(&frame.file_name);
            if let Err(e) = fs::write(&location, &frame.bytes) {
                let _ = fs::remove_dir_all(&dir);
                return Err(e.into());
            }

            let mut record = FrameRecord::new(location, frame.delay_ms);
            record.cursor_overlay = frame.cursor_overlay.clone();
            frames.push(record);
        }

        Ok(FrameSequence::from_records(dir, frames).with_dpi(snapshot.dpi))
    }

    fn release(&mut self, _snapshot: MemorySnapshot) -> Result<()> {
        Ok(())
    }
}

/// Whether any undoable snapshot exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    /// No snapshots; undo is disabled
    Clean,
    /// At least one snapshot; undo is enabled
    Dirty,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

/// Linear undo/redo history over a frame sequence.
///
/// - A base snapshot is captured once when editing starts; `reset` returns to it
/// - Staging clears the redo stack (no branching history)
/// - The undo stack is bounded; the oldest snapshot is released on overflow
pub struct ActionHistory<S: HistoryStore> {
    store: S,
    base: Option<S::Snapshot>,
    undo_stack: Vec<S::Snapshot>,
    redo_stack: Vec<S::Snapshot>,
    max_depth: usize,
}

impl<S: HistoryStore> ActionHistory<S> {
    /// Creates an empty history keeping at most `max_depth` undo snapshots
    pub fn new(store: S, max_depth: usize) -> Self {
        Self {
            store,
            base: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Discards all history and captures `sequence` as the new base state
    pub fn prepare(&mut self, sequence: &FrameSequence) -> Result<()> {
        let base = self.store.capture(sequence)?;
        self.clear();
        self.base = Some(base);
        tracing::debug!(frames = sequence.len(), "History base captured");
        Ok(())
    }

    /// Snapshots `sequence` before a mutation. Clears the redo stack.
    pub fn stage(&mut self, sequence: &FrameSequence) -> Result<()> {
        let snapshot = self.store.capture(sequence)?;

        let redo = std::mem::take(&mut self.redo_stack);
        self.release_all(redo);

        self.undo_stack.push(snapshot);
        while self.undo_stack.len() > self.max_depth {
            let oldest = self.undo_stack.remove(0);
            self.release_all([oldest]);
        }

        tracing::debug!(undo_depth = self.undo_stack.len(), "History staged");
        Ok(())
    }

    /// Replaces `current` with the most recent snapshot.
    ///
    /// Returns `false` when there is nothing to undo. On any failure, such as
    /// a snapshot whose backing data has disappeared (`SnapshotUnavailable`),
    /// both stacks and `current` are left untouched.
    pub fn undo(&mut self, current: &mut FrameSequence) -> Result<bool> {
        if !self.step(Direction::Undo, current)? {
            return Ok(false);
        }
        tracing::debug!(
            undo_depth = self.undo_stack.len(),
            redo_depth = self.redo_stack.len(),
            "Undo"
        );
        Ok(true)
    }

    /// Mirror of [`ActionHistory::undo`]
    pub fn redo(&mut self, current: &mut FrameSequence) -> Result<bool> {
        if !self.step(Direction::Redo, current)? {
            return Ok(false);
        }
        tracing::debug!(
            undo_depth = self.undo_stack.len(),
            redo_depth = self.redo_stack.len(),
            "Redo"
        );
        Ok(true)
    }

    fn step(&mut self, direction: Direction, current: &mut FrameSequence) -> Result<bool> {
        let top = match direction {
            Direction::Undo => self.undo_stack.last(),
            Direction::Redo => self.redo_stack.last(),
        };
        let Some(top) = top else {
            return Ok(false);
        };
        self.store.verify(top)?;

        let adopted = self.store.adopt(current)?;
        let restored = self.store.restore(top)?;

        // Nothing below can fail
        let (from, to) = self.stacks(direction);
        from.pop();
        to.push(adopted);
        let previous = std::mem::replace(current, restored);
        if let Err(e) = self.store.retire(previous) {
            tracing::warn!(error = %e, "Failed to retire previous sequence");
        }
        Ok(true)
    }

    fn stacks(&mut self, direction: Direction) -> (&mut Vec<S::Snapshot>, &mut Vec<S::Snapshot>) {
        match direction {
            Direction::Undo => (&mut self.undo_stack, &mut self.redo_stack),
            Direction::Redo => (&mut self.redo_stack, &mut self.undo_stack),
        }
    }

    /// Replaces `current` with a copy of the base state and drops every snapshot.
    ///
    /// Returns `false` when no base state was prepared.
    pub fn reset(&mut self, current: &mut FrameSequence) -> Result<bool> {
        let Some(base) = self.base.as_ref() else {
            return Ok(false);
        };
        self.store.verify(base)?;

        let copy = self.store.duplicate(base)?;
        let restored = match self.store.restore(&copy) {
            Ok(restored) => restored,
            Err(e) => {
                self.release_all([copy]);
                return Err(e);
            }
        };
        let mut previous = std::mem::replace(current, restored);
        if let Err(e) = previous.discard() {
            tracing::warn!(error = %e, "Failed to discard replaced sequence");
        }

        let undo = std::mem::take(&mut self.undo_stack);
        let redo = std::mem::take(&mut self.redo_stack);
        self.release_all(undo.into_iter().chain(redo));

        tracing::debug!(frames = current.len(), "History reset to base");
        Ok(true)
    }

    /// Releases every snapshot, including the base state
    pub fn clear(&mut self) {
        let undo = std::mem::take(&mut self.undo_stack);
        let redo = std::mem::take(&mut self.redo_stack);
        let base = self.base.take();
        self.release_all(undo.into_iter().chain(redo).chain(base));
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    pub fn state(&self) -> HistoryState {
        if self.undo_stack.is_empty() {
            HistoryState::Clean
        } else {
            HistoryState::Dirty
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn release_all<I: IntoIterator<Item = S::Snapshot>>(&mut self, snapshots: I) {
        for snapshot in snapshots {
            if let Err(e) = self.store.release(snapshot) {
                tracing::warn!(error = %e, "Failed to release history snapshot");
            }
        }
    }
}

impl<S: HistoryStore> Drop for ActionHistory<S> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sequence_of(dir: &Path, names: &[&str]) -> FrameSequence {
        fs::create_dir_all(dir).unwrap();
        let frames = names
            .iter()
            .map(|name| {
                let path = dir.join(format!("{name}.png"));
                fs::write(&path, name.as_bytes()).unwrap();
                FrameRecord::new(path, 100)
            })
            .collect();
        FrameSequence::from_records(dir, frames)
    }

    fn contents(sequence: &FrameSequence) -> Vec<String> {
        sequence
            .iter()
            .map(|f| String::from_utf8(fs::read(&f.image_location).unwrap()).unwrap())
            .collect()
    }

    fn overwrite_first(sequence: &FrameSequence, text: &str) {
        fs::write(&sequence.frames()[0].image_location, text).unwrap();
    }

    #[test]
    fn test_undo_restores_file_identical_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = sequence_of(&dir.path().join("live"), &["a", "b"]);
        let mut history = ActionHistory::new(FsHistoryStore::new(dir.path().join("history")), 10);

        assert_eq!(history.state(), HistoryState::Clean);
        history.stage(&live).unwrap();
        assert_eq!(history.state(), HistoryState::Dirty);

        overwrite_first(&live, "mutated");
        live.set_delay(1, 500).unwrap();

        assert!(history.undo(&mut live).unwrap());
        assert_eq!(contents(&live), ["a", "b"]);
        assert_eq!(live.frames()[1].delay_ms(), 100);
        assert!(history.can_redo());
        assert!(!history.can_undo());

        assert!(history.redo(&mut live).unwrap());
        assert_eq!(contents(&live), ["mutated", "b"]);
        assert_eq!(live.frames()[1].delay_ms(), 500);
    }

    #[test]
    fn test_stage_after_undo_clears_redo() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = sequence_of(&dir.path().join("live"), &["a"]);
        let mut history = ActionHistory::new(FsHistoryStore::new(dir.path().join("history")), 10);

        history.stage(&live).unwrap();
        overwrite_first(&live, "b");
        history.undo(&mut live).unwrap();
        assert_eq!(history.redo_depth(), 1);

        history.stage(&live).unwrap();
        assert_eq!(history.redo_depth(), 0);
        assert!(!history.redo(&mut live).unwrap());
    }

    #[test]
    fn test_reset_returns_base_regardless_of_depth() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = sequence_of(&dir.path().join("live"), &["base"]);
        let mut history = ActionHistory::new(FsHistoryStore::new(dir.path().join("history")), 3);
        history.prepare(&live).unwrap();

        for step in 0..6 {
            history.stage(&live).unwrap();
            overwrite_first(&live, &format!("step {step}"));
        }
        assert_eq!(history.undo_depth(), 3);

        assert!(history.reset(&mut live).unwrap());
        assert_eq!(contents(&live), ["base"]);
        assert_eq!(history.state(), HistoryState::Clean);

        overwrite_first(&live, "again");
        assert!(history.reset(&mut live).unwrap());
        assert_eq!(contents(&live), ["base"]);
    }

    #[test]
    fn test_missing_snapshot_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let history_root = dir.path().join("history");
        let mut live = sequence_of(&dir.path().join("live"), &["a"]);
        let mut history = ActionHistory::new(FsHistoryStore::new(&history_root), 10);

        history.stage(&live).unwrap();
        overwrite_first(&live, "b");
        fs::remove_dir_all(&history_root).unwrap();

        let err = history.undo(&mut live).unwrap_err();
        assert!(matches!(err, Error::SnapshotUnavailable(_)));
        assert!(history.can_undo());
        assert_eq!(contents(&live), ["b"]);
    }

    #[test]
    fn test_failed_adopt_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = sequence_of(&dir.path().join("live"), &["a", "b"]);
        let mut history = ActionHistory::new(MemoryHistoryStore::new(dir.path().join("scratch")), 10);

        history.stage(&live).unwrap();
        overwrite_first(&live, "changed");
        fs::remove_file(&live.frames()[1].image_location).unwrap();
        let before = live.clone();

        assert!(matches!(history.undo(&mut live), Err(Error::Io(_))));
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 0);
        assert_eq!(live, before);
        assert_eq!(fs::read(&live.frames()[0].image_location).unwrap(), b"changed");
    }

    #[test]
    fn test_failed_restore_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let mut live = sequence_of(&dir.path().join("live"), &["a"]);
        let mut history = ActionHistory::new(MemoryHistoryStore::new(&scratch), 10);

        history.stage(&live).unwrap();
        overwrite_first(&live, "changed");
        // A plain file where the scratch directory should go
        fs::write(&scratch, b"").unwrap();

        assert!(history.undo(&mut live).is_err());
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 0);
        assert_eq!(contents(&live), ["changed"]);

        fs::remove_file(&scratch).unwrap();
        assert!(history.undo(&mut live).unwrap());
        assert_eq!(contents(&live), ["a"]);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = sequence_of(&dir.path().join("live"), &["a", "b"]);
        let mut history = ActionHistory::new(MemoryHistoryStore::new(dir.path().join("scratch")), 10);
        history.prepare(&live).unwrap();

        history.stage(&live).unwrap();
        overwrite_first(&live, "changed");

        assert!(history.undo(&mut live).unwrap());
        assert_eq!(contents(&live), ["a", "b"]);

        assert!(history.redo(&mut live).unwrap());
        assert_eq!(contents(&live), ["changed", "b"]);

        assert!(history.reset(&mut live).unwrap());
        assert_eq!(contents(&live), ["a", "b"]);
    }

    #[test]
    fn test_clear_releases_snapshot_directories() {
        let dir = tempfile::tempdir().unwrap();
        let history_root = dir.path().join("history");
        let live = sequence_of(&dir.path().join("live"), &["a"]);
        let mut history = ActionHistory::new(FsHistoryStore::new(&history_root), 10);

        history.prepare(&live).unwrap();
        history.stage(&live).unwrap();
        assert_eq!(fs::read_dir(&history_root).unwrap().count(), 2);

        history.clear();
        assert_eq!(fs::read_dir(&history_root).unwrap().count(), 0);
        assert!(!history.has_base());
    }
}
