//! Editor session
//!
//! Owns the live sequence together with its undo history, the clipboard, the
//! frame selection and the operation runner. Every mutating command stages
//! history before it touches the sequence, and nothing mutates while an
//! operation is in flight.

use crate::catalog;
use crate::progress::{Progress, ProgressSink};
use crate::request::{DelayMode, Scope, TransformationRequest};
use crate::runner::{OperationHandle, OperationRunner, Outcome};
use crate::{EngineConfig, EngineError, Result};
use flipbook_codec::ImageCodec;
use flipbook_core::{
    save_project, ActionHistory, AffectedRange, ClipboardStore, FrameRecord, FrameSequence,
    FsHistoryStore, HistoryStore, DEFAULT_DELAY_MS,
};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where inserted frames land relative to the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PastePosition {
    Before,
    #[default]
    After,
}

fn no_sequence() -> EngineError {
    EngineError::rejected("no sequence loaded")
}

/// Editing session over one frame sequence
pub struct EditorSession<S: HistoryStore = FsHistoryStore> {
    workspace: PathBuf,
    runner: OperationRunner,
    history: ActionHistory<S>,
    clipboard: ClipboardStore,
    sequence: Option<FrameSequence>,
    pending: Option<OperationHandle>,
    selection: Vec<usize>,
    current: Option<usize>,
}

impl EditorSession<FsHistoryStore> {
    /// Creates a session keeping history, clipboard and working frames under `workspace`
    pub fn new(workspace: impl Into<PathBuf>, codec: Arc<dyn ImageCodec>, config: EngineConfig) -> Self {
        let workspace = workspace.into();
        let store = FsHistoryStore::new(workspace.join("history"));
        Self::with_store(workspace, store, codec, config)
    }
}

impl<S: HistoryStore> EditorSession<S> {
    pub fn with_store(
        workspace: impl Into<PathBuf>,
        store: S,
        codec: Arc<dyn ImageCodec>,
        config: EngineConfig,
    ) -> Self {
        let workspace = workspace.into();
        let history = ActionHistory::new(store, config.history_depth);
        Self {
            clipboard: ClipboardStore::new(workspace.join("clipboard")),
            runner: OperationRunner::new(codec, config),
            history,
            workspace,
            sequence: None,
            pending: None,
            selection: Vec::new(),
            current: None,
        }
    }

    /// Forwards operation progress to `sink` as well as to the handle
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.runner = self.runner.with_progress_sink(sink);
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The live sequence, unavailable while an operation runs
    pub fn sequence(&self) -> Option<&FrameSequence> {
        self.sequence.as_ref()
    }

    pub fn history(&self) -> &ActionHistory<S> {
        &self.history
    }

    pub fn clipboard(&self) -> &ClipboardStore {
        &self.clipboard
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn selection(&self) -> &[usize] {
        &self.selection
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    // ---- Loading ----

    /// Replaces the session content with a single blank frame
    pub fn new_blank(&mut self, width: u32, height: u32, color: [u8; 4]) -> Result<()> {
        self.ensure_idle()?;
        if width == 0 || height == 0 {
            return Err(EngineError::rejected("a blank frame needs a non-zero size"));
        }

        let root = self.fresh_root();
        fs::create_dir_all(&root)?;
        let mut sequence = FrameSequence::new(&root);
        let location = sequence.fresh_location("png");
        self.runner
            .codec()
            .encode(&RgbaImage::from_pixel(width, height, Rgba(color)), &location)?;
        sequence.insert_range(0, vec![FrameRecord::new(location, DEFAULT_DELAY_MS)])?;

        tracing::info!(width, height, "Blank sequence created");
        self.replace_sequence(sequence)
    }

    /// Takes ownership of an existing sequence, burning in any cursor overlays
    pub fn load(&mut self, sequence: FrameSequence) -> Result<()> {
        self.ensure_idle()?;

        let sequence = if sequence.iter().any(|f| f.cursor_overlay.is_some()) {
            let outcome = self.run_detached(TransformationRequest::MergeCursors, sequence)?;
            if let Err(error) = &outcome.result {
                tracing::warn!(%error, "Cursor merge failed, continuing without cursors");
            }
            outcome.sequence
        } else {
            sequence
        };

        self.replace_sequence(sequence)
    }

    /// Replaces the session content with frames decoded from `source`
    pub fn open(&mut self, source: &Path) -> Result<()> {
        self.ensure_idle()?;

        let empty = FrameSequence::new(self.fresh_root());
        let request = TransformationRequest::Import {
            source: source.to_path_buf(),
            at: 0,
        };
        let outcome = self.run_detached(request, empty)?;
        if let Err(error) = outcome.result {
            let mut partial = outcome.sequence;
            if let Err(e) = partial.discard() {
                tracing::warn!(error = %e, "Failed to clean up after a failed open");
            }
            return Err(error);
        }

        tracing::info!(source = %source.display(), frames = outcome.sequence.len(), "Opened");
        self.replace_sequence(outcome.sequence)
    }

    /// Inserts frames decoded from `source` next to the current frame
    pub fn import(&mut self, source: &Path, position: PastePosition) -> Result<AffectedRange> {
        let at = self.insertion_index(position)?;
        let range = self.apply(TransformationRequest::Import {
            source: source.to_path_buf(),
            at,
        })?;
        self.select_range(range);
        Ok(range)
    }

    /// Writes the live sequence to a project archive at `path`
    pub fn export_project(&self, path: &Path) -> Result<()> {
        let sequence = self.idle_sequence()?;
        save_project(sequence, path)?;
        tracing::info!(path = %path.display(), frames = sequence.len(), "Project exported");
        Ok(())
    }

    /// Deletes every frame file and all history. The session is empty afterwards.
    pub fn discard(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if let Some(mut sequence) = self.sequence.take() {
            sequence.discard()?;
        }
        self.history.clear();
        self.selection.clear();
        self.current = None;
        tracing::info!("Sequence discarded");
        Ok(())
    }

    // ---- Operations ----

    /// Validates, stages history and starts `request` in the background
    pub fn begin(&mut self, request: TransformationRequest) -> Result<()> {
        self.ensure_idle()?;
        let sequence = self.sequence.take().ok_or_else(no_sequence)?;

        if let Err(error) = catalog::validate(&request, &sequence, self.runner.codec()) {
            self.sequence = Some(sequence);
            return Err(error);
        }
        if let Err(error) = self.history.stage(&sequence) {
            self.sequence = Some(sequence);
            return Err(error.into());
        }

        match self.runner.submit(request, sequence) {
            Ok(handle) => {
                self.pending = Some(handle);
                Ok(())
            }
            Err(rejected) => {
                self.sequence = Some(rejected.sequence);
                Err(rejected.error)
            }
        }
    }

    /// Blocks until the running operation finishes
    pub fn wait(&mut self) -> Result<AffectedRange> {
        let handle = self
            .pending
            .take()
            .ok_or_else(|| EngineError::rejected("no operation running"))?;
        let outcome = handle.wait()?;
        self.finish(outcome)
    }

    /// Returns the result of the running operation once it has finished
    pub fn poll(&mut self) -> Option<Result<AffectedRange>> {
        let polled = self.pending.as_mut()?.try_wait()?;
        self.pending = None;
        Some(polled.and_then(|outcome| self.finish(outcome)))
    }

    /// Runs `request` to completion
    pub fn apply(&mut self, request: TransformationRequest) -> Result<AffectedRange> {
        self.begin(request)?;
        self.wait()
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.pending {
            handle.cancel();
        }
    }

    /// Progress of the running operation since the last call
    pub fn progress(&self) -> Vec<Progress> {
        self.pending.as_ref().map(|h| h.progress()).unwrap_or_default()
    }

    /// Sets the delay of one frame
    pub fn set_delay(&mut self, index: usize, delay_ms: u32) -> Result<AffectedRange> {
        self.apply(TransformationRequest::Delay {
            mode: DelayMode::Override(delay_ms),
            scope: Scope::Selected(vec![index]),
        })
    }

    /// Deletes the selected frames.
    ///
    /// Selecting every frame discards the whole sequence, but only when
    /// `confirm_discard` agrees. Returns `None` when the sequence was discarded.
    pub fn delete_selected(
        &mut self,
        confirm_discard: impl FnOnce() -> bool,
    ) -> Result<Option<AffectedRange>> {
        let sequence = self.idle_sequence()?;
        let selection = sequence.normalize_selection(&self.selection)?;

        if selection.len() == sequence.len() {
            if !confirm_discard() {
                return Err(EngineError::rejected("deleting every frame needs confirmation"));
            }
            self.discard()?;
            return Ok(None);
        }

        let range = self.apply(TransformationRequest::Delete {
            scope: Scope::Selected(selection.clone()),
        })?;
        self.select_near(selection[0]);
        Ok(Some(range))
    }

    /// Deletes every frame before the current one
    pub fn delete_previous(&mut self) -> Result<AffectedRange> {
        let current = self.current_index()?;
        if current == 0 {
            return Err(EngineError::rejected("no frames before the current one"));
        }

        let range = self.apply(TransformationRequest::Delete {
            scope: Scope::Selected((0..current).collect()),
        })?;
        self.go_to(0)?;
        Ok(range)
    }

    /// Deletes every frame after the current one
    pub fn delete_next(&mut self) -> Result<AffectedRange> {
        let current = self.current_index()?;
        let len = self.idle_sequence()?.len();
        if current + 1 >= len {
            return Err(EngineError::rejected("no frames after the current one"));
        }

        let range = self.apply(TransformationRequest::Delete {
            scope: Scope::Selected((current + 1..len).collect()),
        })?;
        self.go_to(current)?;
        Ok(range)
    }

    // ---- History ----

    pub fn undo(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        let sequence = self.sequence.as_mut().ok_or_else(no_sequence)?;
        let undone = self.history.undo(sequence)?;
        self.clamp_selection();
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        let sequence = self.sequence.as_mut().ok_or_else(no_sequence)?;
        let redone = self.history.redo(sequence)?;
        self.clamp_selection();
        Ok(redone)
    }

    /// Returns to the state the sequence was loaded in
    pub fn reset(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        let sequence = self.sequence.as_mut().ok_or_else(no_sequence)?;
        let reset = self.history.reset(sequence)?;
        self.clamp_selection();
        Ok(reset)
    }

    // ---- Clipboard ----

    /// Cuts the selected frames into a new clipboard slot and removes them
    pub fn cut(&mut self) -> Result<usize> {
        self.ensure_idle()?;
        let sequence = self.sequence.as_ref().ok_or_else(no_sequence)?;
        let selection = sequence.normalize_selection(&self.selection)?;
        let slot = self.clipboard.cut(sequence, &selection)?;

        let deleted = self.apply(TransformationRequest::Delete {
            scope: Scope::Selected(selection.clone()),
        });
        if let Err(error) = deleted {
            // The frames stayed in the sequence, so the clip must not linger
            if let Err(e) = self.clipboard.remove(slot) {
                tracing::warn!(slot, error = %e, "Failed to remove clip after failed cut");
            }
            return Err(error);
        }
        self.select_near(selection[0]);
        Ok(slot)
    }

    /// Copies the selected frames into a new clipboard slot
    pub fn copy(&mut self) -> Result<usize> {
        self.ensure_idle()?;
        let sequence = self.sequence.as_ref().ok_or_else(no_sequence)?;
        let slot = self.clipboard.copy(sequence, &self.selection)?;
        Ok(slot)
    }

    /// Inserts fresh copies of a clipboard slot next to the current frame.
    ///
    /// The copies are written before anything is staged, so a failed copy
    /// leaves neither an undo entry nor stray files behind.
    pub fn paste(&mut self, slot: usize, position: PastePosition) -> Result<AffectedRange> {
        let at = self.insertion_index(position)?;
        let root = self.idle_sequence()?.root().to_path_buf();
        let records = self.clipboard.paste(slot, &root)?;

        let copies = records.clone();
        if let Err(error) = self.begin(TransformationRequest::Insert { records, at }) {
            for copy in copies {
                let _ = copy.delete();
            }
            return Err(error);
        }
        let range = self.wait()?;

        tracing::debug!(slot, start = range.start, end = range.end, "Pasted");
        self.select_range(range);
        Ok(range)
    }

    pub fn remove_clip(&mut self, slot: usize) -> Result<()> {
        Ok(self.clipboard.remove(slot)?)
    }

    pub fn clear_clipboard(&mut self) -> Result<()> {
        Ok(self.clipboard.clear()?)
    }

    // ---- Selection ----

    /// Selects `indices`; the last of them becomes the current frame
    pub fn select(&mut self, indices: &[usize]) -> Result<()> {
        let selection = self.idle_sequence()?.normalize_selection(indices)?;
        self.current = selection.last().copied();
        self.selection = selection;
        Ok(())
    }

    pub fn select_all(&mut self) {
        let len = self.sequence.as_ref().map_or(0, FrameSequence::len);
        self.selection = (0..len).collect();
        if self.current.is_none() && len > 0 {
            self.current = Some(0);
        }
    }

    /// Selects exactly the frames that are not selected now
    pub fn select_inverse(&mut self) {
        let len = self.sequence.as_ref().map_or(0, FrameSequence::len);
        let inverse: Vec<usize> = (0..len).filter(|i| !self.selection.contains(i)).collect();
        self.current = inverse.last().copied().or(self.current);
        self.selection = inverse;
    }

    pub fn deselect(&mut self) {
        self.selection.clear();
    }

    /// Makes `index` the current and only selected frame
    pub fn go_to(&mut self, index: usize) -> Result<()> {
        self.idle_sequence()?.check_index(index)?;
        self.selection = vec![index];
        self.current = Some(index);
        Ok(())
    }

    /// Like [`go_to`](Self::go_to), clamping `index` to the last frame
    pub fn select_near(&mut self, index: usize) {
        match self.sequence.as_ref().and_then(FrameSequence::last_index) {
            Some(last) => {
                let index = index.min(last);
                self.selection = vec![index];
                self.current = Some(index);
            }
            None => {
                self.selection.clear();
                self.current = None;
            }
        }
    }

    // ---- Internals ----

    fn ensure_idle(&self) -> Result<()> {
        if self.pending.is_some() {
            return Err(EngineError::Busy);
        }
        Ok(())
    }

    fn idle_sequence(&self) -> Result<&FrameSequence> {
        self.ensure_idle()?;
        self.sequence.as_ref().ok_or_else(no_sequence)
    }

    fn current_index(&self) -> Result<usize> {
        self.idle_sequence()?;
        self.current
            .ok_or_else(|| EngineError::rejected("no current frame"))
    }

    fn insertion_index(&self, position: PastePosition) -> Result<usize> {
        let sequence = self.idle_sequence()?;
        Ok(match (self.current, position) {
            (None, _) => sequence.len(),
            (Some(current), PastePosition::Before) => current,
            (Some(current), PastePosition::After) => current + 1,
        })
    }

    fn fresh_root(&self) -> PathBuf {
        self.workspace
            .join(format!("frames-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Runs a request outside of history, for loading
    fn run_detached(&self, request: TransformationRequest, sequence: FrameSequence) -> Result<Outcome> {
        let handle = self.runner.submit(request, sequence).map_err(|r| r.error)?;
        handle.wait()
    }

    fn replace_sequence(&mut self, sequence: FrameSequence) -> Result<()> {
        if let Some(mut previous) = self.sequence.take() {
            if let Err(e) = previous.discard() {
                tracing::warn!(error = %e, "Failed to discard the previous sequence");
            }
        }

        self.history.prepare(&sequence)?;
        self.sequence = Some(sequence);
        self.select_near(0);
        Ok(())
    }

    fn finish(&mut self, outcome: Outcome) -> Result<AffectedRange> {
        self.sequence = Some(outcome.sequence);
        self.clamp_selection();
        outcome.result
    }

    fn select_range(&mut self, range: AffectedRange) {
        self.selection = (range.start..=range.end).collect();
        self.current = Some(range.end);
    }

    fn clamp_selection(&mut self) {
        let len = self.sequence.as_ref().map_or(0, FrameSequence::len);
        self.selection.retain(|&i| i < len);
        match self.current {
            Some(current) if current >= len => self.select_near(current),
            None if len > 0 => self.select_near(0),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flipbook_codec::ImageCrateCodec;
    use flipbook_core::{CursorOverlay, MemoryHistoryStore};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn recording(dir: &Path, colors: &[[u8; 4]]) -> FrameSequence {
        let root = dir.join("recording");
        fs::create_dir_all(&root).unwrap();
        let frames = colors
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let path = root.join(format!("{i}.png"));
                RgbaImage::from_pixel(4, 4, Rgba(*color)).save(&path).unwrap();
                FrameRecord::new(path, 100)
            })
            .collect();
        FrameSequence::from_records(root, frames)
    }

    fn session(dir: &Path) -> EditorSession {
        EditorSession::new(dir.join("workspace"), Arc::new(ImageCrateCodec), EngineConfig::default())
    }

    fn first_pixels<S: HistoryStore>(session: &EditorSession<S>) -> Vec<[u8; 4]> {
        session
            .sequence()
            .unwrap()
            .iter()
            .map(|f| image::open(&f.image_location).unwrap().to_rgba8().get_pixel(0, 0).0)
            .collect()
    }

    #[test]
    fn test_new_blank() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.new_blank(8, 6, BLUE).unwrap();

        let sequence = session.sequence().unwrap();
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.frames()[0].delay_ms(), DEFAULT_DELAY_MS);
        assert_eq!(first_pixels(&session), [BLUE]);
        assert_eq!(session.current(), Some(0));
        assert!(session.history().has_base());
        assert!(!session.history().can_undo());

        assert!(session.new_blank(0, 6, BLUE).is_err());
    }

    #[test]
    fn test_load_merges_cursor_overlays() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = recording(dir.path(), &[RED, GREEN]);
        let glyph = dir.path().join("cursor.png");
        RgbaImage::from_pixel(1, 1, Rgba(BLUE)).save(&glyph).unwrap();
        sequence.frame_mut(1).unwrap().cursor_overlay = Some(CursorOverlay {
            glyph_location: glyph,
            x: 0,
            y: 0,
            clicked: false,
        });

        let mut session = session(dir.path());
        session.load(sequence).unwrap();

        assert_eq!(first_pixels(&session), [RED, BLUE]);
        assert!(session.sequence().unwrap().iter().all(|f| f.cursor_overlay.is_none()));
    }

    #[test]
    fn test_selection_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.load(recording(dir.path(), &[RED, GREEN, BLUE, RED])).unwrap();

        session.select(&[3, 1, 1]).unwrap();
        assert_eq!(session.selection(), [1, 3]);
        assert_eq!(session.current(), Some(3));

        session.select_inverse();
        assert_eq!(session.selection(), [0, 2]);

        session.select_all();
        assert_eq!(session.selection(), [0, 1, 2, 3]);

        session.deselect();
        assert!(session.selection().is_empty());

        session.select_near(10);
        assert_eq!(session.selection(), [3]);
        assert!(session.go_to(4).is_err());
    }

    #[test]
    fn test_paste_before_and_after_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.load(recording(dir.path(), &[RED, GREEN, BLUE])).unwrap();

        session.go_to(2).unwrap();
        let slot = session.copy().unwrap();

        session.go_to(0).unwrap();
        let range = session.paste(slot, PastePosition::Before).unwrap();
        assert_eq!(range, AffectedRange::single(0));
        assert_eq!(first_pixels(&session), [BLUE, RED, GREEN, BLUE]);

        session.go_to(1).unwrap();
        session.paste(slot, PastePosition::After).unwrap();
        assert_eq!(first_pixels(&session), [BLUE, RED, BLUE, GREEN, BLUE]);
        assert_eq!(session.history().undo_depth(), 2);

        assert!(session.paste(7, PastePosition::After).is_err());
        assert_eq!(session.history().undo_depth(), 2);
    }

    #[test]
    fn test_delete_previous_and_next() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.load(recording(dir.path(), &[RED, GREEN, BLUE, RED])).unwrap();

        session.go_to(1).unwrap();
        session.delete_previous().unwrap();
        assert_eq!(first_pixels(&session), [GREEN, BLUE, RED]);
        assert!(session.delete_previous().is_err());

        session.go_to(1).unwrap();
        session.delete_next().unwrap();
        assert_eq!(first_pixels(&session), [GREEN, BLUE]);
        assert_eq!(session.current(), Some(1));
        assert!(session.delete_next().is_err());
    }

    #[test]
    fn test_delete_all_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.load(recording(dir.path(), &[RED, GREEN])).unwrap();
        let root = session.sequence().unwrap().root().to_path_buf();

        session.select_all();
        assert!(matches!(session.delete_selected(|| false), Err(EngineError::Rejected(_))));
        assert_eq!(session.sequence().unwrap().len(), 2);

        assert_eq!(session.delete_selected(|| true).unwrap(), None);
        assert!(session.sequence().is_none());
        assert!(!root.exists());
        assert!(!session.history().has_base());
    }

    #[test]
    fn test_memory_history_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryHistoryStore::new(dir.path().join("scratch"));
        let mut session = EditorSession::with_store(
            dir.path().join("workspace"),
            store,
            Arc::new(ImageCrateCodec),
            EngineConfig::default(),
        );
        session.load(recording(dir.path(), &[RED, GREEN, BLUE])).unwrap();

        session
            .apply(TransformationRequest::Reverse { scope: Scope::All })
            .unwrap();
        assert_eq!(first_pixels(&session), [BLUE, GREEN, RED]);
        assert!(session.undo().unwrap());
        assert_eq!(first_pixels(&session), [RED, GREEN, BLUE]);
        assert!(!session.undo().unwrap());
    }

    #[test]
    fn test_commands_without_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());

        assert!(matches!(session.undo(), Err(EngineError::Rejected(_))));
        assert!(matches!(session.copy(), Err(EngineError::Rejected(_))));
        assert!(session.wait().is_err());
        assert!(session.poll().is_none());
    }
}
