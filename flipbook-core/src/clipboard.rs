//! Clipboard store for cut and copied frames

use crate::frame::FrameRecord;
use crate::sequence::FrameSequence;
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How a clip entered the clipboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    Cut,
    Copy,
}

/// A stored clip: private copies of the selected frames
#[derive(Debug, Clone)]
pub struct ClipEntry {
    /// Whether the frames were cut or copied
    pub kind: ClipKind,
    /// Directory holding this clip's files
    pub dir: PathBuf,
    /// Copied frame records, in sequence order
    pub frames: Vec<FrameRecord>,
    /// Positions the frames had in the source sequence
    pub source_indices: Vec<usize>,
}

impl ClipEntry {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Slot-indexed storage for clips, independent of the undo history.
///
/// Clips never alias the files of a live sequence: cut and copy duplicate
/// the frames into the clip directory and paste duplicates them again.
#[derive(Debug)]
pub struct ClipboardStore {
    root: PathBuf,
    entries: Vec<ClipEntry>,
}

impl ClipboardStore {
    /// Creates an empty clipboard keeping its files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClipEntry] {
        &self.entries
    }

    /// Gets a clip by slot
    pub fn get(&self, slot: usize) -> Result<&ClipEntry> {
        self.entries.get(slot).ok_or(Error::InvalidSlot(slot))
    }

    /// Copies the selected frames into a new slot for a cut.
    ///
    /// The caller removes the originals from the sequence afterwards. Cutting
    /// every frame is refused; the whole sequence has to be discarded instead.
    pub fn cut(&mut self, sequence: &FrameSequence, indices: &[usize]) -> Result<usize> {
        let selection = sequence.normalize_selection(indices)?;
        if selection.len() == sequence.len() {
            return Err(Error::WholeSequenceCut);
        }
        self.store(ClipKind::Cut, sequence, selection)
    }

    /// Copies the selected frames into a new slot
    pub fn copy(&mut self, sequence: &FrameSequence, indices: &[usize]) -> Result<usize> {
        let selection = sequence.normalize_selection(indices)?;
        self.store(ClipKind::Copy, sequence, selection)
    }

    fn store(
        &mut self,
        kind: ClipKind,
        sequence: &FrameSequence,
        selection: Vec<usize>,
    ) -> Result<usize> {
        let dir = self.root.join(uuid::Uuid::new_v4().simple().to_string());
        fs::create_dir_all(&dir)?;

        let copied: io::Result<Vec<FrameRecord>> = selection
            .iter()
            .map(|&index| sequence.frames()[index].copy_to(&dir))
            .collect();

        let frames = match copied {
            Ok(frames) => frames,
            Err(e) => {
                let _ = fs::remove_dir_all(&dir);
                return Err(e.into());
            }
        };

        tracing::debug!(?kind, frames = frames.len(), slot = self.entries.len(), "Clip stored");

        self.entries.push(ClipEntry {
            kind,
            dir,
            frames,
            source_indices: selection,
        });
        Ok(self.entries.len() - 1)
    }

    /// Returns fresh copies of a clip's frames written into `destination`.
    ///
    /// Each call produces new files, so pasting the same slot twice yields
    /// two independent sets of frames.
    pub fn paste(&self, slot: usize, destination: &Path) -> Result<Vec<FrameRecord>> {
        let entry = self.get(slot)?;
        fs::create_dir_all(destination)?;

        let mut pasted = Vec::with_capacity(entry.frames.len());
        for frame in &entry.frames {
            match frame.copy_to(destination) {
                Ok(copy) => pasted.push(copy),
                Err(e) => {
                    for copy in pasted {
                        let _ = copy.delete();
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(pasted)
    }

    /// Removes a slot and deletes its files. Later slots shift down by one.
    pub fn remove(&mut self, slot: usize) -> Result<()> {
        if slot >= self.entries.len() {
            return Err(Error::InvalidSlot(slot));
        }

        let entry = self.entries.remove(slot);
        match fs::remove_dir_all(&entry.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Removes every slot
    pub fn clear(&mut self) -> Result<()> {
        while !self.entries.is_empty() {
            self.remove(self.entries.len() - 1)?;
        }
        Ok(())
    }
}
