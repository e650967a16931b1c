//! Ordered, file-backed frame sequence

use crate::frame::{fresh_location, FrameRecord};
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default DPI of sequences that were never resized
pub const DEFAULT_DPI: f64 = 96.0;

/// Inclusive index interval touched by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffectedRange {
    /// First affected index
    pub start: usize,
    /// Last affected index (inclusive)
    pub end: usize,
}

impl AffectedRange {
    /// Creates a range from two bounds in any order
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Creates a range covering a single index
    pub fn single(index: usize) -> Self {
        Self::new(index, index)
    }

    /// Smallest range covering every index, or `None` for an empty iterator
    pub fn spanning<I: IntoIterator<Item = usize>>(indices: I) -> Option<Self> {
        indices.into_iter().fold(None, |acc, index| match acc {
            None => Some(Self::single(index)),
            Some(range) => Some(range.union(Self::single(index))),
        })
    }

    /// Smallest range covering both ranges
    pub fn union(self, other: Self) -> Self {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Checks whether the range contains `index`
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }

    /// Number of indices in the range
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false, a range covers at least one index
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Outcome of removing frames from a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Frames were removed; positions from `from` onwards were renumbered
    Removed { from: usize },
    /// Every frame was selected, so the whole working directory was discarded
    Discarded,
}

/// Direction of a selection move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Left,
    Right,
}

/// Result of moving a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moved {
    /// New positions of the moved frames, ascending
    pub selection: Vec<usize>,
    /// Positions whose frame changed
    pub range: AffectedRange,
}

/// Ordered list of frame records rooted at a working directory.
///
/// Indices are positional: no record remembers its own index, so every
/// insert, removal or reorder implicitly renumbers the frames after it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    root: PathBuf,
    frames: Vec<FrameRecord>,
    dpi: f64,
}

impl FrameSequence {
    /// Creates an empty sequence whose files live under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_records(root, Vec::new())
    }

    /// Creates a sequence from existing records
    pub fn from_records(root: impl Into<PathBuf>, frames: Vec<FrameRecord>) -> Self {
        Self {
            root: root.into(),
            frames,
            dpi: DEFAULT_DPI,
        }
    }

    /// Sets the sequence DPI
    pub fn with_dpi(mut self, dpi: f64) -> Self {
        self.dpi = dpi;
        self
    }

    /// Working directory holding the frame files
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    pub fn set_dpi(&mut self, dpi: f64) {
        self.dpi = dpi;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the last frame, if any
    pub fn last_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(1)
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.frames.iter()
    }

    pub fn get(&self, index: usize) -> Option<&FrameRecord> {
        self.frames.get(index)
    }

    /// Gets a frame, failing with `OutOfRange` for a bad index
    pub fn frame(&self, index: usize) -> Result<&FrameRecord> {
        self.check_index(index)?;
        Ok(&self.frames[index])
    }

    /// Gets a mutable frame, failing with `OutOfRange` for a bad index
    pub fn frame_mut(&mut self, index: usize) -> Result<&mut FrameRecord> {
        self.check_index(index)?;
        Ok(&mut self.frames[index])
    }

    /// Fails with `OutOfRange` unless `index` addresses an existing frame
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.frames.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.frames.len(),
            });
        }
        Ok(())
    }

    /// Sorts and deduplicates a selection, validating every index
    pub fn normalize_selection(&self, indices: &[usize]) -> Result<Vec<usize>> {
        if indices.is_empty() {
            return Err(Error::EmptySelection);
        }

        let mut selection = indices.to_vec();
        selection.sort_unstable();
        selection.dedup();

        if let Some(&last) = selection.last() {
            self.check_index(last)?;
        }
        Ok(selection)
    }

    /// Sum of all frame delays in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| u64::from(f.delay_ms())).sum()
    }

    /// Inserts records at `at`, shifting the frames after it
    pub fn insert_range(&mut self, at: usize, records: Vec<FrameRecord>) -> Result<AffectedRange> {
        if at > self.frames.len() {
            return Err(Error::OutOfRange {
                index: at,
                len: self.frames.len(),
            });
        }
        if records.is_empty() {
            return Err(Error::EmptySelection);
        }

        self.frames.splice(at..at, records);
        Ok(AffectedRange::new(at, self.frames.len() - 1))
    }

    /// Removes one frame and deletes its file
    pub fn remove_at(&mut self, index: usize) -> Result<Removal> {
        self.remove_many(&[index])
    }

    /// Removes the selected frames and deletes their files.
    ///
    /// Selecting every frame discards the whole working directory instead
    /// of leaving an empty sequence behind.
    pub fn remove_many(&mut self, indices: &[usize]) -> Result<Removal> {
        let selection = self.normalize_selection(indices)?;

        if selection.len() == self.frames.len() {
            self.discard()?;
            return Ok(Removal::Discarded);
        }

        for &index in selection.iter().rev() {
            let record = self.frames.remove(index);
            record.delete()?;
        }

        tracing::debug!(removed = selection.len(), remaining = self.frames.len(), "Frames removed");
        Ok(Removal::Removed { from: selection[0] })
    }

    /// Deletes every frame file and the working directory, leaving the sequence empty
    pub fn discard(&mut self) -> Result<()> {
        for record in self.frames.drain(..) {
            record.delete()?;
        }

        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        tracing::debug!(root = %self.root.display(), "Sequence discarded");
        Ok(())
    }

    /// Copies every frame file into `dir`, keeping file names, and returns the copy
    pub fn duplicate_into(&self, dir: &Path) -> Result<FrameSequence> {
        fs::create_dir_all(dir)?;

        let mut frames = Vec::with_capacity(self.frames.len());
        for record in &self.frames {
            let file_name = record
                .image_location
                .file_name()
                .ok_or_else(|| Error::MissingFrame(record.image_location.display().to_string()))?;
            let destination = dir.join(file_name);
            fs::copy(&record.image_location, &destination)?;

            let mut copy = record.clone();
            copy.image_location = destination;
            frames.push(copy);
        }

        Ok(FrameSequence {
            root: dir.to_path_buf(),
            frames,
            dpi: self.dpi,
        })
    }

    /// Reverses the frame order
    pub fn reverse(&mut self) -> Result<AffectedRange> {
        let last = self.last_index().ok_or(Error::EmptySelection)?;
        self.frames.reverse();
        Ok(AffectedRange::new(0, last))
    }

    /// Appends the mirrored interior of the sequence, turning `[A, B, C]` into `[A, B, C, B]`.
    ///
    /// Mirrored frames get their own file copies so every record keeps owning
    /// its file. Returns `None` when there is no interior to mirror.
    pub fn yoyo(&mut self) -> Result<Option<AffectedRange>> {
        let len = self.frames.len();
        if len < 3 {
            return Ok(None);
        }

        let mut mirrored = Vec::with_capacity(len - 2);
        for record in self.frames[1..len - 1].iter().rev() {
            mirrored.push(record.copy_to(&self.root)?);
        }

        self.frames.extend(mirrored);
        Ok(Some(AffectedRange::new(len, self.frames.len() - 1)))
    }

    /// Moves one frame by `delta` positions, wrapping around the ends
    pub fn move_by(&mut self, index: usize, delta: isize) -> Result<AffectedRange> {
        self.check_index(index)?;

        let len = self.frames.len() as isize;
        let target = (index as isize + delta).rem_euclid(len) as usize;

        let record = self.frames.remove(index);
        self.frames.insert(target, record);
        Ok(AffectedRange::new(index, target))
    }

    /// Moves a selection one step, keeping the relative order of the selected frames.
    ///
    /// A selected run touching the edge it moves towards wraps to the
    /// opposite end as a block.
    pub fn move_selection(&mut self, indices: &[usize], direction: MoveDirection) -> Result<Moved> {
        let selection = self.normalize_selection(indices)?;
        let len = self.frames.len();

        if selection.len() == len {
            return Ok(Moved {
                selection,
                range: AffectedRange::new(0, len - 1),
            });
        }

        match direction {
            MoveDirection::Left => Ok(self.move_left(&selection)),
            MoveDirection::Right => Ok(self.move_right(&selection)),
        }
    }

    fn move_left(&mut self, selection: &[usize]) -> Moved {
        let len = self.frames.len();
        let lead = selection
            .iter()
            .enumerate()
            .take_while(|(position, &index)| *position == index)
            .count();

        let wrapped: Vec<FrameRecord> = self.frames.drain(..lead).collect();

        let mut moved = Vec::with_capacity(selection.len());
        for &index in &selection[lead..] {
            let position = index - lead;
            self.frames.swap(position - 1, position);
            moved.push(position - 1);
        }

        let tail = self.frames.len();
        self.frames.extend(wrapped);
        moved.extend(tail..tail + lead);
        moved.sort_unstable();

        let range = if lead > 0 {
            AffectedRange::new(0, len - 1)
        } else {
            AffectedRange::new(selection[0] - 1, selection[selection.len() - 1])
        };

        Moved {
            selection: moved,
            range,
        }
    }

    fn move_right(&mut self, selection: &[usize]) -> Moved {
        let len = self.frames.len();
        let trail = selection
            .iter()
            .rev()
            .enumerate()
            .take_while(|(position, &index)| index == len - 1 - *position)
            .count();

        let wrapped: Vec<FrameRecord> = self.frames.drain(len - trail..).collect();

        let mut moved = Vec::with_capacity(selection.len());
        for &index in selection[..selection.len() - trail].iter().rev() {
            self.frames.swap(index, index + 1);
            moved.push(index + 1 + trail);
        }

        self.frames.splice(0..0, wrapped);
        moved.extend(0..trail);
        moved.sort_unstable();

        let range = if trail > 0 {
            AffectedRange::new(0, len - 1)
        } else {
            AffectedRange::new(selection[0], selection[selection.len() - 1] + 1)
        };

        Moved {
            selection: moved,
            range,
        }
    }

    /// Exchanges the frames at two positions
    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_index(a)?;
        self.check_index(b)?;
        self.frames.swap(a, b);
        Ok(())
    }

    /// Sets a frame delay, clamped to the minimum. Returns the stored value.
    pub fn set_delay(&mut self, index: usize, delay_ms: u32) -> Result<u32> {
        Ok(self.frame_mut(index)?.set_delay(delay_ms))
    }

    /// Generates a fresh file location inside the working directory
    pub fn fresh_location(&self, extension: &str) -> PathBuf {
        fresh_location(&self.root, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MIN_DELAY_MS;

    fn sequence_of(dir: &Path, names: &[&str]) -> FrameSequence {
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

    #[test]
    fn test_affected_range_helpers() {
        let range = AffectedRange::new(5, 2);
        assert_eq!(range, AffectedRange { start: 2, end: 5 });
        assert_eq!(range.len(), 4);
        assert!(range.contains(2) && range.contains(5) && !range.contains(6));
        assert_eq!(
            AffectedRange::spanning([7, 3, 9]),
            Some(AffectedRange::new(3, 9))
        );
        assert_eq!(AffectedRange::spanning(Vec::new()), None);
    }

    #[test]
    fn test_insert_range_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["a", "b"]);

        let extra = dir.path().join("x.png");
        fs::write(&extra, b"x").unwrap();

        let err = sequence
            .insert_range(3, vec![FrameRecord::new(&extra, 50)])
            .unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: 3, len: 2 }));

        let range = sequence
            .insert_range(1, vec![FrameRecord::new(&extra, 50)])
            .unwrap();
        assert_eq!(range, AffectedRange::new(1, 2));
        assert_eq!(contents(&sequence), ["a", "x", "b"]);
    }

    #[test]
    fn test_remove_many_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["a", "b", "c", "d"]);
        let removed_path = sequence.frames()[1].image_location.clone();

        let removal = sequence.remove_many(&[3, 1]).unwrap();
        assert_eq!(removal, Removal::Removed { from: 1 });
        assert_eq!(contents(&sequence), ["a", "c"]);
        assert!(!removed_path.exists());
    }

    #[test]
    fn test_remove_all_discards_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        fs::create_dir_all(&root).unwrap();
        let mut sequence = sequence_of(&root, &["a", "b"]);
        fs::write(root.join("stray.tmp"), b"left over").unwrap();

        let removal = sequence.remove_many(&[0, 1]).unwrap();
        assert_eq!(removal, Removal::Discarded);
        assert!(sequence.is_empty());
        assert!(!root.exists());
    }

    #[test]
    fn test_reverse_and_yoyo() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["A", "B", "C"]);

        sequence.reverse().unwrap();
        assert_eq!(contents(&sequence), ["C", "B", "A"]);
        sequence.reverse().unwrap();

        let range = sequence.yoyo().unwrap().unwrap();
        assert_eq!(range, AffectedRange::new(3, 3));
        assert_eq!(contents(&sequence), ["A", "B", "C", "B"]);
        assert_ne!(
            sequence.frames()[1].image_location,
            sequence.frames()[3].image_location
        );
    }

    #[test]
    fn test_yoyo_without_interior_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["A", "B"]);
        assert_eq!(sequence.yoyo().unwrap(), None);
        assert_eq!(sequence.len(), 2);
    }

    #[test]
    fn test_move_by_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["A", "B", "C", "D"]);

        sequence.move_by(0, -1).unwrap();
        assert_eq!(contents(&sequence), ["B", "C", "D", "A"]);

        sequence.move_by(3, 1).unwrap();
        assert_eq!(contents(&sequence), ["A", "B", "C", "D"]);

        let range = sequence.move_by(1, 1).unwrap();
        assert_eq!(range, AffectedRange::new(1, 2));
        assert_eq!(contents(&sequence), ["A", "C", "B", "D"]);
    }

    #[test]
    fn test_move_selection_keeps_relative_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["A", "B", "C", "D", "E"]);

        let moved = sequence
            .move_selection(&[2, 1], MoveDirection::Left)
            .unwrap();
        assert_eq!(contents(&sequence), ["B", "C", "A", "D", "E"]);
        assert_eq!(moved.selection, [0, 1]);
        assert_eq!(moved.range, AffectedRange::new(0, 2));

        let moved = sequence
            .move_selection(&[0, 1], MoveDirection::Left)
            .unwrap();
        assert_eq!(contents(&sequence), ["A", "D", "E", "B", "C"]);
        assert_eq!(moved.selection, [3, 4]);

        let moved = sequence
            .move_selection(&[3, 4], MoveDirection::Right)
            .unwrap();
        assert_eq!(contents(&sequence), ["B", "C", "A", "D", "E"]);
        assert_eq!(moved.selection, [0, 1]);

        let moved = sequence
            .move_selection(&[0, 2], MoveDirection::Right)
            .unwrap();
        assert_eq!(contents(&sequence), ["C", "B", "D", "A", "E"]);
        assert_eq!(moved.selection, [1, 3]);
        assert_eq!(moved.range, AffectedRange::new(0, 3));
    }

    #[test]
    fn test_set_delay_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_of(dir.path(), &["A"]);
        assert_eq!(sequence.set_delay(0, 1).unwrap(), MIN_DELAY_MS);
        assert!(matches!(
            sequence.set_delay(4, 100),
            Err(Error::OutOfRange { index: 4, len: 1 })
        ));
    }

    #[test]
    fn test_duplicate_into_keeps_names() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_of(dir.path(), &["A", "B"]);
        let copy = sequence.duplicate_into(&dir.path().join("copy")).unwrap();

        assert_eq!(contents(&copy), ["A", "B"]);
        assert_eq!(
            copy.frames()[0].image_location.file_name(),
            sequence.frames()[0].image_location.file_name()
        );
        assert_ne!(copy.root(), sequence.root());
    }
}
