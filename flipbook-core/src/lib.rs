//! Flipbook Core Library
//!
//! This library provides the file-backed data model of a flipbook animation:
//! frame records, the ordered frame sequence, the undo/redo history, the
//! clipboard store and the project archive container.

pub mod archive;
pub mod clipboard;
pub mod frame;
pub mod history;
pub mod sequence;

pub use archive::{load_project, save_project, ProjectArchive, ProjectFrame, ProjectManifest};
pub use clipboard::{ClipEntry, ClipKind, ClipboardStore};
pub use frame::{CursorOverlay, FrameRecord, DEFAULT_DELAY_MS, MIN_DELAY_MS};
pub use history::{
    ActionHistory, FsHistoryStore, HistoryState, HistoryStore, MemoryHistoryStore,
};
pub use sequence::{AffectedRange, FrameSequence, MoveDirection, Moved, Removal};

use std::path::PathBuf;

/// Result type for flipbook-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for flipbook-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index {index} out of range for a sequence of {len} frames")]
    OutOfRange { index: usize, len: usize },

    #[error("No frames selected")]
    EmptySelection,

    #[error("The entire sequence cannot be cut, discard it instead")]
    WholeSequenceCut,

    #[error("Snapshot unavailable: {}", .0.display())]
    SnapshotUnavailable(PathBuf),

    #[error("Clipboard slot not found: {0}")]
    InvalidSlot(usize),

    #[error("Invalid magic bytes, expected 'FBK\\0'")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Project manifest missing from archive")]
    MissingManifest,

    #[error("Frame file not found in archive: {0}")]
    MissingFrame(String),
}
