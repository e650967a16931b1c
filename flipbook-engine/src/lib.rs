//! Flipbook Engine Library
//!
//! This library runs destructive frame transformations over a file-backed
//! [`FrameSequence`](flipbook_core::FrameSequence): the transformation catalog,
//! the single-slot background operation runner, progress reporting and the
//! editor session that ties them to the undo history and the clipboard.

pub mod catalog;
pub mod progress;
pub mod request;
pub mod runner;
pub mod session;

pub use catalog::{apply, validate, ApplyContext};
pub use progress::{LogProgress, NullProgress, Progress, ProgressReporter, ProgressSink};
pub use request::{DelayMode, Scope, SlideFrom, Stroke, TransformationRequest, TransitionKind};
pub use runner::{CompletionSink, OperationHandle, OperationRunner, Outcome, Rejected};
pub use session::{EditorSession, PastePosition};

/// Result type for flipbook-engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types for flipbook-engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Another operation is already running")]
    Busy,

    #[error("{0} is outside the sequence bounds")]
    OutOfRange(String),

    #[error("History snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(#[source] flipbook_codec::Error),

    #[error("Encode failure: {0}")]
    EncodeFailure(#[source] flipbook_codec::Error),

    #[error("Import failed: {0}")]
    ImportFailure(String),

    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Operation cancelled before any frame completed")]
    Cancelled,

    #[error("Operation worker panicked")]
    WorkerPanicked,

    #[error("Flipbook core error: {0}")]
    Core(flipbook_core::Error),
}

impl EngineError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn import(reason: impl std::fmt::Display) -> Self {
        Self::ImportFailure(reason.to_string())
    }
}

impl From<flipbook_core::Error> for EngineError {
    fn from(error: flipbook_core::Error) -> Self {
        use flipbook_core::Error as CoreError;
        match error {
            CoreError::Io(e) => Self::IoFailure(e),
            CoreError::OutOfRange { index, len } => {
                Self::OutOfRange(format!("Index {index} (sequence has {len} frames)"))
            }
            CoreError::SnapshotUnavailable(path) => Self::SnapshotUnavailable(path.display().to_string()),
            CoreError::EmptySelection => Self::rejected("no frames selected"),
            CoreError::WholeSequenceCut => {
                Self::rejected("the entire sequence cannot be cut, discard it instead")
            }
            other => Self::Core(other),
        }
    }
}

impl From<flipbook_codec::Error> for EngineError {
    fn from(error: flipbook_codec::Error) -> Self {
        use flipbook_codec::Error as CodecError;
        match error {
            CodecError::Encode { .. } => Self::EncodeFailure(error),
            CodecError::Io(e) => Self::IoFailure(e),
            other => Self::DecodeFailure(other),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of undo snapshots kept
    pub history_depth: usize,
    /// Frames between progress reports
    pub progress_interval: u64,
    /// Delay of synthesized transition frames in milliseconds
    pub transition_delay_ms: u32,
    /// Delay of frames imported from sources without timing
    pub import_delay_ms: u32,
    /// Delay of inserted title frames in milliseconds
    pub title_frame_delay_ms: u32,
    /// RGBA color of the click highlight drawn under the cursor
    pub click_highlight: [u8; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: 50,
            progress_interval: 5,
            transition_delay_ms: 66,
            import_delay_ms: 66,
            title_frame_delay_ms: 1000,
            click_highlight: [255, 255, 0, 120],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_core_errors_map_to_taxonomy() {
        let err: EngineError = flipbook_core::Error::OutOfRange { index: 4, len: 2 }.into();
        assert!(matches!(err, EngineError::OutOfRange(_)));

        let err: EngineError = flipbook_core::Error::SnapshotUnavailable(PathBuf::from("/gone")).into();
        assert!(matches!(err, EngineError::SnapshotUnavailable(ref p) if p == "/gone"));

        let err: EngineError = flipbook_core::Error::WholeSequenceCut.into();
        assert!(matches!(err, EngineError::Rejected(_)));
    }

    #[test]
    fn test_codec_errors_map_to_taxonomy() {
        let err: EngineError = flipbook_codec::Error::Encode {
            path: PathBuf::from("a.png"),
            reason: "disk full".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::EncodeFailure(_)));

        let err: EngineError = flipbook_codec::Error::Decode {
            path: PathBuf::from("a.png"),
            reason: "truncated".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::DecodeFailure(_)));
    }
}
