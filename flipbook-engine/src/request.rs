//! Transformation requests
//!
//! Each catalog entry is one variant carrying exactly the parameters it needs.

use flipbook_codec::{CropRect, FlipRotate};
use flipbook_core::{FrameRecord, MoveDirection};
use image::RgbaImage;
use std::path::PathBuf;

/// Which frames a request touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Selected(Vec<usize>),
}

impl Scope {
    /// Resolves the scope to sorted, deduplicated indices for a sequence of `len` frames
    pub fn indices(&self, len: usize) -> Vec<usize> {
        match self {
            Scope::All => (0..len).collect(),
            Scope::Selected(indices) => {
                let mut indices = indices.clone();
                indices.sort_unstable();
                indices.dedup();
                indices
            }
        }
    }
}

/// How a delay edit combines with the current value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMode {
    /// Replace with an absolute value
    Override(u32),
    /// Add a signed delta
    Change(i64),
}

/// Side the incoming frame enters from in a slide transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlideFrom {
    #[default]
    Right,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Fade,
    Slide(SlideFrom),
}

/// A free-hand stroke in frame pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub points: Vec<(f32, f32)>,
    pub width: f32,
}

impl Stroke {
    /// Checks whether the pixel center at (`x`, `y`) lies under the stroke
    pub fn covers(&self, x: f32, y: f32) -> bool {
        let radius = (self.width / 2.0).max(0.5);
        match self.points.as_slice() {
            [] => false,
            [(px, py)] => (x - px).hypot(y - py) <= radius,
            points => points
                .windows(2)
                .any(|pair| segment_distance((x, y), pair[0], pair[1]) <= radius),
        }
    }
}

fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    (p.0 - cx).hypot(p.1 - cy)
}

/// A catalog operation and its parameters
#[derive(Debug, Clone)]
pub enum TransformationRequest {
    /// Resample every frame; with `keep_aspect` the height follows the width
    Resize {
        width: u32,
        height: u32,
        dpi: f64,
        keep_aspect: bool,
    },
    /// Crop every frame to the rectangle
    Crop(CropRect),
    /// Flip the scoped frames, or rotate every frame
    FlipRotate { op: FlipRotate, scope: Scope },
    /// Composite a pre-rendered bitmap at the origin of the scoped frames
    Overlay {
        bitmap: RgbaImage,
        dpi: f64,
        scope: Scope,
    },
    /// Freeze everything outside the strokes to the first frame's content
    Cinemagraph { strokes: Vec<Stroke> },
    /// Insert a pre-rendered title bitmap as a new frame before `at`
    TitleFrame {
        bitmap: RgbaImage,
        at: usize,
        delay_ms: Option<u32>,
    },
    /// Edit frame delays
    Delay { mode: DelayMode, scope: Scope },
    /// Synthesize `count` frames between `anchor` and the frame after it
    Transition {
        anchor: usize,
        count: usize,
        kind: TransitionKind,
    },
    Reverse { scope: Scope },
    Yoyo { scope: Scope },
    /// Move the selected frames one step, wrapping at the ends
    Move {
        selection: Vec<usize>,
        direction: MoveDirection,
    },
    /// Remove frames; removing every frame is a discard, not a delete
    Delete { scope: Scope },
    /// Decode a source and insert its frames at `at`
    Import { source: PathBuf, at: usize },
    /// Insert frames already written into the sequence's directory
    Insert { records: Vec<FrameRecord>, at: usize },
    /// Burn pending cursor overlays into their frames
    MergeCursors,
}

impl TransformationRequest {
    /// Short label used in logs and progress descriptions
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "Resizing",
            Self::Crop(_) => "Cropping",
            Self::FlipRotate { op, .. } if op.is_rotation() => "Rotating",
            Self::FlipRotate { .. } => "Flipping",
            Self::Overlay { .. } => "Applying overlay",
            Self::Cinemagraph { .. } => "Applying cinemagraph",
            Self::TitleFrame { .. } => "Inserting title frame",
            Self::Delay { .. } => "Changing delay",
            Self::Transition { .. } => "Applying transition",
            Self::Reverse { .. } => "Reversing",
            Self::Yoyo { .. } => "Applying yoyo",
            Self::Move { .. } => "Moving frames",
            Self::Delete { .. } => "Deleting frames",
            Self::Import { .. } => "Importing",
            Self::Insert { .. } => "Pasting",
            Self::MergeCursors => "Merging cursors",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_indices_are_normalized() {
        assert_eq!(Scope::All.indices(3), [0, 1, 2]);
        assert_eq!(Scope::Selected(vec![4, 1, 4]).indices(10), [1, 4]);
    }

    #[test]
    fn test_stroke_coverage() {
        let stroke = Stroke {
            points: vec![(0.0, 0.0), (10.0, 0.0)],
            width: 2.0,
        };
        assert!(stroke.covers(5.0, 0.5));
        assert!(stroke.covers(10.5, 0.0));
        assert!(!stroke.covers(5.0, 3.0));

        let dot = Stroke {
            points: vec![(2.0, 2.0)],
            width: 4.0,
        };
        assert!(dot.covers(3.0, 3.0));
        assert!(!dot.covers(6.0, 2.0));
    }
}
