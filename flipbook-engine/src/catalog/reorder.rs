//! Positional operations: reverse, yoyo and delete

use super::scoped_indices;
use crate::request::Scope;
use crate::{EngineError, Result};
use flipbook_core::{AffectedRange, FrameRecord, FrameSequence, Removal};

/// Reverses the order of the scoped frames among their own positions
pub(crate) fn reverse(sequence: &mut FrameSequence, scope: &Scope) -> Result<AffectedRange> {
    if *scope == Scope::All {
        return Ok(sequence.reverse()?);
    }

    let indices = scoped_indices(scope, sequence)?;
    let count = indices.len();
    for i in 0..count / 2 {
        sequence.swap(indices[i], indices[count - 1 - i])?;
    }

    AffectedRange::spanning(indices).ok_or_else(|| EngineError::rejected("no frames selected"))
}

/// Appends the mirrored interior of the scoped frames right after the last of them
pub(crate) fn yoyo(sequence: &mut FrameSequence, scope: &Scope) -> Result<AffectedRange> {
    if *scope == Scope::All {
        return sequence
            .yoyo()?
            .ok_or_else(|| EngineError::rejected("yoyo needs at least three frames"));
    }

    let indices = scoped_indices(scope, sequence)?;
    if indices.len() < 3 {
        return Err(EngineError::rejected("yoyo needs at least three frames"));
    }

    let mut mirrored: Vec<FrameRecord> = Vec::with_capacity(indices.len() - 2);
    for &index in indices[1..indices.len() - 1].iter().rev() {
        match sequence.frames()[index].copy_to(sequence.root()) {
            Ok(copy) => mirrored.push(copy),
            Err(e) => {
                for copy in mirrored {
                    let _ = copy.delete();
                }
                return Err(e.into());
            }
        }
    }

    let at = indices[indices.len() - 1] + 1;
    let range = sequence.insert_range(at, mirrored)?;
    Ok(range)
}

/// Removes the scoped frames and their files
pub(crate) fn delete(sequence: &mut FrameSequence, scope: &Scope) -> Result<AffectedRange> {
    let indices = scoped_indices(scope, sequence)?;
    if indices.len() == sequence.len() {
        return Err(EngineError::rejected("deleting every frame discards the sequence"));
    }

    match sequence.remove_many(&indices)? {
        Removal::Removed { from } => {
            let last = sequence.len() - 1;
            Ok(AffectedRange::new(from.min(last), last))
        }
        Removal::Discarded => Err(EngineError::rejected("the sequence was discarded")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::apply;
    use super::super::testing::*;
    use super::*;
    use crate::request::TransformationRequest;
    use flipbook_core::MoveDirection;
    use image::Rgba;

    fn colors(fixture: &Fixture, sequence: &FrameSequence) -> Vec<Rgba<u8>> {
        (0..sequence.len())
            .map(|index| fixture.pixel(sequence, index, 0, 0))
            .collect()
    }

    #[test]
    fn test_reverse_whole_and_selected() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 1, 1);

        apply(
            TransformationRequest::Reverse { scope: Scope::All },
            &mut sequence,
            &mut fixture.ctx(),
        )
        .unwrap();
        assert_eq!(colors(&fixture, &sequence), [Rgba(BLUE), Rgba(GREEN), Rgba(RED)]);

        let range = apply(
            TransformationRequest::Reverse {
                scope: Scope::Selected(vec![0, 1]),
            },
            &mut sequence,
            &mut fixture.ctx(),
        )
        .unwrap();
        assert_eq!(range, AffectedRange::new(0, 1));
        assert_eq!(colors(&fixture, &sequence), [Rgba(GREEN), Rgba(BLUE), Rgba(RED)]);
    }

    #[test]
    fn test_yoyo_whole_sequence() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 1, 1);

        let range = apply(
            TransformationRequest::Yoyo { scope: Scope::All },
            &mut sequence,
            &mut fixture.ctx(),
        )
        .unwrap();
        assert_eq!(range, AffectedRange::single(3));
        assert_eq!(
            colors(&fixture, &sequence),
            [Rgba(RED), Rgba(GREEN), Rgba(BLUE), Rgba(GREEN)]
        );
    }

    #[test]
    fn test_yoyo_selection_inserts_after_last_selected() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE, RED], 1, 1);

        let range = apply(
            TransformationRequest::Yoyo {
                scope: Scope::Selected(vec![0, 1, 2]),
            },
            &mut sequence,
            &mut fixture.ctx(),
        )
        .unwrap();
        assert_eq!(range, AffectedRange::new(3, 4));
        assert_eq!(
            colors(&fixture, &sequence),
            [Rgba(RED), Rgba(GREEN), Rgba(BLUE), Rgba(GREEN), Rgba(RED)]
        );
    }

    #[test]
    fn test_move_wraps_as_block() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 1, 1);

        let request = TransformationRequest::Move {
            selection: vec![1, 2],
            direction: MoveDirection::Right,
        };
        apply(request, &mut sequence, &mut fixture.ctx()).unwrap();
        assert_eq!(colors(&fixture, &sequence), [Rgba(GREEN), Rgba(BLUE), Rgba(RED)]);
    }

    #[test]
    fn test_delete_removes_files() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 1, 1);
        let removed = sequence.frames()[2].image_location.clone();

        let range = apply(
            TransformationRequest::Delete {
                scope: Scope::Selected(vec![2]),
            },
            &mut sequence,
            &mut fixture.ctx(),
        )
        .unwrap();
        assert_eq!(range, AffectedRange::single(1));
        assert_eq!(sequence.len(), 2);
        assert!(!removed.exists());

        let err = apply(
            TransformationRequest::Delete { scope: Scope::All },
            &mut sequence,
            &mut fixture.ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
        assert_eq!(sequence.len(), 2);
    }
}
