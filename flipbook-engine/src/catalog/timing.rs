//! Frame delay edits

use super::{for_each_frame, scoped_indices, ApplyContext};
use crate::request::{DelayMode, Scope};
use crate::Result;
use flipbook_core::{AffectedRange, FrameSequence};

/// Overrides or shifts the delay of every scoped frame, never going below the floor
pub(crate) fn change_delay(
    sequence: &mut FrameSequence,
    mode: DelayMode,
    scope: &Scope,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let indices = scoped_indices(scope, sequence)?;

    for_each_frame(ctx, "Changing delay", &indices, |index| {
        let frame = sequence.frame_mut(index)?;
        match mode {
            DelayMode::Override(value) => frame.set_delay(value),
            DelayMode::Change(delta) => frame.adjust_delay(delta),
        };
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::super::apply;
    use super::super::testing::*;
    use crate::request::TransformationRequest;
    use crate::request::{DelayMode, Scope};
    use flipbook_core::{AffectedRange, MIN_DELAY_MS};

    fn delays(sequence: &flipbook_core::FrameSequence) -> Vec<u32> {
        sequence.iter().map(|f| f.delay_ms()).collect()
    }

    #[test]
    fn test_override_selected() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 1, 1);

        let request = TransformationRequest::Delay {
            mode: DelayMode::Override(250),
            scope: Scope::Selected(vec![2, 0]),
        };
        let range = apply(request, &mut sequence, &mut fixture.ctx()).unwrap();

        assert_eq!(range, AffectedRange::new(0, 2));
        assert_eq!(delays(&sequence), [250, 100, 250]);
    }

    #[test]
    fn test_floor_holds_for_every_mode() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN], 1, 1);

        for mode in [DelayMode::Override(0), DelayMode::Change(-1_000), DelayMode::Change(-95)] {
            let request = TransformationRequest::Delay {
                mode,
                scope: Scope::All,
            };
            apply(request, &mut sequence, &mut fixture.ctx()).unwrap();
            assert!(sequence.iter().all(|f| f.delay_ms() >= MIN_DELAY_MS));
        }

        let request = TransformationRequest::Delay {
            mode: DelayMode::Change(15),
            scope: Scope::All,
        };
        apply(request, &mut sequence, &mut fixture.ctx()).unwrap();
        assert_eq!(delays(&sequence), [25, 25]);
    }
}
