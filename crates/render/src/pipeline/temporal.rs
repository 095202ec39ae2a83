use super::Recorder;
use crate::command::{Pass, TemporalParams};
use crate::config::FogConfig;
use crate::targets::{TargetId, VisibilityBuffer};

/// Number of saturate passes after the temporal blend.
pub const SATURATE_PASSES: usize = 2;

pub fn temporal_params(config: &FogConfig, delta_time: f32) -> TemporalParams {
    TemporalParams {
        noise_scale: config.noise_scale,
        noise_magnitude: config.noise_magnitude,
        blend_factor: config.blend_speed * delta_time.max(0.0),
    }
}

/// Blend this frame's field into the history buffer, then sharpen it twice.
///
/// Afterwards the primary buffer holds the blend saturated once, ready for the
/// blur, and the history buffer holds it saturated twice for the next frame.
pub fn record_temporal(rec: &mut Recorder<'_>, config: &FogConfig, delta_time: f32) {
    let _span = tracing::info_span!("temporal", delta_time).entered();
    let primary = TargetId::Visibility(VisibilityBuffer::Primary);
    let history = TargetId::Visibility(VisibilityBuffer::History);

    rec.blit(primary, history, Pass::Temporal(temporal_params(config, delta_time)));
    rec.blit(history, primary, Pass::Saturate);
    rec.blit(primary, history, Pass::Saturate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandList};
    use crate::targets::ScratchStack;

    #[test]
    fn saturates_exactly_twice() {
        let mut list = CommandList::new("fog");
        let mut scratch = ScratchStack::new();
        let mut rec = Recorder::new(&mut list, &mut scratch);
        record_temporal(&mut rec, &FogConfig::default(), 0.016);
        assert_eq!(list.count_blits("temporal"), 1);
        assert_eq!(list.count_blits("saturate"), SATURATE_PASSES);
        assert_eq!(list.len(), 3);
        assert_eq!(scratch.pushed(), 0);
    }

    #[test]
    fn blend_lands_in_history_and_ends_in_primary_once_saturated() {
        let mut list = CommandList::new("fog");
        let mut scratch = ScratchStack::new();
        let mut rec = Recorder::new(&mut list, &mut scratch);
        record_temporal(&mut rec, &FogConfig::default(), 0.1);
        let primary = TargetId::Visibility(VisibilityBuffer::Primary);
        let history = TargetId::Visibility(VisibilityBuffer::History);
        let routes: Vec<(TargetId, TargetId)> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Blit { src, dst, .. } => Some((*src, *dst)),
                _ => None,
            })
            .collect();
        assert_eq!(routes, vec![(primary, history), (history, primary), (primary, history)]);
    }

    #[test]
    fn factor_scales_with_elapsed_time() {
        let cfg = FogConfig {
            blend_speed: 4.0,
            ..FogConfig::default()
        };
        assert_eq!(temporal_params(&cfg, 0.0).blend_factor, 0.0);
        assert_eq!(temporal_params(&cfg, 0.25).blend_factor, 1.0);
        assert_eq!(temporal_params(&cfg, -1.0).blend_factor, 0.0);
    }
}
