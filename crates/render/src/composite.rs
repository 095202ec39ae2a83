use crate::backend::Program;
use crate::command::{Command, OverlayParams, Pass, Published};
use crate::config::Mode;
use crate::pipeline::Recorder;
use crate::projection::MainCamera;
use crate::shading::BASE_LIGHT_LEVEL;
use crate::targets::{TargetId, VisibilityBuffer};

const SHADOW_BLEND_PROGRAMS: &[Program] = &Program::CORE;

const OVERLAY_PROGRAMS: &[Program] = &[
    Program::Vision,
    Program::Occluder,
    Program::Accumulate,
    Program::Temporal,
    Program::Saturate,
    Program::BlurHorizontal,
    Program::BlurVertical,
    Program::Upsample,
    Program::Overlay,
];

/// Final stage of a frame, fixed when the compositor is activated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compositor {
    /// Publish the field for downstream materials and pass the frame through.
    ShadowBlend,
    /// Darken the frame by the field seen through the main camera.
    Overlay { base_level: f32 },
}

impl Compositor {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::ShadowBlend => Compositor::ShadowBlend,
            Mode::Overlay => Compositor::Overlay {
                base_level: BASE_LIGHT_LEVEL,
            },
        }
    }

    pub fn programs(&self) -> &'static [Program] {
        match self {
            Compositor::ShadowBlend => SHADOW_BLEND_PROGRAMS,
            Compositor::Overlay { .. } => OVERLAY_PROGRAMS,
        }
    }

    /// Whether the frame is copied to the destination after the list runs.
    pub fn copies_source(&self) -> bool {
        matches!(self, Compositor::ShadowBlend)
    }

    pub fn record(&self, rec: &mut Recorder<'_>, camera: &MainCamera) {
        let _span = tracing::info_span!("composite", mode = self.name()).entered();
        rec.push(Command::Publish(Published::Buffer(VisibilityBuffer::Primary)));
        if let Compositor::Overlay { base_level } = *self {
            rec.blit(
                TargetId::Source,
                TargetId::Destination,
                Pass::Overlay(OverlayParams {
                    camera: *camera,
                    base_level,
                }),
            );
            rec.push(Command::Publish(Published::Neutral));
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compositor::ShadowBlend => "shadow_blend",
            Compositor::Overlay { .. } => "overlay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandList;
    use crate::targets::ScratchStack;

    fn record(compositor: Compositor) -> CommandList {
        let mut list = CommandList::new("fog");
        let mut scratch = ScratchStack::new();
        let mut rec = Recorder::new(&mut list, &mut scratch);
        compositor.record(&mut rec, &MainCamera::default());
        list
    }

    #[test]
    fn shadow_blend_publishes_and_copies() {
        let c = Compositor::for_mode(Mode::ShadowBlend);
        assert!(c.copies_source());
        let list = record(c);
        assert_eq!(
            list.commands(),
            &[Command::Publish(Published::Buffer(VisibilityBuffer::Primary))]
        );
        assert!(!c.programs().contains(&Program::Overlay));
    }

    #[test]
    fn overlay_samples_then_resets_the_binding() {
        let c = Compositor::for_mode(Mode::Overlay);
        assert_eq!(c, Compositor::Overlay { base_level: 0.2 });
        assert!(!c.copies_source());
        let list = record(c);
        assert_eq!(list.count_blits("overlay"), 1);
        assert_eq!(list.commands().last(), Some(&Command::Publish(Published::Neutral)));
        assert!(c.programs().contains(&Program::Overlay));
    }
}
