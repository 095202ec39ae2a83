use glam::{Mat4, UVec2, Vec3, Vec4};
use veil_common::{Aabb, Rect};

use crate::projection::MainCamera;
use crate::targets::{ScratchHandle, TargetId, VisibilityBuffer};

/// Per-source data shared by the vision and occluder draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    /// World position.
    pub world: Vec3,
    pub radius: f32,
    /// Position and radius in visibility-buffer texels.
    pub texel: Vec3,
    /// Model matrix of the quad covering the source's disc.
    pub quad: Mat4,
}

/// An occluder as seen by the shadow pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccluderParams {
    pub world_to_local: Mat4,
    pub shape: Aabb,
    pub shadow_reach: f32,
}

/// Parameters of the temporal blend pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalParams {
    pub noise_scale: f32,
    pub noise_magnitude: f32,
    /// `blend_speed * dt`; saturated by the pass.
    pub blend_factor: f32,
}

/// Parameters of the overlay sampling pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayParams {
    pub camera: MainCamera,
    pub base_level: f32,
}

/// Full-target passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pass {
    /// Max-combine a per-source stamp into the visibility buffer.
    Accumulate,
    /// Blend the new frame over the destination's history.
    Temporal(TemporalParams),
    Saturate,
    BlurHorizontal,
    BlurVertical,
    /// Tent-filtered upsample, averaged with what the destination holds.
    Upsample,
    /// Tint the source colour by reprojected visibility.
    Overlay(OverlayParams),
}

impl Pass {
    pub fn name(&self) -> &'static str {
        match self {
            Pass::Accumulate => "accumulate",
            Pass::Temporal(_) => "temporal",
            Pass::Saturate => "saturate",
            Pass::BlurHorizontal => "blur_h",
            Pass::BlurVertical => "blur_v",
            Pass::Upsample => "upsample",
            Pass::Overlay(_) => "overlay",
        }
    }
}

/// What the published visibility binding resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Buffer(VisibilityBuffer),
    /// Fully visible placeholder.
    Neutral,
}

/// One recorded GPU operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Ground rectangle the visibility buffers cover, for passes that need
    /// world-anchored coordinates.
    SetBounds(Rect),
    SetViewProjection { view: Mat4, projection: Mat4 },
    AllocScratch { handle: ScratchHandle, size: UVec2 },
    ReleaseScratch(ScratchHandle),
    Clear { target: TargetId, value: f32 },
    DrawVision { target: TargetId, source: SourceParams },
    DrawOccluder {
        target: TargetId,
        source: SourceParams,
        occluder: OccluderParams,
    },
    Blit { src: TargetId, dst: TargetId, pass: Pass },
    Publish(Published),
}

/// Reusable list of recorded commands, executed once per frame.
#[derive(Debug, Default)]
pub struct CommandList {
    label: &'static str,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            commands: Vec::with_capacity(64),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Forget the previous frame's commands, keeping the storage.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn blit(&mut self, src: TargetId, dst: TargetId, pass: Pass) {
        self.push(Command::Blit { src, dst, pass });
    }

    pub fn count_blits(&self, pass_name: &str) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Blit { pass, .. } if pass.name() == pass_name))
            .count()
    }
}

/// Bounds vector `(min.x, min.z, max.x, max.z)` as the passes consume it.
pub fn bounds_vector(area: Rect) -> Vec4 {
    Vec4::new(area.min.x, area.min.y, area.max.x, area.max.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_capacity() {
        let mut list = CommandList::new("fog");
        for _ in 0..10 {
            list.push(Command::Publish(Published::Neutral));
        }
        let cap = list.commands.capacity();
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.commands.capacity(), cap);
        assert_eq!(list.label(), "fog");
    }

    #[test]
    fn counts_blits_by_pass() {
        let mut list = CommandList::new("fog");
        let a = TargetId::Visibility(VisibilityBuffer::Primary);
        let b = TargetId::Visibility(VisibilityBuffer::History);
        list.blit(a, b, Pass::Saturate);
        list.blit(b, a, Pass::Saturate);
        list.blit(a, b, Pass::Upsample);
        assert_eq!(list.count_blits("saturate"), 2);
        assert_eq!(list.count_blits("upsample"), 1);
        assert_eq!(list.count_blits("overlay"), 0);
    }

    #[test]
    fn bounds_vector_layout() {
        let v = bounds_vector(Rect::from_xywh(1.0, 2.0, 3.0, 4.0));
        assert_eq!(v, Vec4::new(1.0, 2.0, 4.0, 6.0));
    }
}
