use glam::{UVec2, Vec2, Vec3};
use veil_common::Rect;

use crate::config::ResolutionTier;

/// Fixed mapping between the visibility area on the ground plane and
/// visibility buffer texels.
///
/// The scale is uniform: the longer side of the area spans the full tier
/// resolution and the shorter side is truncated proportionally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityMapping {
    area: Rect,
    resolution: u32,
    texel_per_unit: f32,
}

impl VisibilityMapping {
    pub fn new(area: Rect, tier: ResolutionTier) -> Self {
        let resolution = tier.texels();
        Self {
            area,
            resolution,
            texel_per_unit: resolution as f32 / area.dominant_side(),
        }
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn texel_per_unit(&self) -> f32 {
        self.texel_per_unit
    }

    /// Size of each visibility buffer.
    pub fn buffer_size(&self) -> UVec2 {
        let (w, h) = (self.area.width(), self.area.height());
        let res = self.resolution;
        if w > h {
            UVec2::new(res, ((h * res as f32 / w) as u32).max(1))
        } else {
            UVec2::new(((w * res as f32 / h) as u32).max(1), res)
        }
    }

    /// Texel-space coordinates of a world point (X→x, Z→y).
    pub fn world_to_texel(&self, p: Vec3) -> Vec2 {
        Vec2::new(p.x - self.area.min.x, p.z - self.area.min.y) * self.texel_per_unit
    }

    /// Ground-plane point (X, Z) at the given texel-space coordinates.
    pub fn texel_to_ground(&self, t: Vec2) -> Vec2 {
        self.area.min + t / self.texel_per_unit
    }

    pub fn length_to_texels(&self, world: f32) -> f32 {
        world * self.texel_per_unit
    }
}
