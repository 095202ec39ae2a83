use std::collections::HashMap;

use glam::UVec2;

use crate::device::Target;

/// Size-keyed free list of visibility-format textures.
///
/// Released textures are kept for the next request of the same size, so once
/// a frame has run, later frames with the same shape create nothing.
#[derive(Default)]
pub struct TexturePool {
    free: HashMap<(u32, u32), Vec<Target>>,
    created: usize,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, device: &wgpu::Device, size: UVec2) -> Target {
        if let Some(target) = self.free.get_mut(&(size.x, size.y)).and_then(Vec::pop) {
            return target;
        }
        self.created += 1;
        tracing::trace!(width = size.x, height = size.y, created = self.created, "scratch texture created");
        Target::visibility(device, "fog_scratch", size)
    }

    pub fn release(&mut self, target: Target) {
        self.free
            .entry((target.size.x, target.size.y))
            .or_default()
            .push(target);
    }

    /// Textures created since the pool was made.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Drop every idle texture.
    pub fn clear(&mut self) {
        self.free.clear();
    }
}
