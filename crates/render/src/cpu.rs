//! Reference backend that executes command lists on the CPU.
//!
//! It runs the same per-texel math as the GPU programs, one texel at a time,
//! so the whole pipeline can be exercised and inspected without a device.

use std::collections::HashMap;

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use veil_common::Rect;

use crate::backend::{Program, RenderBackend};
use crate::command::{Command, CommandList, OccluderParams, OverlayParams, Pass, Published, SourceParams};
use crate::noise::value_noise;
use crate::shading;
use crate::targets::{ScratchHandle, TargetId, VisibilityBuffer};

/// Single-channel float image.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityImage {
    size: UVec2,
    texels: Vec<f32>,
}

impl VisibilityImage {
    pub fn new(size: UVec2) -> Self {
        let size = size.max(UVec2::ONE);
        Self {
            size,
            texels: vec![0.0; (size.x * size.y) as usize],
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.texels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = self.index(x, y);
        self.texels[i] = value;
    }

    pub fn fill(&mut self, value: f32) {
        self.texels.fill(value);
    }

    pub fn max_value(&self) -> f32 {
        self.texels.iter().copied().fold(0.0, f32::max)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.size.x + x) as usize
    }

    fn fetch(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.size.x as i32 - 1) as u32;
        let y = y.clamp(0, self.size.y as i32 - 1) as u32;
        self.get(x, y)
    }

    /// Bilinear sample at normalized coordinates, clamped to the edge.
    pub fn sample(&self, uv: Vec2) -> f32 {
        let p = uv * self.size.as_vec2() - Vec2::splat(0.5);
        let base = p.floor();
        let f = p - base;
        let (x, y) = (base.x as i32, base.y as i32);
        let top = lerp(self.fetch(x, y), self.fetch(x + 1, y), f.x);
        let bottom = lerp(self.fetch(x, y + 1), self.fetch(x + 1, y + 1), f.x);
        lerp(top, bottom, f.y)
    }

    /// Value for texel `(x, y)` of a `size` target: exact when the sizes match,
    /// filtered otherwise.
    fn resample(&self, size: UVec2, x: u32, y: u32) -> f32 {
        if size == self.size {
            self.get(x, y)
        } else {
            self.sample(texel_uv(size, x, y))
        }
    }
}

/// RGBA float image standing in for the host's colour buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl ColorImage {
    pub fn filled(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width * height) as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [f32; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    /// Bitwise equality, so `-0.0 != 0.0` and NaNs compare by payload.
    pub fn bit_eq(&self, other: &ColorImage) -> bool {
        self.width == other.width
            && self.height == other.height
            && self
                .pixels
                .iter()
                .zip(&other.pixels)
                .all(|(a, b)| a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CpuError {
    #[error("target {0:?} is not allocated")]
    MissingTarget(TargetId),
    #[error("program {0:?} was not created")]
    MissingProgram(Program),
    #[error("pass {pass} cannot run from {src:?} to {dst:?}")]
    InvalidBlit {
        pass: &'static str,
        src: TargetId,
        dst: TargetId,
    },
}

/// CPU implementation of [`RenderBackend`].
#[derive(Debug)]
pub struct CpuBackend {
    primary: Option<VisibilityImage>,
    history: Option<VisibilityImage>,
    live: HashMap<ScratchHandle, VisibilityImage>,
    free: Vec<VisibilityImage>,
    scratch_textures_created: usize,
    programs: Vec<Program>,
    published: Published,
    bounds: Rect,
    view_projection: Mat4,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            primary: None,
            history: None,
            live: HashMap::new(),
            free: Vec::new(),
            scratch_textures_created: 0,
            programs: Vec::new(),
            published: Published::Neutral,
            bounds: Rect::default(),
            view_projection: Mat4::IDENTITY,
        }
    }

    pub fn visibility(&self, buffer: VisibilityBuffer) -> Option<&VisibilityImage> {
        match buffer {
            VisibilityBuffer::Primary => self.primary.as_ref(),
            VisibilityBuffer::History => self.history.as_ref(),
        }
    }

    pub fn visibility_mut(&mut self, buffer: VisibilityBuffer) -> Option<&mut VisibilityImage> {
        match buffer {
            VisibilityBuffer::Primary => self.primary.as_mut(),
            VisibilityBuffer::History => self.history.as_mut(),
        }
    }

    pub fn published(&self) -> Published {
        self.published
    }

    /// Value of the published binding at normalized area coordinates.
    pub fn published_sample(&self, uv: Vec2) -> f32 {
        match self.published {
            Published::Neutral => 1.0,
            Published::Buffer(b) => self.visibility(b).map_or(1.0, |img| img.sample(uv)),
        }
    }

    /// Scratch textures ever created; stays flat once the pool is warm.
    pub fn scratch_textures_created(&self) -> usize {
        self.scratch_textures_created
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    fn target(&self, id: TargetId) -> Option<&VisibilityImage> {
        match id {
            TargetId::Visibility(b) => self.visibility(b),
            TargetId::Scratch(h) => self.live.get(&h),
            TargetId::Source | TargetId::Destination => None,
        }
    }

    fn take(&mut self, id: TargetId) -> Result<VisibilityImage, CpuError> {
        let taken = match id {
            TargetId::Visibility(VisibilityBuffer::Primary) => self.primary.take(),
            TargetId::Visibility(VisibilityBuffer::History) => self.history.take(),
            TargetId::Scratch(h) => self.live.remove(&h),
            TargetId::Source | TargetId::Destination => None,
        };
        taken.ok_or(CpuError::MissingTarget(id))
    }

    fn put(&mut self, id: TargetId, image: VisibilityImage) {
        match id {
            TargetId::Visibility(VisibilityBuffer::Primary) => self.primary = Some(image),
            TargetId::Visibility(VisibilityBuffer::History) => self.history = Some(image),
            TargetId::Scratch(h) => {
                self.live.insert(h, image);
            }
            TargetId::Source | TargetId::Destination => {}
        }
    }

    fn alloc(&mut self, handle: ScratchHandle, size: UVec2) {
        let image = match self.free.iter().position(|img| img.size == size) {
            Some(i) => self.free.swap_remove(i),
            None => {
                self.scratch_textures_created += 1;
                VisibilityImage::new(size)
            }
        };
        self.live.insert(handle, image);
    }

    fn release(&mut self, handle: ScratchHandle) -> Result<(), CpuError> {
        let image = self
            .live
            .remove(&handle)
            .ok_or(CpuError::MissingTarget(TargetId::Scratch(handle)))?;
        self.free.push(image);
        Ok(())
    }

    /// Run `f` over every texel of `target` whose ground point lies under the
    /// source's quad, with that ground point in world XZ.
    fn draw_quad(
        &mut self,
        target: TargetId,
        source: &SourceParams,
        mut f: impl FnMut(Vec2, f32) -> f32,
    ) -> Result<(), CpuError> {
        let inverse = self.view_projection.inverse();
        let mut image = self.take(target)?;
        let size = image.size;
        let centre = Vec2::new(source.world.x, source.world.z);
        for y in 0..size.y {
            for x in 0..size.x {
                let ground = unproject(&inverse, size, x, y);
                let offset = (ground - centre).abs();
                if offset.x > source.radius || offset.y > source.radius {
                    continue;
                }
                let v = image.get(x, y);
                image.set(x, y, f(ground, v));
            }
        }
        self.put(target, image);
        Ok(())
    }

    fn draw_vision(&mut self, target: TargetId, source: &SourceParams) -> Result<(), CpuError> {
        let centre = Vec2::new(source.world.x, source.world.z);
        self.draw_quad(target, source, |ground, dst| {
            dst.max(shading::vision(ground.distance(centre), source.radius))
        })
    }

    fn draw_occluder(
        &mut self,
        target: TargetId,
        source: &SourceParams,
        occluder: &OccluderParams,
    ) -> Result<(), CpuError> {
        self.draw_quad(target, source, |ground, dst| {
            let point = Vec3::new(ground.x, source.world.y, ground.y);
            let s = shading::shadow(
                source.world,
                point,
                &occluder.world_to_local,
                &occluder.shape,
                occluder.shadow_reach,
            );
            dst * (1.0 - s)
        })
    }

    fn blit(&mut self, src: TargetId, dst: TargetId, pass: &Pass) -> Result<(), CpuError> {
        let colour = |id: TargetId| matches!(id, TargetId::Source | TargetId::Destination);
        if src == dst || colour(src) || colour(dst) || matches!(pass, Pass::Overlay(_)) {
            return Err(CpuError::InvalidBlit {
                pass: pass.name(),
                src,
                dst,
            });
        }
        let mut out = self.take(dst)?;
        let Some(input) = self.target(src) else {
            self.put(dst, out);
            return Err(CpuError::MissingTarget(src));
        };
        let size = out.size;
        for y in 0..size.y {
            for x in 0..size.x {
                let uv = texel_uv(size, x, y);
                let current = out.get(x, y);
                let value = match pass {
                    Pass::Accumulate => current.max(input.resample(size, x, y)),
                    Pass::Temporal(p) => {
                        let noise = value_noise(uv.x * p.noise_scale, uv.y * p.noise_scale);
                        let new = shading::perturb(input.resample(size, x, y), noise, p.noise_magnitude);
                        shading::temporal_blend(current, new, p.blend_factor)
                    }
                    Pass::Saturate => shading::saturate(input.resample(size, x, y)),
                    Pass::BlurHorizontal => gaussian(input, uv, Vec2::X),
                    Pass::BlurVertical => gaussian(input, uv, Vec2::Y),
                    Pass::Upsample => shading::upsample_combine(current, tent(input, uv)),
                    Pass::Overlay(_) => current,
                };
                out.set(x, y, value);
            }
        }
        self.put(dst, out);
        Ok(())
    }

    fn overlay(&self, source: &ColorImage, destination: &mut ColorImage, params: &OverlayParams) {
        let origin = params.camera.position();
        let (w, h) = (source.width, source.height);
        let aspect = w as f32 / h.max(1) as f32;
        let bounds = self.bounds;
        *destination = ColorImage::from_fn(w, h, |x, y| {
            let ndc = Vec2::new(
                (x as f32 + 0.5) / w as f32 * 2.0 - 1.0,
                1.0 - (y as f32 + 0.5) / h as f32 * 2.0,
            );
            let dir = params.camera.ray_direction(ndc, aspect);
            let visibility = ground_hit(origin, dir)
                .map(|hit| (hit - bounds.min) / (bounds.max - bounds.min))
                .filter(|uv| uv.cmpge(Vec2::ZERO).all() && uv.cmple(Vec2::ONE).all())
                .map_or(0.0, |uv| self.published_sample(uv));
            let c = source.pixel(x, y);
            [
                shading::overlay(c[0], visibility, params.base_level),
                shading::overlay(c[1], visibility, params.base_level),
                shading::overlay(c[2], visibility, params.base_level),
                c[3],
            ]
        });
    }
}

impl RenderBackend for CpuBackend {
    type ColorBuffer = ColorImage;
    type Error = CpuError;

    fn create_visibility_buffers(&mut self, size: UVec2) -> Result<(), CpuError> {
        self.primary = Some(VisibilityImage::new(size));
        self.history = Some(VisibilityImage::new(size));
        Ok(())
    }

    fn create_programs(&mut self, programs: &[Program]) -> Result<(), CpuError> {
        self.programs = programs.to_vec();
        Ok(())
    }

    fn execute(
        &mut self,
        list: &CommandList,
        source: &ColorImage,
        destination: &mut ColorImage,
    ) -> Result<(), CpuError> {
        for command in list.commands() {
            if let Some(program) = Program::for_command(command) {
                if !self.programs.contains(&program) {
                    return Err(CpuError::MissingProgram(program));
                }
            }
            match command {
                Command::SetBounds(area) => self.bounds = *area,
                Command::SetViewProjection { view, projection } => {
                    self.view_projection = *projection * *view;
                }
                Command::AllocScratch { handle, size } => self.alloc(*handle, *size),
                Command::ReleaseScratch(handle) => self.release(*handle)?,
                Command::Clear { target, value } => {
                    let mut image = self.take(*target)?;
                    image.fill(*value);
                    self.put(*target, image);
                }
                Command::DrawVision { target, source } => self.draw_vision(*target, source)?,
                Command::DrawOccluder {
                    target,
                    source,
                    occluder,
                } => self.draw_occluder(*target, source, occluder)?,
                Command::Blit {
                    src: TargetId::Source,
                    dst: TargetId::Destination,
                    pass: Pass::Overlay(params),
                } => self.overlay(source, destination, params),
                Command::Blit { src, dst, pass } => self.blit(*src, *dst, pass)?,
                Command::Publish(binding) => self.published = *binding,
            }
        }
        Ok(())
    }

    fn copy(&mut self, source: &ColorImage, destination: &mut ColorImage) -> Result<(), CpuError> {
        destination.clone_from(source);
        Ok(())
    }

    fn publish(&mut self, binding: Published) {
        self.published = binding;
    }

    fn destroy_visibility_buffers(&mut self) {
        self.primary = None;
        self.history = None;
        self.live.clear();
        self.free.clear();
        if matches!(self.published, Published::Buffer(_)) {
            self.published = Published::Neutral;
        }
    }

    fn destroy_programs(&mut self) {
        self.programs.clear();
    }

    fn live_scratch_targets(&self) -> usize {
        self.live.len()
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn texel_uv(size: UVec2, x: u32, y: u32) -> Vec2 {
    (Vec2::new(x as f32, y as f32) + Vec2::splat(0.5)) / size.as_vec2()
}

/// World XZ under the centre of texel `(x, y)` of a target drawn with the
/// given inverse view-projection.
fn unproject(inverse: &Mat4, size: UVec2, x: u32, y: u32) -> Vec2 {
    let uv = texel_uv(size, x, y);
    let ndc = Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.5, 1.0);
    let world = *inverse * ndc;
    Vec2::new(world.x, world.z) / world.w
}

fn ground_hit(origin: Vec3, dir: Vec3) -> Option<Vec2> {
    if dir.y.abs() < 1e-6 {
        return None;
    }
    let t = -origin.y / dir.y;
    (t > 0.0).then(|| {
        let hit = origin + dir * t;
        Vec2::new(hit.x, hit.z)
    })
}

fn gaussian(input: &VisibilityImage, uv: Vec2, axis: Vec2) -> f32 {
    let step = axis / input.size.as_vec2();
    let weights = shading::BLUR_WEIGHTS;
    let mut sum = weights[0] * input.sample(uv);
    for (i, w) in weights.iter().enumerate().skip(1) {
        let offset = step * i as f32;
        sum += w * (input.sample(uv + offset) + input.sample(uv - offset));
    }
    sum
}

fn tent(input: &VisibilityImage, uv: Vec2) -> f32 {
    let half = Vec2::splat(0.5) / input.size.as_vec2();
    0.25 * (input.sample(uv + Vec2::new(-half.x, -half.y))
        + input.sample(uv + Vec2::new(half.x, -half.y))
        + input.sample(uv + Vec2::new(-half.x, half.y))
        + input.sample(uv + Vec2::new(half.x, half.y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::TemporalParams;
    use crate::targets::ScratchStack;

    fn backend_with(programs: &[Program], size: UVec2) -> CpuBackend {
        let mut b = CpuBackend::new();
        b.create_visibility_buffers(size).unwrap();
        b.create_programs(programs).unwrap();
        b
    }

    fn run(b: &mut CpuBackend, list: &CommandList) {
        let src = ColorImage::filled(2, 2, [1.0; 4]);
        let mut dst = src.clone();
        b.execute(list, &src, &mut dst).unwrap();
    }

    #[test]
    fn bilinear_sample_interpolates_between_centres() {
        let mut img = VisibilityImage::new(UVec2::new(2, 1));
        img.set(1, 0, 1.0);
        assert_eq!(img.sample(Vec2::new(0.25, 0.5)), 0.0);
        assert_eq!(img.sample(Vec2::new(0.75, 0.5)), 1.0);
        assert!((img.sample(Vec2::new(0.5, 0.5)) - 0.5).abs() < 1e-6);
        // clamped past the edge
        assert_eq!(img.sample(Vec2::new(2.0, 0.5)), 1.0);
    }

    #[test]
    fn pool_reuses_released_textures() {
        let mut b = backend_with(&Program::CORE, UVec2::splat(8));
        let mut stack = ScratchStack::new();
        for _ in 0..3 {
            let h = stack.push(UVec2::splat(4)).unwrap();
            let mut list = CommandList::new("t");
            list.push(Command::AllocScratch {
                handle: h,
                size: UVec2::splat(4),
            });
            list.push(Command::ReleaseScratch(h));
            run(&mut b, &list);
            stack.pop(h).unwrap();
        }
        assert_eq!(b.scratch_textures_created(), 1);
        assert_eq!(b.live_scratch_targets(), 0);
    }

    #[test]
    fn missing_program_is_reported() {
        let mut b = backend_with(&[], UVec2::splat(4));
        let mut list = CommandList::new("t");
        list.blit(
            TargetId::Visibility(VisibilityBuffer::Primary),
            TargetId::Visibility(VisibilityBuffer::History),
            Pass::Saturate,
        );
        let src = ColorImage::filled(1, 1, [0.0; 4]);
        let mut dst = src.clone();
        assert!(matches!(
            b.execute(&list, &src, &mut dst),
            Err(CpuError::MissingProgram(Program::Saturate))
        ));
    }

    #[test]
    fn blit_into_itself_is_rejected() {
        let mut b = backend_with(&Program::CORE, UVec2::splat(4));
        let p = TargetId::Visibility(VisibilityBuffer::Primary);
        let mut list = CommandList::new("t");
        list.blit(p, p, Pass::Saturate);
        let src = ColorImage::filled(1, 1, [0.0; 4]);
        let mut dst = src.clone();
        assert!(matches!(
            b.execute(&list, &src, &mut dst),
            Err(CpuError::InvalidBlit { .. })
        ));
        assert!(b.visibility(VisibilityBuffer::Primary).is_some());
    }

    #[test]
    fn temporal_with_zero_factor_keeps_history() {
        let size = UVec2::splat(16);
        let mut b = backend_with(&Program::CORE, size);
        let history = b.visibility_mut(VisibilityBuffer::History).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                history.set(x, y, (x * 16 + y) as f32 / 256.0);
            }
        }
        let before = b.visibility(VisibilityBuffer::History).unwrap().clone();
        b.visibility_mut(VisibilityBuffer::Primary).unwrap().fill(1.0);

        let mut list = CommandList::new("t");
        list.blit(
            TargetId::Visibility(VisibilityBuffer::Primary),
            TargetId::Visibility(VisibilityBuffer::History),
            Pass::Temporal(TemporalParams {
                noise_scale: 20.0,
                noise_magnitude: 1.0,
                blend_factor: 0.0,
            }),
        );
        run(&mut b, &list);
        assert_eq!(b.visibility(VisibilityBuffer::History).unwrap(), &before);
    }

    #[test]
    fn published_neutral_reads_fully_visible() {
        let b = CpuBackend::new();
        assert_eq!(b.published(), Published::Neutral);
        assert_eq!(b.published_sample(Vec2::splat(0.3)), 1.0);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut b = backend_with(&Program::CORE, UVec2::splat(4));
        b.publish(Published::Buffer(VisibilityBuffer::Primary));
        b.destroy_visibility_buffers();
        b.destroy_visibility_buffers();
        b.destroy_programs();
        b.destroy_programs();
        assert!(b.visibility(VisibilityBuffer::Primary).is_none());
        assert_eq!(b.published(), Published::Neutral);
        assert!(b.programs().is_empty());
    }

    #[test]
    fn ground_hit_requires_a_downward_ray() {
        assert_eq!(
            ground_hit(Vec3::new(1.0, 10.0, 2.0), Vec3::NEG_Y),
            Some(Vec2::new(1.0, 2.0))
        );
        assert_eq!(ground_hit(Vec3::new(0.0, 10.0, 0.0), Vec3::Y), None);
        assert_eq!(ground_hit(Vec3::new(0.0, 10.0, 0.0), Vec3::X), None);
    }
}
