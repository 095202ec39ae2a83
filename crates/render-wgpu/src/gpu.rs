use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec3};
use veil_common::Rect;
use veil_render::shading::{SHADOW_SOFTNESS, VISION_FALLOFF};
use veil_render::{
    Command, CommandList, OccluderParams, Pass, Program, Published, RenderBackend, ScratchHandle,
    SourceParams, TargetId, VisibilityBuffer, bounds_vector,
};
use half::f16;
use wgpu::util::DeviceExt;

use crate::device::{COLOR_FORMAT, ColorTarget, Target, VISIBILITY_FORMAT, extent, read_texture};
use crate::error::GpuError;
use crate::pool::TexturePool;
use crate::shaders;

/// Dynamic uniform offsets must be multiples of this.
const UNIFORM_STRIDE: usize = 256;
const INITIAL_UNIFORM_SLOTS: usize = 64;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct DrawUniforms {
    view_proj: [[f32; 4]; 4],
    quad: [[f32; 4]; 4],
    world_to_local: [[f32; 4]; 4],
    source: [f32; 4],
    shape_min: [f32; 4],
    shape_max: [f32; 4],
    shadow: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct BlitUniforms {
    camera_to_world: [[f32; 4]; 4],
    bounds: [f32; 4],
    params: [f32; 4],
    texel: [f32; 4],
}

fn draw_uniforms(
    view_proj: Mat4,
    source: &SourceParams,
    occluder: Option<&OccluderParams>,
) -> DrawUniforms {
    let (world_to_local, min, max, reach) = match occluder {
        Some(o) => (o.world_to_local, o.shape.min, o.shape.max, o.shadow_reach),
        None => (Mat4::IDENTITY, Vec3::ZERO, Vec3::ZERO, 0.0),
    };
    DrawUniforms {
        view_proj: view_proj.to_cols_array_2d(),
        quad: source.quad.to_cols_array_2d(),
        world_to_local: world_to_local.to_cols_array_2d(),
        source: source.world.extend(source.radius).to_array(),
        shape_min: min.extend(0.0).to_array(),
        shape_max: max.extend(0.0).to_array(),
        shadow: [reach, SHADOW_SOFTNESS, VISION_FALLOFF, 0.0],
    }
}

fn blit_uniforms(pass: &Pass, bounds: Rect, src: UVec2, dst: UVec2) -> BlitUniforms {
    let src = src.max(UVec2::ONE).as_vec2();
    let dst = dst.max(UVec2::ONE).as_vec2();
    let mut uniforms = BlitUniforms {
        camera_to_world: Mat4::IDENTITY.to_cols_array_2d(),
        bounds: bounds_vector(bounds).to_array(),
        params: [0.0; 4],
        texel: [1.0 / src.x, 1.0 / src.y, dst.x / dst.y, 0.0],
    };
    match pass {
        Pass::Temporal(p) => uniforms.params = [p.noise_scale, p.noise_magnitude, 0.0, 0.0],
        Pass::Overlay(o) => {
            uniforms.camera_to_world = o.camera.camera_to_world.to_cols_array_2d();
            uniforms.params = [0.0, 0.0, o.camera.focal_distance(), o.base_level];
        }
        _ => {}
    }
    uniforms
}

/// Weight of the incoming value for passes that mix into the destination.
fn blend_constant(pass: &Pass) -> Option<f64> {
    match pass {
        Pass::Temporal(p) => Some(f64::from(p.blend_factor.clamp(0.0, 1.0))),
        Pass::Upsample => Some(0.5),
        _ => None,
    }
}

/// Only the overlay reads the published buffer; every other pass may be
/// writing to it.
fn samples_published(pass: &Pass) -> bool {
    matches!(pass, Pass::Overlay(_))
}

const MAX_BLEND: wgpu::BlendState = {
    let max = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Max,
    };
    wgpu::BlendState {
        color: max,
        alpha: max,
    }
};

/// `dst * (1 - src)`: the fragment is how much visibility to take away.
const SHADOW_BLEND: wgpu::BlendState = {
    let shade = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::OneMinusSrc,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: shade,
        alpha: shade,
    }
};

/// `lerp(dst, src, k)` with `k` set as the blend constant.
const MIX_BLEND: wgpu::BlendState = {
    let mix = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Constant,
        dst_factor: wgpu::BlendFactor::OneMinusConstant,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: mix,
        alpha: mix,
    }
};

enum Stage {
    Draw,
    Blit,
}

struct ProgramSpec {
    stage: Stage,
    fragment: &'static str,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
}

fn program_spec(program: Program) -> ProgramSpec {
    let (stage, fragment, blend) = match program {
        Program::Vision => (Stage::Draw, "fs_vision", MAX_BLEND),
        Program::Occluder => (Stage::Draw, "fs_occluder", SHADOW_BLEND),
        Program::Accumulate => (Stage::Blit, "fs_accumulate", MAX_BLEND),
        Program::Temporal => (Stage::Blit, "fs_temporal", MIX_BLEND),
        Program::Saturate => (Stage::Blit, "fs_saturate", wgpu::BlendState::REPLACE),
        Program::BlurHorizontal => (Stage::Blit, "fs_blur_h", wgpu::BlendState::REPLACE),
        Program::BlurVertical => (Stage::Blit, "fs_blur_v", wgpu::BlendState::REPLACE),
        Program::Upsample => (Stage::Blit, "fs_upsample", MIX_BLEND),
        Program::Overlay => (Stage::Blit, "fs_overlay", wgpu::BlendState::REPLACE),
    };
    let format = if program == Program::Overlay {
        COLOR_FORMAT
    } else {
        VISIBILITY_FORMAT
    };
    ProgramSpec {
        stage,
        fragment,
        format,
        blend,
    }
}

/// wgpu implementation of [`RenderBackend`].
///
/// Owns the device, both visibility buffers, the neutral placeholder, every
/// pass pipeline and the scratch texture pool.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    draw_layout: wgpu::BindGroupLayout,
    blit_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<Program, wgpu::RenderPipeline>,
    uniforms: wgpu::Buffer,
    uniform_capacity: usize,
    staging: Vec<u8>,
    scratch_sizes: HashMap<ScratchHandle, UVec2>,
    primary: Option<Target>,
    history: Option<Target>,
    neutral: Target,
    pool: TexturePool,
    live: HashMap<ScratchHandle, Target>,
    published: Published,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fog_draw_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fog_blit_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<BlitUniforms>() as u64),
                    },
                    count: None,
                },
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_entry(3),
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fog_linear_clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_capacity = INITIAL_UNIFORM_SLOTS * UNIFORM_STRIDE;
        let uniforms = create_uniform_buffer(&device, uniform_capacity);

        let neutral_texture = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("fog_neutral"),
                size: extent(UVec2::ONE),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: VISIBILITY_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            bytemuck::bytes_of(&f16::ONE),
        );
        let neutral = Target {
            view: neutral_texture.create_view(&Default::default()),
            texture: neutral_texture,
            size: UVec2::ONE,
        };

        Self {
            device,
            queue,
            draw_layout,
            blit_layout,
            sampler,
            pipelines: HashMap::new(),
            uniforms,
            uniform_capacity,
            staging: Vec::with_capacity(uniform_capacity),
            scratch_sizes: HashMap::new(),
            primary: None,
            history: None,
            neutral,
            pool: TexturePool::new(),
            live: HashMap::new(),
            published: Published::Neutral,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn published(&self) -> Published {
        self.published
    }

    /// The texture currently behind the visibility binding.
    pub fn visibility_view(&self) -> &wgpu::TextureView {
        match self.published {
            Published::Buffer(b) => self.buffer(b).map_or(&self.neutral.view, |t| &t.view),
            Published::Neutral => &self.neutral.view,
        }
    }

    pub fn scratch_textures_created(&self) -> usize {
        self.pool.created()
    }

    pub fn has_program(&self, program: Program) -> bool {
        self.pipelines.contains_key(&program)
    }

    /// Download a visibility buffer as row-major floats.
    pub fn read_visibility(&self, buffer: VisibilityBuffer) -> Result<(UVec2, Vec<f32>), GpuError> {
        let target = self
            .buffer(buffer)
            .ok_or(GpuError::MissingTarget(TargetId::Visibility(buffer)))?;
        let bytes = read_texture(&self.device, &self.queue, target, 2)?;
        let texels = bytes
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect();
        Ok((target.size, texels))
    }

    fn buffer(&self, buffer: VisibilityBuffer) -> Option<&Target> {
        match buffer {
            VisibilityBuffer::Primary => self.primary.as_ref(),
            VisibilityBuffer::History => self.history.as_ref(),
        }
    }

    fn resolve<'a>(
        &'a self,
        id: TargetId,
        source: &'a ColorTarget,
        destination: &'a ColorTarget,
    ) -> Result<&'a Target, GpuError> {
        let target = match id {
            TargetId::Visibility(b) => self.buffer(b),
            TargetId::Scratch(h) => self.live.get(&h),
            TargetId::Source => Some(&source.0),
            TargetId::Destination => Some(&destination.0),
        };
        target.ok_or(GpuError::MissingTarget(id))
    }

    fn size_of(
        &self,
        id: TargetId,
        source: &ColorTarget,
        destination: &ColorTarget,
    ) -> Result<UVec2, GpuError> {
        match id {
            TargetId::Scratch(h) => self
                .scratch_sizes
                .get(&h)
                .copied()
                .ok_or(GpuError::MissingTarget(id)),
            _ => self.resolve(id, source, destination).map(|t| t.size),
        }
    }

    fn pipeline(&self, program: Program) -> Result<&wgpu::RenderPipeline, GpuError> {
        self.pipelines
            .get(&program)
            .ok_or(GpuError::MissingProgram(program))
    }

    fn push_uniform<T: Pod>(&mut self, value: &T) -> u32 {
        let offset = self.staging.len().div_ceil(UNIFORM_STRIDE) * UNIFORM_STRIDE;
        self.staging.resize(offset, 0);
        self.staging.extend_from_slice(bytemuck::bytes_of(value));
        offset as u32
    }

    /// First walk over the list: bake every draw's and blit's uniforms.
    fn stage_uniforms(
        &mut self,
        list: &CommandList,
        source: &ColorTarget,
        destination: &ColorTarget,
    ) -> Result<Vec<Option<u32>>, GpuError> {
        self.staging.clear();
        self.scratch_sizes.clear();
        let mut offsets = Vec::with_capacity(list.len());
        let mut view_proj = Mat4::IDENTITY;
        let mut bounds = Rect::default();

        for command in list.commands() {
            let offset = match command {
                Command::SetBounds(area) => {
                    bounds = *area;
                    None
                }
                Command::SetViewProjection { view, projection } => {
                    view_proj = *projection * *view;
                    None
                }
                Command::AllocScratch { handle, size } => {
                    self.scratch_sizes.insert(*handle, *size);
                    None
                }
                Command::DrawVision { source: s, .. } => {
                    Some(self.push_uniform(&draw_uniforms(view_proj, s, None)))
                }
                Command::DrawOccluder {
                    source: s,
                    occluder,
                    ..
                } => Some(self.push_uniform(&draw_uniforms(view_proj, s, Some(occluder)))),
                Command::Blit { src, dst, pass } => {
                    validate_blit(*src, *dst, pass)?;
                    let src_size = self.size_of(*src, source, destination)?;
                    let dst_size = self.size_of(*dst, source, destination)?;
                    Some(self.push_uniform(&blit_uniforms(pass, bounds, src_size, dst_size)))
                }
                Command::ReleaseScratch(_) | Command::Clear { .. } | Command::Publish(_) => None,
            };
            offsets.push(offset);
        }

        if self.staging.len() > self.uniform_capacity {
            self.uniform_capacity = self.staging.len().next_power_of_two();
            self.uniforms = create_uniform_buffer(&self.device, self.uniform_capacity);
            tracing::debug!(bytes = self.uniform_capacity, "uniform buffer grown");
        }
        if !self.staging.is_empty() {
            self.queue.write_buffer(&self.uniforms, 0, &self.staging);
        }
        Ok(offsets)
    }

    fn blit_bind_group(&self, input: &wgpu::TextureView, aux: &wgpu::TextureView) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fog_blit_bind_group"),
            layout: &self.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniforms,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<BlitUniforms>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(aux),
                },
            ],
        })
    }

    fn build_pipelines(&mut self, programs: &[Program]) {
        let draw_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fog_draw_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::DRAW_SHADER.into()),
        });
        let blit_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fog_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::blit_source().into()),
        });
        let draw_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fog_draw_pipeline_layout"),
            bind_group_layouts: &[&self.draw_layout],
            push_constant_ranges: &[],
        });
        let blit_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fog_blit_pipeline_layout"),
            bind_group_layouts: &[&self.blit_layout],
            push_constant_ranges: &[],
        });

        for &program in programs {
            let spec = program_spec(program);
            let (module, layout, vertex_entry) = match spec.stage {
                Stage::Draw => (&draw_module, &draw_layout, "vs_quad"),
                Stage::Blit => (&blit_module, &blit_layout, "vs_fullscreen"),
            };
            let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(spec.fragment),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(spec.fragment),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: spec.format,
                        blend: Some(spec.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            });
            self.pipelines.insert(program, pipeline);
        }
    }
}

fn create_uniform_buffer(device: &wgpu::Device, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("fog_uniforms"),
        size: size as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn validate_blit(src: TargetId, dst: TargetId, pass: &Pass) -> Result<(), GpuError> {
    let colour = |id: TargetId| matches!(id, TargetId::Source | TargetId::Destination);
    let valid = match pass {
        Pass::Overlay(_) => src == TargetId::Source && dst == TargetId::Destination,
        _ => src != dst && !colour(src) && !colour(dst),
    };
    if valid {
        Ok(())
    } else {
        Err(GpuError::InvalidBlit {
            pass: pass.name(),
            src,
            dst,
        })
    }
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        ..Default::default()
    })
}

impl RenderBackend for WgpuBackend {
    type ColorBuffer = ColorTarget;
    type Error = GpuError;

    fn create_visibility_buffers(&mut self, size: UVec2) -> Result<(), GpuError> {
        let primary = Target::visibility(&self.device, "fog_visibility_primary", size);
        let history = Target::visibility(&self.device, "fog_visibility_history", size);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fog_buffer_init"),
            });
        for target in [&primary, &history] {
            begin_pass(
                &mut encoder,
                "fog_buffer_clear",
                &target.view,
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.primary = Some(primary);
        self.history = Some(history);
        Ok(())
    }

    fn create_programs(&mut self, programs: &[Program]) -> Result<(), GpuError> {
        self.build_pipelines(programs);
        tracing::debug!(count = self.pipelines.len(), "fog pipelines built");
        Ok(())
    }

    fn execute(
        &mut self,
        list: &CommandList,
        source: &ColorTarget,
        destination: &mut ColorTarget,
    ) -> Result<(), GpuError> {
        let offsets = self.stage_uniforms(list, source, destination)?;
        let draw_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fog_draw_bind_group"),
            layout: &self.draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.uniforms,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(list.label()),
            });

        for (command, offset) in list.commands().iter().zip(offsets) {
            match command {
                Command::AllocScratch { handle, size } => {
                    let target = self.pool.acquire(&self.device, *size);
                    self.live.insert(*handle, target);
                }
                Command::ReleaseScratch(handle) => {
                    let target = self
                        .live
                        .remove(handle)
                        .ok_or(GpuError::MissingTarget(TargetId::Scratch(*handle)))?;
                    self.pool.release(target);
                }
                Command::Clear { target, value } => {
                    let view = &self.resolve(*target, source, destination)?.view;
                    let clear = wgpu::Color {
                        r: f64::from(*value),
                        g: 0.0,
                        b: 0.0,
                        a: 1.0,
                    };
                    begin_pass(&mut encoder, "fog_clear", view, wgpu::LoadOp::Clear(clear));
                }
                Command::DrawVision { target, .. } | Command::DrawOccluder { target, .. } => {
                    let program = if matches!(command, Command::DrawVision { .. }) {
                        Program::Vision
                    } else {
                        Program::Occluder
                    };
                    let pipeline = self.pipeline(program)?;
                    let view = &self.resolve(*target, source, destination)?.view;
                    let mut pass = begin_pass(&mut encoder, "fog_draw", view, wgpu::LoadOp::Load);
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &draw_group, &[offset.unwrap_or(0)]);
                    pass.draw(0..6, 0..1);
                }
                Command::Blit { src, dst, pass: kind } => {
                    let pipeline = self.pipeline(Program::for_pass(kind))?;
                    let input = &self.resolve(*src, source, destination)?.view;
                    let output = &self.resolve(*dst, source, destination)?.view;
                    let aux = if samples_published(kind) {
                        self.visibility_view()
                    } else {
                        &self.neutral.view
                    };
                    let group = self.blit_bind_group(input, aux);
                    let mut pass = begin_pass(&mut encoder, kind.name(), output, wgpu::LoadOp::Load);
                    pass.set_pipeline(pipeline);
                    if let Some(k) = blend_constant(kind) {
                        pass.set_blend_constant(wgpu::Color {
                            r: k,
                            g: k,
                            b: k,
                            a: k,
                        });
                    }
                    pass.set_bind_group(0, &group, &[offset.unwrap_or(0)]);
                    pass.draw(0..3, 0..1);
                }
                Command::Publish(binding) => self.published = *binding,
                Command::SetBounds(_) | Command::SetViewProjection { .. } => {}
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn copy(&mut self, source: &ColorTarget, destination: &mut ColorTarget) -> Result<(), GpuError> {
        if source.size() != destination.size() {
            return Err(GpuError::SizeMismatch {
                from: source.size(),
                to: destination.size(),
            });
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fog_copy"),
            });
        encoder.copy_texture_to_texture(
            source.0.texture.as_image_copy(),
            destination.0.texture.as_image_copy(),
            extent(source.size()),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn publish(&mut self, binding: Published) {
        self.published = binding;
    }

    fn destroy_visibility_buffers(&mut self) {
        self.primary = None;
        self.history = None;
        self.live.clear();
        self.pool.clear();
        if matches!(self.published, Published::Buffer(_)) {
            self.published = Published::Neutral;
        }
    }

    fn destroy_programs(&mut self) {
        self.pipelines.clear();
    }

    fn live_scratch_targets(&self) -> usize {
        self.live.len()
    }
}
