use glam::UVec2;

use crate::error::GpuError;

/// Format of the host colour buffers the compositor reads and writes.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of visibility buffers and scratch targets.
pub const VISIBILITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

/// A device without a surface, for offscreen frames and tests.
pub struct Headless {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::AdapterInfo,
}

/// Acquire the default adapter and a device with default limits.
pub fn headless() -> Result<Headless, GpuError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or(GpuError::NoAdapter)?;

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("veil_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))?;
    let info = adapter.get_info();
    tracing::debug!(adapter = %info.name, backend = ?info.backend, "headless device ready");

    Ok(Headless {
        device,
        queue,
        adapter: info,
    })
}

/// A 2D texture with its default view.
pub struct Target {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: UVec2,
}

impl Target {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        size: UVec2,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let size = size.max(UVec2::ONE);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// Render target that can also be sampled and read back.
    pub fn visibility(device: &wgpu::Device, label: &str, size: UVec2) -> Self {
        Self::new(
            device,
            label,
            size,
            VISIBILITY_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )
    }
}

/// A host colour buffer.
pub struct ColorTarget(pub Target);

impl ColorTarget {
    pub fn new(device: &wgpu::Device, label: &str, size: UVec2) -> Self {
        Self(Target::new(
            device,
            label,
            size,
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        ))
    }

    pub fn size(&self) -> UVec2 {
        self.0.size
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.0.view
    }

    /// Upload tightly packed RGBA8 pixels.
    pub fn write(&self, queue: &wgpu::Queue, rgba: &[u8]) {
        queue.write_texture(
            self.0.texture.as_image_copy(),
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.0.size.x),
                rows_per_image: Some(self.0.size.y),
            },
            extent(self.0.size),
        );
    }

    /// Download the pixels as tightly packed RGBA8.
    pub fn read(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, GpuError> {
        read_texture(device, queue, &self.0, 4)
    }
}

pub(crate) fn extent(size: UVec2) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x,
        height: size.y,
        depth_or_array_layers: 1,
    }
}

/// Copy a texture into a mappable buffer and return its rows without padding.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &Target,
    bytes_per_texel: u32,
) -> Result<Vec<u8>, GpuError> {
    let row = target.size.x * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = row.div_ceil(align) * align;
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_buffer"),
        size: u64::from(padded) * u64::from(target.size.y),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        target.texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(target.size.y),
            },
        },
        extent(target.size),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        if tx.send(res).is_err() {
            tracing::warn!("readback receiver dropped before the map completed");
        }
    });
    let status = device.poll(wgpu::Maintain::Wait);
    tracing::trace!(queue_empty = status.is_queue_empty(), "readback poll");
    rx.recv()
        .map_err(|e| GpuError::Readback(e.to_string()))?
        .map_err(|e| GpuError::Readback(e.to_string()))?;

    let mapped = slice.get_mapped_range();
    let mut out = Vec::with_capacity((row * target.size.y) as usize);
    for chunk in mapped.chunks(padded as usize) {
        out.extend_from_slice(&chunk[..row as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(out)
}
