use tracing::debug;
use veil_scene::Scene;

use crate::backend::RenderBackend;
use crate::command::{CommandList, Published};
use crate::composite::Compositor;
use crate::config::FogConfig;
use crate::error::FogError;
use crate::mapping::VisibilityMapping;
use crate::pipeline::{Recorder, blur, rasterize, temporal};
use crate::projection::MainCamera;
use crate::targets::ScratchStack;

/// Per-frame inputs from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    /// Seconds since the previous frame.
    pub delta_time: f32,
    pub camera: MainCamera,
}

/// What a frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// The frame was copied through without running any pass.
    pub passthrough: bool,
    pub sources: usize,
    pub occluders_drawn: usize,
    pub blur_levels: usize,
    pub commands: usize,
    pub scratch_allocated: usize,
}

#[derive(Debug)]
struct Active {
    compositor: Compositor,
    mapping: VisibilityMapping,
    list: CommandList,
    scratch: ScratchStack,
}

/// The fog-of-war compositor.
///
/// Holds configuration while inactive. Activation validates it and acquires
/// the backend resources; every frame then records the full pipeline into one
/// command list and has the backend run it.
#[derive(Debug, Default)]
pub struct FogOfWar {
    config: FogConfig,
    active: Option<Active>,
}

impl FogOfWar {
    pub fn new(config: FogConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn config(&self) -> &FogConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn mapping(&self) -> Option<&VisibilityMapping> {
        self.active.as_ref().map(|a| &a.mapping)
    }

    pub fn compositor(&self) -> Option<Compositor> {
        self.active.as_ref().map(|a| a.compositor)
    }

    /// Validate the configuration and acquire buffers and programs. Does
    /// nothing when already active.
    pub fn activate<B: RenderBackend>(&mut self, backend: &mut B) -> Result<(), FogError> {
        if self.active.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let mapping = VisibilityMapping::new(self.config.area, self.config.resolution);
        let compositor = Compositor::for_mode(self.config.mode);
        let size = mapping.buffer_size();

        backend
            .create_visibility_buffers(size)
            .map_err(FogError::backend)?;
        if let Err(err) = backend.create_programs(compositor.programs()) {
            backend.destroy_visibility_buffers();
            return Err(FogError::backend(err));
        }

        debug!(
            mode = compositor.name(),
            width = size.x,
            height = size.y,
            "fog of war activated"
        );
        self.active = Some(Active {
            compositor,
            mapping,
            list: CommandList::new("fog_of_war"),
            scratch: ScratchStack::new(),
        });
        Ok(())
    }

    /// Release everything and publish the neutral placeholder. Safe to call any
    /// number of times.
    pub fn deactivate<B: RenderBackend>(&mut self, backend: &mut B) {
        let was_active = self.active.take().is_some();
        backend.destroy_visibility_buffers();
        backend.publish(Published::Neutral);
        backend.destroy_programs();
        if was_active {
            debug!("fog of war deactivated");
        }
    }

    /// Replace the configuration, re-acquiring resources when active.
    pub fn reconfigure<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        config: FogConfig,
    ) -> Result<(), FogError> {
        config.validate()?;
        self.config = config;
        if self.active.is_some() {
            self.deactivate(backend);
            self.activate(backend)?;
        }
        Ok(())
    }

    /// Run one frame: rasterize every source, blend with history, blur and
    /// composite into `destination`.
    ///
    /// With no sources or no occluders the frame is a plain copy and no
    /// visibility resource is touched.
    pub fn render<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        source: &B::ColorBuffer,
        destination: &mut B::ColorBuffer,
        frame: &FrameContext,
    ) -> Result<FrameStats, FogError> {
        let Some(active) = self.active.as_mut() else {
            return Err(FogError::NotActive);
        };
        let _span = tracing::info_span!(
            "fog_render",
            sources = scene.source_count(),
            occluders = scene.occluder_count()
        )
        .entered();

        if scene.is_passthrough() {
            backend.copy(source, destination).map_err(FogError::backend)?;
            return Ok(FrameStats {
                passthrough: true,
                ..FrameStats::default()
            });
        }

        active.list.clear();
        let pushed_before = active.scratch.pushed();
        let recorded = record_frame(active, &self.config, scene, frame);
        let mut stats = match recorded {
            Ok(stats) => stats,
            Err(err) => {
                active.scratch.reset();
                active.list.clear();
                return Err(err);
            }
        };
        stats.commands = active.list.len();
        stats.scratch_allocated = (active.scratch.pushed() - pushed_before) as usize;

        backend
            .execute(&active.list, source, destination)
            .map_err(FogError::backend)?;
        if active.compositor.copies_source() {
            backend.copy(source, destination).map_err(FogError::backend)?;
        }

        tracing::trace!(
            commands = stats.commands,
            scratch = stats.scratch_allocated,
            live = backend.live_scratch_targets(),
            "frame executed"
        );
        Ok(stats)
    }
}

fn record_frame(
    active: &mut Active,
    config: &FogConfig,
    scene: &Scene,
    frame: &FrameContext,
) -> Result<FrameStats, FogError> {
    let mut rec = Recorder::new(&mut active.list, &mut active.scratch);
    let vision = rasterize::record_sources(&mut rec, scene, config, &active.mapping)?;
    temporal::record_temporal(&mut rec, config, frame.delta_time);
    let blur = blur::record_blur(&mut rec, active.mapping.resolution(), config.blur_iterations)?;
    active.compositor.record(&mut rec, &frame.camera);
    debug_assert_eq!(rec.scratch_depth(), 0);

    Ok(FrameStats {
        passthrough: false,
        sources: vision.sources,
        occluders_drawn: vision.occluders_drawn,
        blur_levels: blur.levels,
        ..FrameStats::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::cpu::{ColorImage, CpuBackend};
    use glam::Vec3;
    use veil_common::Rect;
    use veil_scene::VisionSource;

    #[test]
    fn render_before_activate_fails() {
        let mut fog = FogOfWar::default();
        let mut backend = CpuBackend::new();
        let src = ColorImage::filled(4, 4, [1.0; 4]);
        let mut dst = ColorImage::filled(4, 4, [0.0; 4]);
        let err = fog
            .render(&mut backend, &Scene::new(), &src, &mut dst, &FrameContext::default())
            .unwrap_err();
        assert!(matches!(err, FogError::NotActive));
    }

    #[test]
    fn activate_rejects_invalid_config() {
        let mut fog = FogOfWar::new(FogConfig {
            area: Rect::from_xywh(0.0, 0.0, 0.0, 10.0),
            ..FogConfig::default()
        });
        let mut backend = CpuBackend::new();
        let err = fog.activate(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            FogError::Config(ConfigError::DegenerateArea { .. })
        ));
        assert!(!fog.is_active());
        assert!(backend.visibility(crate::VisibilityBuffer::Primary).is_none());
    }

    #[test]
    fn reconfigure_resizes_buffers() {
        let mut fog = FogOfWar::new(FogConfig {
            resolution: crate::ResolutionTier::R256,
            ..FogConfig::default()
        });
        let mut backend = CpuBackend::new();
        fog.activate(&mut backend).unwrap();
        fog.reconfigure(
            &mut backend,
            FogConfig {
                resolution: crate::ResolutionTier::R128,
                ..FogConfig::default()
            },
        )
        .unwrap();
        assert!(fog.is_active());
        let primary = backend.visibility(crate::VisibilityBuffer::Primary).unwrap();
        assert_eq!(primary.size(), glam::UVec2::splat(128));
    }

    #[test]
    fn frame_stats_count_work() {
        let mut fog = FogOfWar::new(FogConfig {
            resolution: crate::ResolutionTier::R128,
            blur_iterations: 3,
            ..FogConfig::default()
        });
        let mut backend = CpuBackend::new();
        fog.activate(&mut backend).unwrap();
        let mut scene = Scene::new();
        scene.add_source(VisionSource::new(Vec3::new(32.0, 0.0, 32.0)));
        scene.add_occluder(veil_scene::Occluder::cuboid(veil_common::Transform::from_position(
            Vec3::new(34.0, 0.5, 32.0),
        )));
        let src = ColorImage::filled(8, 8, [0.5; 4]);
        let mut dst = ColorImage::filled(8, 8, [0.0; 4]);
        let stats = fog
            .render(&mut backend, &scene, &src, &mut dst, &FrameContext::default())
            .unwrap();
        assert!(!stats.passthrough);
        assert_eq!(stats.sources, 1);
        assert_eq!(stats.occluders_drawn, 1);
        // 128 / 2 = 64 is the only level above the floor
        assert_eq!(stats.blur_levels, 1);
        assert_eq!(stats.scratch_allocated, 3);
        assert_eq!(backend.live_scratch_targets(), 0);
        assert!(dst.bit_eq(&src));
    }
}
