use glam::Vec3;
use veil_scene::{Scene, VisionSource, cull, influence_volume};

use super::Recorder;
use crate::command::{Command, OccluderParams, Pass, SourceParams};
use crate::config::FogConfig;
use crate::mapping::VisibilityMapping;
use crate::projection::{TopDownCamera, vision_quad};
use crate::targets::{TargetError, TargetId, VisibilityBuffer};

/// Counters from one vision pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisionStats {
    pub sources: usize,
    pub occluders_drawn: usize,
}

pub fn source_params(source: &VisionSource, radius: f32, mapping: &VisibilityMapping) -> SourceParams {
    let texel = mapping.world_to_texel(source.position);
    SourceParams {
        world: source.position,
        radius,
        texel: Vec3::new(texel.x, texel.y, mapping.length_to_texels(radius)),
        quad: vision_quad(source.position, radius),
    }
}

/// Clear the primary buffer and stamp every vision source into it.
///
/// Each source is drawn into its own stamp: the vision disc first, then one
/// shadow draw per culled occluder, then the stamp is max-combined into the
/// primary buffer. Occluders of one source never hide another source's view.
pub fn record_sources(
    rec: &mut Recorder<'_>,
    scene: &Scene,
    config: &FogConfig,
    mapping: &VisibilityMapping,
) -> Result<VisionStats, TargetError> {
    let _span = tracing::info_span!("vision_pass", sources = scene.source_count()).entered();
    let primary = TargetId::Visibility(VisibilityBuffer::Primary);
    let size = mapping.buffer_size();

    rec.push(Command::SetBounds(mapping.area()));
    rec.push(Command::Clear {
        target: primary,
        value: 0.0,
    });

    let mut stats = VisionStats::default();
    for source in scene.sources() {
        let radius = source.radius_or(config.radius);
        let params = source_params(source, radius, mapping);
        let camera = TopDownCamera::new(mapping.area(), source.position.y, config.camera_offset);
        rec.push(Command::SetViewProjection {
            view: camera.view,
            projection: camera.projection,
        });

        let stamp = TargetId::Scratch(rec.alloc(size)?);
        rec.push(Command::Clear {
            target: stamp,
            value: 0.0,
        });
        rec.push(Command::DrawVision {
            target: stamp,
            source: params,
        });

        let volume = influence_volume(source.position, radius, config.camera_offset);
        for occluder in cull(scene.occluders(), volume) {
            rec.push(Command::DrawOccluder {
                target: stamp,
                source: params,
                occluder: OccluderParams {
                    world_to_local: occluder.transform.matrix().inverse(),
                    shape: occluder.shape,
                    shadow_reach: config.shadow_reach,
                },
            });
            stats.occluders_drawn += 1;
        }

        rec.blit(stamp, primary, Pass::Accumulate);
        if let TargetId::Scratch(handle) = stamp {
            rec.release(handle)?;
        }
        stats.sources += 1;
    }

    tracing::trace!(
        sources = stats.sources,
        occluders = stats.occluders_drawn,
        "vision pass recorded"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandList;
    use crate::config::ResolutionTier;
    use crate::targets::ScratchStack;
    use veil_common::{Rect, Transform};
    use veil_scene::Occluder;

    fn config() -> FogConfig {
        FogConfig {
            area: Rect::from_xywh(0.0, 0.0, 20.0, 20.0),
            resolution: ResolutionTier::R256,
            radius: 5.0,
            ..FogConfig::default()
        }
    }

    fn wall(x: f32, z: f32) -> Occluder {
        Occluder::cuboid(Transform::from_position(Vec3::new(x, 1.0, z)))
    }

    #[test]
    fn each_source_gets_its_own_culled_occluders() {
        let mut scene = Scene::new();
        scene.add_source(VisionSource::new(Vec3::new(5.0, 0.0, 5.0)));
        scene.add_source(VisionSource::new(Vec3::new(15.0, 0.0, 15.0)));
        scene.add_occluder(wall(6.0, 6.0)); // near the first
        scene.add_occluder(wall(14.0, 14.0)); // near the second
        scene.add_occluder(wall(10.0, 10.0)); // reachable by both

        let cfg = config();
        let mapping = VisibilityMapping::new(cfg.area, cfg.resolution);
        let mut list = CommandList::new("fog");
        let mut scratch = ScratchStack::new();
        let stats = {
            let mut rec = Recorder::new(&mut list, &mut scratch);
            record_sources(&mut rec, &scene, &cfg, &mapping).unwrap()
        };

        assert_eq!(stats.sources, 2);
        assert_eq!(stats.occluders_drawn, 4);
        assert_eq!(scratch.depth(), 0);
        assert_eq!(scratch.pushed(), 2);
        assert_eq!(list.count_blits("accumulate"), 2);

        let first_shadow = list
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::DrawOccluder { occluder, .. } => Some(occluder.world_to_local),
                _ => None,
            })
            .unwrap();
        let local = first_shadow.transform_point3(Vec3::new(6.0, 1.0, 6.0));
        assert!(local.length() < 1e-5);
    }

    #[test]
    fn vision_draw_precedes_its_shadows() {
        let mut scene = Scene::new();
        scene.add_source(VisionSource::new(Vec3::new(10.0, 0.0, 10.0)));
        scene.add_occluder(wall(11.0, 10.0));
        let cfg = config();
        let mapping = VisibilityMapping::new(cfg.area, cfg.resolution);
        let mut list = CommandList::new("fog");
        let mut scratch = ScratchStack::new();
        let mut rec = Recorder::new(&mut list, &mut scratch);
        record_sources(&mut rec, &scene, &cfg, &mapping).unwrap();

        let kinds: Vec<&'static str> = list
            .commands()
            .iter()
            .map(|c| match c {
                Command::SetBounds(_) => "bounds",
                Command::SetViewProjection { .. } => "vp",
                Command::AllocScratch { .. } => "alloc",
                Command::ReleaseScratch(_) => "release",
                Command::Clear { .. } => "clear",
                Command::DrawVision { .. } => "vision",
                Command::DrawOccluder { .. } => "occluder",
                Command::Blit { .. } => "blit",
                Command::Publish(_) => "publish",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["bounds", "clear", "vp", "alloc", "clear", "vision", "occluder", "blit", "release"]
        );
    }

    #[test]
    fn texel_params_follow_the_mapping() {
        let cfg = config();
        let mapping = VisibilityMapping::new(cfg.area, cfg.resolution);
        let p = source_params(&VisionSource::new(Vec3::new(10.0, 0.0, 10.0)), 5.0, &mapping);
        assert!((p.texel - Vec3::new(128.0, 128.0, 64.0)).length() < 1e-3);
        assert_eq!(p.world, Vec3::new(10.0, 0.0, 10.0));
    }
}
