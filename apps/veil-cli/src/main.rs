use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Mat4, UVec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use veil_common::{Rect, Transform};
use veil_render::cpu::{ColorImage, CpuBackend};
use veil_render::pipeline::blur::plan_levels;
use veil_render::{
    FogConfig, FogOfWar, FrameContext, FrameStats, MainCamera, Program, RenderBackend,
    ResolutionTier, VisibilityBuffer,
};
use veil_render_wgpu::{ColorTarget, GpuError, OutlineRenderer, WgpuBackend, headless};
use veil_scene::{Occluder, Scene, VisionSource};

#[derive(Parser)]
#[command(name = "veil-cli", about = "CLI tool for the veil fog-of-war compositor")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scenario file (YAML): config, scene, frame count and timestep
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, resolution tiers and pass programs
    Info,
    /// Run a scenario on the CPU backend and print the visibility field
    Simulate {
        /// Override the scenario's frame count
        #[arg(short, long)]
        frames: Option<u32>,
        /// Columns of the ASCII map
        #[arg(long, default_value = "48")]
        width: u32,
        /// Print frame stats as JSON instead of the map
        #[arg(long)]
        json: bool,
    },
    /// Print the blur pyramid levels for a resolution
    Pyramid {
        #[arg(short, long, default_value = "2048")]
        resolution: u32,
        #[arg(short, long, default_value = "2")]
        iterations: u32,
    },
    /// Run a scenario on a headless wgpu device
    Gpu {
        #[arg(short, long)]
        frames: Option<u32>,
        #[arg(long, default_value = "48")]
        width: u32,
        /// Draw the visibility area's outline over the composited frame
        #[arg(long)]
        outline: bool,
    },
}

/// Everything one simulated run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Scenario {
    config: FogConfig,
    scene: Scene,
    frames: u32,
    delta_time: f32,
    camera_eye: Vec3,
}

impl Default for Scenario {
    fn default() -> Self {
        let mut scene = Scene::new();
        scene.add_source(VisionSource::new(Vec3::new(8.0, 0.5, 10.0)));
        scene.add_source(VisionSource::with_radius(Vec3::new(15.0, 0.5, 5.0), 3.0));
        scene.add_occluder(Occluder::cuboid(Transform {
            position: Vec3::new(11.0, 1.0, 10.0),
            scale: Vec3::new(0.5, 2.0, 3.0),
            ..Transform::default()
        }));
        Self {
            config: FogConfig {
                area: Rect::from_xywh(0.0, 0.0, 20.0, 20.0),
                resolution: ResolutionTier::R256,
                radius: 5.0,
                ..FogConfig::default()
            },
            scene,
            frames: 30,
            delta_time: 1.0 / 60.0,
            camera_eye: Vec3::new(10.0, 30.0, 10.0),
        }
    }
}

impl Scenario {
    fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    /// View-projection of the main camera for a square target.
    fn camera_view_projection(&self) -> Mat4 {
        let camera = self.frame().camera;
        Mat4::perspective_rh(camera.fov_y_degrees.to_radians(), 1.0, 0.1, 1000.0)
            * camera.camera_to_world.inverse()
    }

    fn frame(&self) -> FrameContext {
        let area = self.config.area.center();
        FrameContext {
            delta_time: self.delta_time,
            camera: MainCamera::look_at(self.camera_eye, Vec3::new(area.x, 0.0, area.y), 60.0),
        }
    }
}

const RAMP: &[u8] = b" .:-=+*#%@";

/// Render a visibility field as text, `columns` wide, keeping the aspect.
fn ascii_map(size: UVec2, columns: u32, sample: impl Fn(u32, u32) -> f32) -> String {
    let columns = columns.clamp(1, size.x.max(1));
    // terminal cells are roughly twice as tall as wide
    let rows = ((columns as f32 * size.y as f32 / size.x as f32) * 0.5).ceil().max(1.0) as u32;
    let mut out = String::with_capacity(((columns + 1) * rows) as usize);
    for row in 0..rows {
        let y = (row * size.y + size.y / 2) / rows;
        for col in 0..columns {
            let x = (col * size.x + size.x / 2) / columns;
            let v = sample(x.min(size.x - 1), y.min(size.y - 1)).clamp(0.0, 1.0);
            let idx = ((v * (RAMP.len() - 1) as f32).round() as usize).min(RAMP.len() - 1);
            out.push(RAMP[idx] as char);
        }
        out.push('\n');
    }
    out
}

fn stats_json(stats: &FrameStats, frame: u32) -> serde_json::Value {
    serde_json::json!({
        "frame": frame,
        "passthrough": stats.passthrough,
        "sources": stats.sources,
        "occluders_drawn": stats.occluders_drawn,
        "blur_levels": stats.blur_levels,
        "commands": stats.commands,
        "scratch_allocated": stats.scratch_allocated,
    })
}

fn simulate(scenario: &Scenario, frames: u32, width: u32, json: bool) -> anyhow::Result<()> {
    let mut fog = FogOfWar::new(scenario.config.clone());
    let mut backend = CpuBackend::new();
    fog.activate(&mut backend)?;

    let src = ColorImage::filled(32, 32, [1.0; 4]);
    let mut dst = ColorImage::filled(32, 32, [0.0; 4]);
    let frame = scenario.frame();
    let mut last = FrameStats::default();
    let mut log = Vec::new();
    for i in 0..frames {
        last = fog.render(&mut backend, &scenario.scene, &src, &mut dst, &frame)?;
        log.push(stats_json(&last, i));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        match backend.visibility(VisibilityBuffer::Primary) {
            Some(vis) if !last.passthrough => {
                print!("{}", ascii_map(vis.size(), width, |x, y| vis.get(x, y)));
            }
            _ => println!("(passthrough: nothing to show)"),
        }
        println!(
            "frames={frames} sources={} occluders_drawn={} blur_levels={} commands={} scratch_textures={}",
            last.sources,
            last.occluders_drawn,
            last.blur_levels,
            last.commands,
            backend.scratch_textures_created()
        );
    }

    fog.deactivate(&mut backend);
    Ok(())
}

fn gpu(scenario: &Scenario, frames: u32, width: u32, outline: bool) -> anyhow::Result<()> {
    let device = match headless() {
        Ok(device) => device,
        Err(GpuError::NoAdapter) => {
            println!("no GPU adapter available");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    println!("adapter: {} ({:?})", device.adapter.name, device.adapter.backend);

    let mut backend = WgpuBackend::new(device.device, device.queue);
    let mut fog = FogOfWar::new(scenario.config.clone());
    fog.activate(&mut backend)?;

    let size = UVec2::splat(64);
    let src = ColorTarget::new(backend.device(), "cli_source", size);
    src.write(backend.queue(), &vec![255u8; (size.x * size.y * 4) as usize]);
    let mut dst = ColorTarget::new(backend.device(), "cli_destination", size);

    let frame = scenario.frame();
    let mut last = FrameStats::default();
    for _ in 0..frames {
        last = fog.render(&mut backend, &scenario.scene, &src, &mut dst, &frame)?;
    }

    if outline {
        OutlineRenderer::new(backend.device()).draw(
            backend.device(),
            backend.queue(),
            &dst,
            scenario.camera_view_projection(),
            scenario.config.area,
            scenario.config.camera_offset,
        );
        let pixels = dst.read(backend.device(), backend.queue())?;
        let lit = pixels.chunks_exact(4).filter(|p| p[0] > 200 && p[2] < 50).count();
        println!("outline pixels: {lit}");
    }

    if !last.passthrough {
        let (size, texels) = backend.read_visibility(VisibilityBuffer::Primary)?;
        print!(
            "{}",
            ascii_map(size, width, |x, y| texels[(y * size.x + x) as usize])
        );
    }
    println!(
        "frames={frames} commands={} scratch_textures={}",
        last.commands,
        backend.scratch_textures_created()
    );

    fog.deactivate(&mut backend);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("veil-cli v{}", env!("CARGO_PKG_VERSION"));
            let tiers: Vec<String> = ResolutionTier::ALL
                .iter()
                .map(|t| t.texels().to_string())
                .collect();
            println!("resolution tiers: {}", tiers.join(", "));
            let programs: Vec<String> = Program::CORE
                .iter()
                .chain(std::iter::once(&Program::Overlay))
                .map(|p| format!("{p:?}"))
                .collect();
            println!("programs: {}", programs.join(", "));
        }
        Commands::Simulate {
            frames,
            width,
            json,
        } => {
            let scenario = Scenario::load(cli.config.as_ref())?;
            simulate(&scenario, frames.unwrap_or(scenario.frames), width, json)?;
        }
        Commands::Pyramid {
            resolution,
            iterations,
        } => {
            let levels = plan_levels(resolution, iterations);
            println!("resolution={resolution} iterations={iterations} levels={}", levels.len());
            for (i, size) in levels.as_slice().iter().enumerate() {
                println!("  level {i}: {size}x{size}");
            }
        }
        Commands::Gpu {
            frames,
            width,
            outline,
        } => {
            let scenario = Scenario::load(cli.config.as_ref())?;
            gpu(&scenario, frames.unwrap_or(scenario.frames), width, outline)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scenario_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&Scenario::default()).unwrap();
        let back: Scenario = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.config, Scenario::default().config);
        assert_eq!(back.scene.source_count(), 2);
        assert_eq!(back.scene.occluder_count(), 1);
    }

    #[test]
    fn partial_scenario_fills_defaults() {
        let yaml = "frames: 3\nscene:\n  sources:\n    - position: [1.0, 0.0, 1.0]\n";
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.frames, 3);
        assert_eq!(scenario.scene.source_count(), 1);
        assert_eq!(scenario.scene.occluder_count(), 0);
        assert_eq!(scenario.config, FogConfig::default());
    }

    #[test]
    fn ascii_map_spans_the_ramp() {
        let map = ascii_map(UVec2::new(8, 8), 8, |x, _| x as f32 / 7.0);
        let lines: Vec<&str> = map.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.len() == 8));
        assert!(lines[0].starts_with(' '));
        assert!(lines[0].ends_with('@'));
    }

    #[test]
    fn default_scenario_simulates() {
        let scenario = Scenario::default();
        assert!(simulate(&scenario, 2, 16, true).is_ok());
    }
}
