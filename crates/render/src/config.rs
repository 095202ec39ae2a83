use serde::{Deserialize, Serialize};
use veil_common::Rect;

/// Upper bound on blur pyramid levels.
pub const MAX_BLUR_ITERATIONS: u32 = 10;

/// How the visibility field reaches the final image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Publish the field for downstream materials; the frame is copied untouched.
    #[default]
    ShadowBlend,
    /// Darken the frame directly by reprojecting the field through the main camera.
    Overlay,
}

/// Visibility buffer resolution along the area's longer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[default]
    #[serde(rename = "2048")]
    R2048,
    #[serde(rename = "1024")]
    R1024,
    #[serde(rename = "512")]
    R512,
    #[serde(rename = "256")]
    R256,
    #[serde(rename = "128")]
    R128,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 5] = [
        ResolutionTier::R2048,
        ResolutionTier::R1024,
        ResolutionTier::R512,
        ResolutionTier::R256,
        ResolutionTier::R128,
    ];

    pub fn texels(self) -> u32 {
        match self {
            Self::R2048 => 2048,
            Self::R1024 => 1024,
            Self::R512 => 512,
            Self::R256 => 256,
            Self::R128 => 128,
        }
    }
}

/// Errors from configuration validation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("visibility area must have positive width and height, got {width}x{height}")]
    DegenerateArea { width: f32, height: f32 },
    #[error("vision radius must be positive, got {0}")]
    Radius(f32),
    #[error("camera offset must be non-negative, got {0}")]
    CameraOffset(f32),
    #[error("blend speed must be non-negative, got {0}")]
    BlendSpeed(f32),
    #[error("blur iterations must be at most 10, got {0}")]
    BlurIterations(u32),
}

/// Compositor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    pub mode: Mode,
    /// Vision radius for sources that don't carry their own.
    pub radius: f32,
    pub resolution: ResolutionTier,
    /// Distance from a vision source up to its clip plane. Lets a source stand
    /// inside geometry without the ceiling occluding it.
    pub camera_offset: f32,
    /// World units an occluder stays visible past the point where sight enters it.
    pub shadow_reach: f32,
    pub area: Rect,
    pub noise_scale: f32,
    pub noise_magnitude: f32,
    pub blur_iterations: u32,
    /// Temporal blend rate, in full blends per second.
    pub blend_speed: f32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            mode: Mode::ShadowBlend,
            radius: 10.0,
            resolution: ResolutionTier::R2048,
            camera_offset: 5.0,
            shadow_reach: 1.0,
            area: Rect::default(),
            noise_scale: 20.0,
            noise_magnitude: 1.0,
            blur_iterations: 2,
            blend_speed: 5.0,
        }
    }
}

impl FogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (w, h) = (self.area.width(), self.area.height());
        if !(w > 0.0 && h > 0.0) {
            return Err(ConfigError::DegenerateArea {
                width: w,
                height: h,
            });
        }
        if !(self.radius > 0.0) {
            return Err(ConfigError::Radius(self.radius));
        }
        if !(self.camera_offset >= 0.0) {
            return Err(ConfigError::CameraOffset(self.camera_offset));
        }
        if !(self.blend_speed >= 0.0) {
            return Err(ConfigError::BlendSpeed(self.blend_speed));
        }
        if self.blur_iterations > MAX_BLUR_ITERATIONS {
            return Err(ConfigError::BlurIterations(self.blur_iterations));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = FogConfig::default();
        assert_eq!(c.mode, Mode::ShadowBlend);
        assert_eq!(c.resolution.texels(), 2048);
        assert_eq!(c.blur_iterations, 2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_area() {
        let c = FogConfig {
            area: Rect::from_xywh(0.0, 0.0, 10.0, 0.0),
            ..FogConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::DegenerateArea { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = FogConfig::default();
        let bad = [
            FogConfig { radius: 0.0, ..base.clone() },
            FogConfig { camera_offset: -1.0, ..base.clone() },
            FogConfig { blend_speed: f32::NAN, ..base.clone() },
            FogConfig { blur_iterations: 11, ..base.clone() },
        ];
        for c in bad {
            assert!(c.validate().is_err(), "{c:?} should be rejected");
        }
        let edge = FogConfig {
            blur_iterations: MAX_BLUR_ITERATIONS,
            camera_offset: 0.0,
            blend_speed: 0.0,
            ..base
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn tiers_are_descending_powers_of_two() {
        let texels: Vec<u32> = ResolutionTier::ALL.iter().map(|t| t.texels()).collect();
        assert_eq!(texels, vec![2048, 1024, 512, 256, 128]);
    }

    #[test]
    fn yaml_uses_readable_names() {
        let c: FogConfig = serde_yaml::from_str("mode: overlay\nresolution: '256'\nradius: 4.0\n").unwrap();
        assert_eq!(c.mode, Mode::Overlay);
        assert_eq!(c.resolution, ResolutionTier::R256);
        assert_eq!(c.radius, 4.0);
        assert_eq!(c.noise_scale, 20.0);
    }
}
