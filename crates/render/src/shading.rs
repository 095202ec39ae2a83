//! Per-texel math of the fog passes.
//!
//! The CPU backend evaluates these directly; the WGSL programs in the GPU
//! backend implement the same formulas.

use glam::{Mat4, Vec3};
use veil_common::Aabb;

/// Fraction of the vision radius over which the stamp fades out.
pub const VISION_FALLOFF: f32 = 0.1;
/// Width in world units of the soft edge where a shadow begins.
pub const SHADOW_SOFTNESS: f32 = 0.1;
/// Brightness of fully fogged pixels in overlay mode.
pub const BASE_LIGHT_LEVEL: f32 = 0.2;
/// Half of a 9-tap gaussian kernel, centre first.
pub const BLUR_WEIGHTS: [f32; 5] = [0.227_027, 0.194_594_6, 0.121_621_6, 0.054_054, 0.016_216];

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Visibility stamped at `distance` from a source of the given radius.
pub fn vision(distance: f32, radius: f32) -> f32 {
    1.0 - smoothstep(radius * (1.0 - VISION_FALLOFF), radius, distance)
}

/// Parameter in `[0, 1]` at which segment `a → b` enters the box, if it does.
pub fn segment_entry(a: Vec3, b: Vec3, bounds: &Aabb) -> Option<f32> {
    let d = b - a;
    let mut t_min = 0.0_f32;
    let mut t_max = 1.0_f32;
    for axis in 0..3 {
        let (o, dir, lo, hi) = (a[axis], d[axis], bounds.min[axis], bounds.max[axis]);
        if dir.abs() < 1e-8 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir;
        let (t0, t1) = ((lo - o) * inv, (hi - o) * inv);
        t_min = t_min.max(t0.min(t1));
        t_max = t_max.min(t0.max(t1));
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

/// How much of the fragment at `ground` is hidden from `source` by one occluder.
///
/// Both points are taken into the occluder's local space, where its shape is an
/// axis-aligned box. Sight reaches `reach` world units into the occluder before
/// the shadow starts.
pub fn shadow(source: Vec3, ground: Vec3, world_to_local: &Mat4, shape: &Aabb, reach: f32) -> f32 {
    let a = world_to_local.transform_point3(source);
    let b = world_to_local.transform_point3(ground);
    match segment_entry(a, b, shape) {
        Some(t) => {
            let beyond = (1.0 - t) * source.distance(ground);
            smoothstep(reach, reach + SHADOW_SOFTNESS, beyond)
        }
        None => 0.0,
    }
}

/// Roughens partially revealed texels with noise; 0 and 1 are left untouched.
pub fn perturb(value: f32, noise: f32, magnitude: f32) -> f32 {
    let edge = 4.0 * value * (1.0 - value);
    (value + (noise - 0.5) * magnitude * edge).clamp(0.0, 1.0)
}

/// `lerp(prev, new, saturate(factor))`. Exact at both ends.
pub fn temporal_blend(prev: f32, new: f32, factor: f32) -> f32 {
    let t = factor.clamp(0.0, 1.0);
    prev * (1.0 - t) + new * t
}

/// Contrast curve of the saturate pass.
pub fn saturate(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}

/// Merge an upsampled coarser level into the finer level it lands on.
pub fn upsample_combine(existing: f32, upsampled: f32) -> f32 {
    0.5 * (existing + upsampled)
}

/// Overlay tint for a colour channel at the given visibility.
pub fn overlay(channel: f32, visibility: f32, base_level: f32) -> f32 {
    let v = visibility.clamp(0.0, 1.0);
    channel * (base_level + (1.0 - base_level) * v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_common::Transform;

    #[test]
    fn blur_kernel_is_normalized() {
        let sum = BLUR_WEIGHTS[0] + 2.0 * BLUR_WEIGHTS[1..].iter().sum::<f32>();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn vision_is_full_inside_and_zero_outside() {
        assert_eq!(vision(0.0, 10.0), 1.0);
        assert_eq!(vision(8.9, 10.0), 1.0);
        assert!(vision(9.5, 10.0) > 0.0 && vision(9.5, 10.0) < 1.0);
        assert_eq!(vision(10.0, 10.0), 0.0);
        assert_eq!(vision(25.0, 10.0), 0.0);
    }

    #[test]
    fn segment_entry_hits_and_misses() {
        let b = Aabb::new(Vec3::new(2.0, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0));
        let t = segment_entry(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), &b).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        assert!(segment_entry(Vec3::ZERO, Vec3::new(1.5, 0.0, 0.0), &b).is_none());
        assert!(segment_entry(Vec3::new(0.0, 0.0, 2.0), Vec3::new(4.0, 0.0, 2.0), &b).is_none());
        // starting inside enters at once
        assert_eq!(segment_entry(Vec3::new(2.5, 0.0, 0.0), Vec3::new(9.0, 0.0, 0.0), &b), Some(0.0));
    }

    #[test]
    fn shadow_starts_past_the_reach() {
        let wall = Transform {
            position: Vec3::new(5.0, 1.0, 0.0),
            scale: Vec3::new(1.0, 2.0, 4.0),
            ..Transform::default()
        };
        let inv = wall.matrix().inverse();
        let shape = Aabb::unit();
        let src = Vec3::new(0.0, 0.5, 0.0);
        // the wall's near face is at x = 4.5
        assert_eq!(shadow(src, Vec3::new(4.0, 0.5, 0.0), &inv, &shape, 1.0), 0.0);
        assert_eq!(shadow(src, Vec3::new(5.0, 0.5, 0.0), &inv, &shape, 1.0), 0.0);
        assert_eq!(shadow(src, Vec3::new(8.0, 0.5, 0.0), &inv, &shape, 1.0), 1.0);
        // beside the wall
        assert_eq!(shadow(src, Vec3::new(8.0, 0.5, 6.0), &inv, &shape, 1.0), 0.0);
    }

    #[test]
    fn low_occluder_below_the_source_casts_nothing() {
        let curb = Transform {
            position: Vec3::new(5.0, 0.25, 0.0),
            scale: Vec3::new(1.0, 0.5, 4.0),
            ..Transform::default()
        };
        let inv = curb.matrix().inverse();
        let src = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(shadow(src, Vec3::new(9.0, 1.0, 0.0), &inv, &Aabb::unit(), 0.0), 0.0);
    }

    #[test]
    fn perturb_leaves_extremes_alone() {
        assert_eq!(perturb(0.0, 1.0, 1.0), 0.0);
        assert_eq!(perturb(1.0, 0.0, 1.0), 1.0);
        assert!((perturb(0.5, 1.0, 1.0) - 1.0).abs() < 1e-6);
        assert_eq!(perturb(0.5, 0.5, 1.0), 0.5);
    }

    #[test]
    fn blend_is_exact_at_both_ends() {
        for &(p, n) in &[(0.3_f32, 0.9_f32), (1.0, 0.0), (0.123, 0.456)] {
            assert_eq!(temporal_blend(p, n, 0.0), p);
            assert_eq!(temporal_blend(p, n, 1.0), n);
            assert_eq!(temporal_blend(p, n, 1e9), n);
        }
        assert!((temporal_blend(0.0, 1.0, 0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn saturate_sharpens_towards_the_ends() {
        assert_eq!(saturate(0.0), 0.0);
        assert_eq!(saturate(1.0), 1.0);
        assert_eq!(saturate(0.5), 0.5);
        assert!(saturate(0.2) < 0.2);
        assert!(saturate(0.8) > 0.8);
        assert!(saturate(saturate(0.8)) > saturate(0.8));
    }

    #[test]
    fn upsample_keeps_uniform_fields() {
        assert_eq!(upsample_combine(1.0, 1.0), 1.0);
        assert_eq!(upsample_combine(0.0, 0.0), 0.0);
        assert_eq!(upsample_combine(1.0, 0.0), 0.5);
    }

    #[test]
    fn overlay_keeps_base_light() {
        assert!((overlay(1.0, 0.0, BASE_LIGHT_LEVEL) - BASE_LIGHT_LEVEL).abs() < 1e-6);
        assert_eq!(overlay(0.5, 1.0, BASE_LIGHT_LEVEL), 0.5);
        assert_eq!(overlay(0.5, 0.0, 1.0), 0.5);
    }
}
