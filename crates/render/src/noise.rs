//! Ground-anchored value noise used to roughen the fog edge.
//!
//! The WGSL passes carry a line-for-line copy of these functions; keep the
//! hash constants in sync with `NOISE_WGSL`.

/// Hash of an integer lattice point, in `[0, 1]`.
#[inline]
pub fn lattice_hash(x: i32, y: i32) -> f32 {
    let mut h = (x as u32).wrapping_mul(374_761_393);
    h = h.wrapping_add(y as u32).wrapping_mul(668_265_263);
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    h ^= h >> 16;
    (h & 0x7fff) as f32 / 0x7fff as f32
}

/// Hermite curve `3t² - 2t³`.
#[inline]
fn fade(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// 2D value noise, in `[0, 1]`.
pub fn value_noise(x: f32, y: f32) -> f32 {
    let (fx, fy) = (x.floor(), y.floor());
    let (ix, iy) = (fx as i32, fy as i32);
    let (tx, ty) = (fade(x - fx), fade(y - fy));

    let c00 = lattice_hash(ix, iy);
    let c10 = lattice_hash(ix.wrapping_add(1), iy);
    let c01 = lattice_hash(ix, iy.wrapping_add(1));
    let c11 = lattice_hash(ix.wrapping_add(1), iy.wrapping_add(1));

    let a = c00 + (c10 - c00) * tx;
    let b = c01 + (c11 - c01) * tx;
    a + (b - a) * ty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_bounded() {
        for x in -20..20 {
            for y in -20..20 {
                let h = lattice_hash(x, y);
                assert_eq!(h, lattice_hash(x, y));
                assert!((0.0..=1.0).contains(&h));
            }
        }
    }

    #[test]
    fn noise_matches_lattice_at_integers() {
        assert_eq!(value_noise(3.0, -4.0), lattice_hash(3, -4));
    }

    #[test]
    fn noise_is_continuous() {
        let a = value_noise(1.4999, 2.25);
        let b = value_noise(1.5001, 2.25);
        assert!((a - b).abs() < 1e-2);
    }

    #[test]
    fn noise_varies_across_cells() {
        let samples: Vec<f32> = (0..16).map(|i| value_noise(i as f32 + 0.5, 0.5)).collect();
        let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(max - min > 0.1);
    }
}
