use glam::UVec2;

use super::Recorder;
use crate::command::Pass;
use crate::config::MAX_BLUR_ITERATIONS;
use crate::targets::{ScratchHandle, TargetError, TargetId, VisibilityBuffer};

/// Smallest pyramid level side; the downsample stops before going below it.
pub const MIN_LEVEL_SIZE: u32 = 64;

const MAX_LEVELS: usize = MAX_BLUR_ITERATIONS as usize;

/// Side lengths of the square pyramid levels, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPlan {
    sizes: [u32; MAX_LEVELS],
    len: usize,
}

impl LevelPlan {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.sizes[..self.len]
    }
}

/// Levels a pyramid of `iterations` builds over a buffer of the given tier
/// resolution. Iterations past the configured maximum are ignored.
pub fn plan_levels(resolution: u32, iterations: u32) -> LevelPlan {
    let mut plan = LevelPlan {
        sizes: [0; MAX_LEVELS],
        len: 0,
    };
    let mut size = resolution / 2;
    let count = (iterations as usize).min(MAX_LEVELS);
    while plan.len < count && size >= MIN_LEVEL_SIZE {
        plan.sizes[plan.len] = size;
        plan.len += 1;
        size /= 2;
    }
    plan
}

#[derive(Clone, Copy)]
struct Level {
    to: ScratchHandle,
    mid: ScratchHandle,
}

/// Counters from one pyramid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlurStats {
    pub levels: usize,
    pub allocated: usize,
    pub released: usize,
}

/// Blur the primary visibility buffer in place through a half-resolution
/// pyramid.
///
/// Every level pushes its "to" target and then its "mid" target, and the
/// targets are popped in exactly the reverse order: a level's "mid" stays
/// live until the coarser level has been upsampled into its "to".
pub fn record_blur(
    rec: &mut Recorder<'_>,
    resolution: u32,
    iterations: u32,
) -> Result<BlurStats, TargetError> {
    let _span = tracing::info_span!("blur_pyramid", resolution, iterations).entered();
    let buffer = TargetId::Visibility(VisibilityBuffer::Primary);
    let plan = plan_levels(resolution, iterations);
    let mut stats = BlurStats {
        levels: plan.len(),
        ..BlurStats::default()
    };
    if plan.is_empty() {
        return Ok(stats);
    }

    let mut levels = [None::<Level>; MAX_LEVELS];
    let mut input = buffer;
    for (slot, &size) in levels.iter_mut().zip(plan.as_slice()) {
        let size = UVec2::splat(size);
        let to = rec.alloc(size)?;
        let mid = rec.alloc(size)?;
        stats.allocated += 2;
        rec.blit(input, TargetId::Scratch(mid), Pass::BlurHorizontal);
        rec.blit(TargetId::Scratch(mid), TargetId::Scratch(to), Pass::BlurVertical);
        input = TargetId::Scratch(to);
        *slot = Some(Level { to, mid });
    }

    let mut coarse_to_fine = levels[..plan.len()].iter().rev().flatten();
    let Some(&coarsest) = coarse_to_fine.next() else {
        return Ok(stats);
    };
    let mut current = coarsest;
    rec.release(current.mid)?;
    stats.released += 1;

    for &finer in coarse_to_fine {
        rec.blit(
            TargetId::Scratch(current.to),
            TargetId::Scratch(finer.to),
            Pass::Upsample,
        );
        rec.release(current.to)?;
        rec.release(finer.mid)?;
        stats.released += 2;
        current = finer;
    }

    rec.blit(TargetId::Scratch(current.to), buffer, Pass::Upsample);
    rec.release(current.to)?;
    stats.released += 1;

    tracing::trace!(levels = stats.levels, "blur pyramid recorded");
    Ok(stats)
}
