use glam::UVec2;

/// Scratch targets a single frame may hold at once: a full blur pyramid plus
/// one per-source stamp.
pub const SCRATCH_CAPACITY: usize = 2 * crate::config::MAX_BLUR_ITERATIONS as usize + 1;

/// One of the two ping-pong visibility buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityBuffer {
    /// Rasterized each frame, then blurred and published.
    Primary,
    /// Temporal history: last frame's blended result.
    History,
}

/// A frame-scoped scratch target.
///
/// `slot` is the stack depth it was pushed at; `generation` is unique per push
/// so a stale handle to a reused slot is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScratchHandle {
    pub slot: u32,
    pub generation: u32,
}

/// Anything a pass can read from or draw into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    Visibility(VisibilityBuffer),
    Scratch(ScratchHandle),
    /// The host's source colour buffer for this frame.
    Source,
    /// The host's destination colour buffer for this frame.
    Destination,
}

/// Errors from scratch target bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("released {released:?} but the top of the stack is {top:?}")]
    OutOfOrder {
        released: ScratchHandle,
        top: ScratchHandle,
    },
    #[error("released {0:?} with no scratch target outstanding")]
    Empty(ScratchHandle),
    #[error("scratch stack exhausted")]
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: ScratchHandle,
    size: UVec2,
}

/// Stack allocator for frame-scoped scratch targets.
///
/// Push hands out a fresh handle; pop must name the top handle. Storage is
/// reserved once, so steady-state frames do not allocate.
#[derive(Debug)]
pub struct ScratchStack {
    entries: Vec<Entry>,
    next_generation: u32,
    pushed: u64,
    popped: u64,
    high_water: usize,
}

impl Default for ScratchStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(SCRATCH_CAPACITY),
            next_generation: 0,
            pushed: 0,
            popped: 0,
            high_water: 0,
        }
    }

    pub fn push(&mut self, size: UVec2) -> Result<ScratchHandle, TargetError> {
        if self.entries.len() >= SCRATCH_CAPACITY {
            return Err(TargetError::Exhausted);
        }
        let handle = ScratchHandle {
            slot: self.entries.len() as u32,
            generation: self.next_generation,
        };
        self.next_generation = self.next_generation.wrapping_add(1);
        self.entries.push(Entry { handle, size });
        self.pushed += 1;
        self.high_water = self.high_water.max(self.entries.len());
        Ok(handle)
    }

    pub fn pop(&mut self, handle: ScratchHandle) -> Result<(), TargetError> {
        let top = self.entries.last().ok_or(TargetError::Empty(handle))?;
        if top.handle != handle {
            debug_assert!(false, "scratch targets released out of order");
            return Err(TargetError::OutOfOrder {
                released: handle,
                top: top.handle,
            });
        }
        self.entries.pop();
        self.popped += 1;
        Ok(())
    }

    pub fn size_of(&self, handle: ScratchHandle) -> Option<UVec2> {
        self.entries
            .get(handle.slot as usize)
            .filter(|e| e.handle == handle)
            .map(|e| e.size)
    }

    /// Targets currently outstanding.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Total pushes since creation.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Total pops since creation.
    pub fn popped(&self) -> u64 {
        self.popped
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Drop everything outstanding, e.g. after an aborted frame.
    pub fn reset(&mut self) {
        self.popped += self.entries.len() as u64;
        self.entries.clear();
    }
}
