use glam::UVec2;

use crate::command::{Command, CommandList, Pass, Published};

/// Name under which the visibility texture is bound for downstream materials.
pub const VISIBILITY_BINDING: &str = "fog_visibility";

/// A compiled pass program a backend keeps alive while the compositor is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Vision,
    Occluder,
    Accumulate,
    Temporal,
    Saturate,
    BlurHorizontal,
    BlurVertical,
    Upsample,
    Overlay,
}

impl Program {
    /// Programs every mode needs.
    pub const CORE: [Program; 8] = [
        Program::Vision,
        Program::Occluder,
        Program::Accumulate,
        Program::Temporal,
        Program::Saturate,
        Program::BlurHorizontal,
        Program::BlurVertical,
        Program::Upsample,
    ];

    pub fn for_pass(pass: &Pass) -> Program {
        match pass {
            Pass::Accumulate => Program::Accumulate,
            Pass::Temporal(_) => Program::Temporal,
            Pass::Saturate => Program::Saturate,
            Pass::BlurHorizontal => Program::BlurHorizontal,
            Pass::BlurVertical => Program::BlurVertical,
            Pass::Upsample => Program::Upsample,
            Pass::Overlay(_) => Program::Overlay,
        }
    }

    /// Program a command runs, if it runs one at all.
    pub fn for_command(command: &Command) -> Option<Program> {
        match command {
            Command::DrawVision { .. } => Some(Program::Vision),
            Command::DrawOccluder { .. } => Some(Program::Occluder),
            Command::Blit { pass, .. } => Some(Program::for_pass(pass)),
            _ => None,
        }
    }
}

/// GPU-facing half of the compositor.
///
/// The compositor decides what to draw and records it; a backend owns every
/// texture and program and executes the recorded list. All methods are called
/// from the frame thread only.
pub trait RenderBackend {
    /// The host's colour buffers passed to each frame.
    type ColorBuffer;
    type Error: std::error::Error + 'static;

    /// Allocate both visibility buffers at `size`, cleared to zero.
    fn create_visibility_buffers(&mut self, size: UVec2) -> Result<(), Self::Error>;

    fn create_programs(&mut self, programs: &[Program]) -> Result<(), Self::Error>;

    /// Run every command of `list` in order.
    fn execute(
        &mut self,
        list: &CommandList,
        source: &Self::ColorBuffer,
        destination: &mut Self::ColorBuffer,
    ) -> Result<(), Self::Error>;

    /// Plain copy from `source` to `destination`.
    fn copy(
        &mut self,
        source: &Self::ColorBuffer,
        destination: &mut Self::ColorBuffer,
    ) -> Result<(), Self::Error>;

    /// Point [`VISIBILITY_BINDING`] at a buffer or the neutral placeholder.
    fn publish(&mut self, binding: Published);

    /// Release both visibility buffers. Safe to call when none exist.
    fn destroy_visibility_buffers(&mut self);

    /// Release all programs. Safe to call when none exist.
    fn destroy_programs(&mut self);

    /// Scratch targets currently handed out to the frame.
    fn live_scratch_targets(&self) -> usize;
}
