//! Per-frame pipeline stages. Each stage only records commands; nothing runs
//! until the backend executes the finished list.

pub mod blur;
pub mod rasterize;
pub mod temporal;

use glam::UVec2;

use crate::command::{Command, CommandList, Pass};
use crate::targets::{ScratchHandle, ScratchStack, TargetError, TargetId};

/// Records commands while keeping scratch target bookkeeping in step.
pub struct Recorder<'a> {
    list: &'a mut CommandList,
    scratch: &'a mut ScratchStack,
}

impl<'a> Recorder<'a> {
    pub fn new(list: &'a mut CommandList, scratch: &'a mut ScratchStack) -> Self {
        Self { list, scratch }
    }

    pub fn push(&mut self, command: Command) {
        self.list.push(command);
    }

    pub fn blit(&mut self, src: TargetId, dst: TargetId, pass: Pass) {
        self.list.blit(src, dst, pass);
    }

    pub fn alloc(&mut self, size: UVec2) -> Result<ScratchHandle, TargetError> {
        let handle = self.scratch.push(size)?;
        self.list.push(Command::AllocScratch { handle, size });
        Ok(handle)
    }

    pub fn release(&mut self, handle: ScratchHandle) -> Result<(), TargetError> {
        self.scratch.pop(handle)?;
        self.list.push(Command::ReleaseScratch(handle));
        Ok(())
    }

    pub fn scratch_depth(&self) -> usize {
        self.scratch.depth()
    }
}
