// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::MemoryError;
use crate::memory::{Buffer, BufferId, BufferSpec};

/// Owner of every buffer in a workflow. Buffers are addressed by [`BufferId`]
/// and never removed, so ids stay valid for the workflow's lifetime.
#[derive(Debug, Default)]
pub struct BufferArena {
    buffers: Vec<Buffer>,
}

impl BufferArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, name: impl Into<String>, spec: BufferSpec) -> BufferId {
        let id = BufferId::new(self.buffers.len());
        self.buffers.push(Buffer::new(id, name, spec));
        id
    }

    pub fn get(&self, id: BufferId) -> Result<&Buffer, MemoryError> {
        self.buffers
            .get(id.index())
            .ok_or(MemoryError::UnknownBuffer(id))
    }

    pub fn get_mut(&mut self, id: BufferId) -> Result<&mut Buffer, MemoryError> {
        self.buffers
            .get_mut(id.index())
            .ok_or(MemoryError::UnknownBuffer(id))
    }

    /// Borrow several distinct buffers mutably at once, in the order given.
    pub fn get_many_mut(&mut self, ids: &[BufferId]) -> Result<Vec<&mut Buffer>, MemoryError> {
        for (i, id) in ids.iter().enumerate() {
            if id.index() >= self.buffers.len() {
                return Err(MemoryError::UnknownBuffer(*id));
            }
            if ids[..i].contains(id) {
                return Err(MemoryError::AliasedBuffer {
                    buffer: *id,
                    context: "a single mapping request".to_string(),
                });
            }
        }

        let mut slots: Vec<Option<&mut Buffer>> = self.buffers.iter_mut().map(Some).collect();
        Ok(ids
            .iter()
            .filter_map(|id| slots[id.index()].take())
            .collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Synchronize every buffer to the host and release all device memory.
    pub fn reset_all(&mut self) -> Result<(), MemoryError> {
        for buffer in &mut self.buffers {
            buffer.reset()?;
        }
        Ok(())
    }

    /// Total device allocations held across all buffers.
    pub fn device_allocations(&self) -> usize {
        self.buffers.iter().map(|b| b.device_allocations()).sum()
    }
}
