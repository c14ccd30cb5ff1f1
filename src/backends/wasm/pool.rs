// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! First-fit allocator over a device's linear memory.
//!
//! Offsets below [`BASE_OFFSET`] are never handed out, so offset 0 can serve
//! as the null pointer. Freed blocks are coalesced with their neighbours and
//! a block ending at the bump pointer is returned to the untouched region.

use std::collections::{BTreeMap, HashMap};

pub const ALIGN: usize = 16;
pub const BASE_OFFSET: usize = ALIGN;

#[derive(Debug)]
pub struct DevicePool {
    capacity: usize,
    top: usize,
    free: BTreeMap<usize, usize>,
    live: HashMap<usize, usize>,
}

fn align_up(bytes: usize) -> usize {
    bytes.max(1).div_ceil(ALIGN) * ALIGN
}

impl DevicePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            top: BASE_OFFSET,
            free: BTreeMap::new(),
            live: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Extend the managed region after the underlying memory grew.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = self.capacity.max(capacity);
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// Bytes still obtainable without growing, ignoring fragmentation.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.top) + self.free.values().sum::<usize>()
    }

    /// Capacity needed for `bytes` to fit past the bump pointer.
    pub fn required_capacity(&self, bytes: usize) -> usize {
        self.top + align_up(bytes)
    }

    /// Size of the live allocation at `offset`.
    pub fn size_of(&self, offset: usize) -> Option<usize> {
        self.live.get(&offset).copied()
    }

    pub fn allocate(&mut self, bytes: usize) -> Option<usize> {
        let size = align_up(bytes);

        let reused = self
            .free
            .iter()
            .find(|(_, block)| **block >= size)
            .map(|(offset, block)| (*offset, *block));

        let offset = match reused {
            Some((offset, block)) => {
                self.free.remove(&offset);
                if block > size {
                    self.free.insert(offset + size, block - size);
                }
                offset
            }
            None if self.top + size <= self.capacity => {
                let offset = self.top;
                self.top += size;
                offset
            }
            None => return None,
        };

        self.live.insert(offset, size);
        Some(offset)
    }

    /// Return a block to the pool. `None` when `offset` is not live.
    pub fn free(&mut self, offset: usize) -> Option<usize> {
        let size = self.live.remove(&offset)?;
        let mut start = offset;
        let mut len = size;

        if let Some(next) = self.free.remove(&(start + len)) {
            len += next;
        }
        if let Some((&prev, &prev_len)) = self.free.range(..start).next_back() {
            if prev + prev_len == start {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }

        if start + len == self.top {
            self.top = start;
        } else {
            self.free.insert(start, len);
        }
        Some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_hands_out_null() {
        let mut pool = DevicePool::new(1024);
        let a = pool.allocate(4).unwrap();
        assert!(a >= BASE_OFFSET);
        assert_eq!(a % ALIGN, 0);
    }

    #[test]
    fn test_reuses_freed_blocks() {
        let mut pool = DevicePool::new(1024);
        let a = pool.allocate(32).unwrap();
        let _b = pool.allocate(32).unwrap();
        pool.free(a).unwrap();
        let c = pool.allocate(20).unwrap();
        assert_eq!(a, c);
        assert_eq!(pool.live(), 2);
    }

    #[test]
    fn test_freeing_everything_restores_capacity() {
        let mut pool = DevicePool::new(256);
        let blocks: Vec<usize> = (0..5).map(|_| pool.allocate(40).unwrap()).collect();
        let full = pool.available();
        for offset in [blocks[1], blocks[3], blocks[0], blocks[4], blocks[2]] {
            pool.free(offset).unwrap();
        }
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.available(), 256 - BASE_OFFSET);
        assert!(pool.available() > full);
        assert!(pool.allocate(200).is_some());
    }

    #[test]
    fn test_exhaustion_and_double_free() {
        let mut pool = DevicePool::new(64);
        let a = pool.allocate(48).unwrap();
        assert!(pool.allocate(16).is_none());
        assert_eq!(pool.required_capacity(16), 80);
        assert_eq!(pool.free(a), Some(48));
        assert_eq!(pool.free(a), None);
    }
}
