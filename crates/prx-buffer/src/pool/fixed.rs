//! 固定块策略：一次申请一整块 slab，再按 `item_size` 步长切分。
//!
//! 所有缓冲尺寸恒为 `item_size`，调整尺寸一律返回 [`BufferError::NotSupported`]。
//! slab 的地址区间记录在策略内部，用于回答某个缓冲来自哪一块 slab。

use std::{ops::Range, sync::Arc};

use bytes::BytesMut;
use spin::Mutex;

use super::{BlockSource, FixedPool};
use crate::{
    alloc::Allocator,
    config::PoolKind,
    error::BufferError,
    pooled_buffer::PooledBuffer,
    sealed::Sealed,
};

/// [`FixedPool`] 的块来源。
pub struct FixedStrategy {
    allocator: Arc<dyn Allocator>,
    slabs: Mutex<Vec<Range<usize>>>,
}

impl FixedStrategy {
    fn slab_count(&self) -> usize {
        self.slabs.lock().len()
    }

    fn slab_containing(&self, addr: usize) -> Option<usize> {
        self.slabs
            .lock()
            .iter()
            .position(|range| range.contains(&addr))
    }
}

impl Sealed for FixedStrategy {}

impl BlockSource for FixedStrategy {
    const KIND: PoolKind = PoolKind::Fixed;

    fn with_allocator(allocator: Arc<dyn Allocator>) -> Self {
        Self {
            allocator,
            slabs: Mutex::new(Vec::new()),
        }
    }

    fn grow(&self, pool: &str, item_size: usize, count: usize) -> Result<Vec<BytesMut>, BufferError> {
        let len = count.checked_mul(item_size).ok_or_else(|| {
            BufferError::out_of_memory(pool, format!("slab of {count} x {item_size} bytes overflows"))
        })?;
        let mut slab = self
            .allocator
            .allocate(len)
            .map_err(|err| BufferError::out_of_memory(pool, err.to_string()))?;
        let base = slab.as_ptr() as usize;
        self.slabs.lock().push(base..base + len);

        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            blocks.push(slab.split_to(item_size));
        }
        Ok(blocks)
    }

    fn resize(&self, pool: &str, _block: &mut BytesMut, _new_len: usize) -> Result<(), BufferError> {
        Err(BufferError::NotSupported {
            pool: pool.to_owned(),
            operation: "set_size",
        })
    }

    fn size_of(&self, _buffer: &PooledBuffer, item_size: usize) -> usize {
        item_size
    }

    fn release_all(&self) {
        self.slabs.lock().clear();
    }
}

impl FixedPool {
    /// 已申请的 slab 数量。
    pub fn slab_count(&self) -> usize {
        self.strategy().slab_count()
    }

    /// 缓冲所在 slab 的序号；不属于本池时返回 `None`。
    pub fn slab_of(&self, buffer: &PooledBuffer) -> Option<usize> {
        self.owns(buffer).ok()?;
        let addr = buffer.lock().as_ptr() as usize;
        self.strategy().slab_containing(addr)
    }
}
