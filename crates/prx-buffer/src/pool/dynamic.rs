//! 动态策略：每个缓冲单独向分配器申请，支持调整尺寸。

use std::sync::Arc;

use bytes::BytesMut;

use super::BlockSource;
use crate::{
    alloc::Allocator,
    config::PoolKind,
    error::BufferError,
    pooled_buffer::PooledBuffer,
    sealed::Sealed,
};

/// [`DynamicPool`](super::DynamicPool) 的块来源。
pub struct DynamicStrategy {
    allocator: Arc<dyn Allocator>,
}

impl Sealed for DynamicStrategy {}

impl BlockSource for DynamicStrategy {
    const KIND: PoolKind = PoolKind::Dynamic;

    fn with_allocator(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator }
    }

    fn grow(&self, pool: &str, item_size: usize, count: usize) -> Result<Vec<BytesMut>, BufferError> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocator.allocate(item_size) {
                Ok(block) => blocks.push(block),
                // 部分成功即成功，剩余的留给下一次扩容。
                Err(err) if !blocks.is_empty() => {
                    tracing::debug!(pool, added = blocks.len(), error = %err, "partial grow");
                    break;
                }
                Err(err) => return Err(BufferError::out_of_memory(pool, err.to_string())),
            }
        }
        Ok(blocks)
    }

    fn resize(&self, pool: &str, block: &mut BytesMut, new_len: usize) -> Result<(), BufferError> {
        if new_len == 0 {
            return Err(BufferError::invalid_argument(format!(
                "pool `{pool}` cannot resize a buffer to zero bytes"
            )));
        }
        self.allocator
            .reallocate(block, new_len)
            .map_err(|err| BufferError::out_of_memory(pool, err.to_string()))
    }

    fn size_of(&self, buffer: &PooledBuffer, _item_size: usize) -> usize {
        buffer.len()
    }

    fn release_all(&self) {}
}
