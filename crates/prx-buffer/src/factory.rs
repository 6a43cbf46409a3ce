//! 统一的缓冲工厂接口。
//!
//! # 设计背景（Why）
//! - I/O 队列与流层只关心“拿到一块缓冲、用完归还”，不应感知背后是动态池还是固定块池；
//! - 以对象安全的 trait 暴露操作面，调用方持有 `Arc<dyn BufferFactory>` 即可，
//!   多态完全由 trait 对象承担。
//!
//! # 契约说明（What）
//! - `alloc(Some(original))` 是 retain：返回同一租约的新句柄，不触碰空闲链表；
//! - `release` 等价于丢弃句柄，引用计数归零时块回到所属池；
//! - `set_size` 在固定块池上恒定返回 [`BufferError::NotSupported`]；
//! - 把其他池的缓冲交给本池属于 [`BufferError::InvalidArgument`]。

use std::sync::Arc;

use tracing::debug;

use crate::{
    config::{PoolKind, PoolSettings},
    error::BufferError,
    pool::{BlockSource, BufferPool, DynamicPool, FixedPool, PoolStats},
    pooled_buffer::PooledBuffer,
    watermark::WatermarkCallback,
};

/// 缓冲池的统一操作面。
pub trait BufferFactory: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn kind(&self) -> PoolKind;

    /// 申请缓冲；传入 `original` 时为 retain。
    fn alloc(&self, original: Option<&PooledBuffer>) -> Result<PooledBuffer, BufferError>;

    /// 归还一个句柄。缓冲不属于本池时仍会归还到其所属池，并返回错误提示误用。
    fn release(&self, buffer: PooledBuffer) -> Result<(), BufferError>;

    /// 缓冲当前的负载长度，不获取块锁。不属于本池的缓冲返回其自身长度。
    fn get_size(&self, buffer: &PooledBuffer) -> usize;

    fn set_size(&self, buffer: &PooledBuffer, new_len: usize) -> Result<(), BufferError>;

    /// 空闲链表长度。
    fn available(&self) -> usize;

    /// 关闭池并释放空闲块，策略见 [`LeakPolicy`](crate::LeakPolicy)。
    fn free(&self) -> Result<(), BufferError>;

    fn stats(&self) -> PoolStats;

    /// 替换水位回调；`None` 恢复为空操作。
    fn set_watermark_callback(&self, callback: Option<WatermarkCallback>);
}

impl<S: BlockSource> BufferFactory for BufferPool<S> {
    fn name(&self) -> &str {
        self.label()
    }

    fn kind(&self) -> PoolKind {
        S::KIND
    }

    fn alloc(&self, original: Option<&PooledBuffer>) -> Result<PooledBuffer, BufferError> {
        match original {
            Some(original) => {
                self.owns(original)?;
                Ok(original.clone())
            }
            None => self.acquire(),
        }
    }

    fn release(&self, buffer: PooledBuffer) -> Result<(), BufferError> {
        let owned = self.owns(&buffer);
        drop(buffer);
        owned
    }

    fn get_size(&self, buffer: &PooledBuffer) -> usize {
        match self.owns(buffer) {
            Ok(()) => self.strategy().size_of(buffer, self.item_size()),
            Err(_) => buffer.len(),
        }
    }

    fn set_size(&self, buffer: &PooledBuffer, new_len: usize) -> Result<(), BufferError> {
        self.owns(buffer)?;
        buffer.set_size(new_len)
    }

    fn available(&self) -> usize {
        self.free_count()
    }

    fn free(&self) -> Result<(), BufferError> {
        self.close()
    }

    fn stats(&self) -> PoolStats {
        self.snapshot()
    }

    fn set_watermark_callback(&self, callback: Option<WatermarkCallback>) {
        self.replace_callback(callback);
    }
}

impl<S: BlockSource> BufferPool<S> {
    /// 转为共享的工厂对象。
    pub fn into_factory(self) -> Arc<dyn BufferFactory> {
        Arc::new(self)
    }
}

/// 申请一块缓冲并调整为 `len` 字节。
///
/// 任一步失败都会归还已取得的缓冲并返回 `None`，因此在固定块池上总是返回 `None`。
pub fn new_buffer(factory: &dyn BufferFactory, len: usize) -> Option<PooledBuffer> {
    let buffer = match factory.alloc(None) {
        Ok(buffer) => buffer,
        Err(err) => {
            debug!(pool = factory.name(), error = %err, "new_buffer: allocation failed");
            return None;
        }
    };
    match factory.set_size(&buffer, len) {
        Ok(()) => Some(buffer),
        Err(err) => {
            debug!(pool = factory.name(), len, error = %err, "new_buffer: sizing failed");
            let _ = factory.release(buffer);
            None
        }
    }
}

/// 按配置创建对应策略的池。
pub fn create_factory(settings: &PoolSettings) -> Result<Arc<dyn BufferFactory>, BufferError> {
    let factory = match settings.kind {
        PoolKind::Dynamic => {
            DynamicPool::create(settings.name.clone(), settings.item_size, settings.pool.clone())?
                .into_factory()
        }
        PoolKind::Fixed => {
            FixedPool::create(settings.name.clone(), settings.item_size, settings.pool.clone())?
                .into_factory()
        }
    };
    Ok(factory)
}
