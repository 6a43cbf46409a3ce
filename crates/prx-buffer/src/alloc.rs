//! 内存分配接缝。
//!
//! 池只通过 [`Allocator`] 获取与调整块内存，测试可以注入会失败的分配器来覆盖
//! 扩容失败、调整尺寸失败等路径。默认实现 [`SystemAllocator`] 使用
//! `Vec::try_reserve_exact`，分配失败时返回错误而不是中止进程。

use bytes::{Bytes, BytesMut};

use crate::error::AllocError;

/// 块内存分配器。
///
/// # 契约说明（What）
/// - `allocate` 返回长度恰为 `len` 的零填充块；
/// - `reallocate` 成功时 `block` 的长度变为 `new_len` 且保留原有前缀；
///   失败时 `block` 必须保持原样，池依赖这一点保证调整尺寸失败后缓冲仍可用。
pub trait Allocator: Send + Sync + 'static {
    fn allocate(&self, len: usize) -> Result<BytesMut, AllocError>;

    fn reallocate(&self, block: &mut BytesMut, new_len: usize) -> Result<(), AllocError>;
}

/// 基于全局分配器的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Result<BytesMut, AllocError> {
        let mut raw = Vec::new();
        raw.try_reserve_exact(len)
            .map_err(|_| AllocError::new(len))?;
        raw.resize(len, 0);
        Ok(into_bytes_mut(raw))
    }

    fn reallocate(&self, block: &mut BytesMut, new_len: usize) -> Result<(), AllocError> {
        if new_len <= block.len() {
            block.truncate(new_len);
            return Ok(());
        }
        let mut raw = Vec::new();
        raw.try_reserve_exact(new_len)
            .map_err(|_| AllocError::new(new_len))?;
        raw.extend_from_slice(&block[..]);
        raw.resize(new_len, 0);
        *block = into_bytes_mut(raw);
        Ok(())
    }
}

/// 把独占的 `Vec<u8>` 转为 `BytesMut`；唯一持有时不复制。
fn into_bytes_mut(raw: Vec<u8>) -> BytesMut {
    Bytes::from(raw)
        .try_into_mut()
        .unwrap_or_else(|shared| BytesMut::from(&shared[..]))
}
