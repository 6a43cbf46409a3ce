use std::{
    fmt, mem,
    ops::{Deref, DerefMut},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use bytes::BytesMut;
use spin::{Mutex, MutexGuard};

use crate::error::BufferError;

/// 缓冲池实例的唯一标识，用于识别跨池误用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// `BufferRecycler` 描述缓冲池在租借结束时的回收入口。
///
/// # 设计初衷（Why）
/// - 引用计数归零时必须把块内存放回所属池的空闲链表，
///   把这一动作放在 [`PooledBuffer`] 的 `Drop` 中，调用方就不可能重复归还或遗忘归还。
///
/// # 契约定义（What）
/// - `reclaim` 对每个租约恰好调用一次，发生在最后一个持有者释放时；
/// - `resize` 失败时必须保持 `block` 原样；
/// - 实现必须线程安全且不得 panic，`Drop` 路径上的 panic 会导致进程中止。
pub trait BufferRecycler: Send + Sync + 'static {
    /// 所属池的标识。
    fn pool_id(&self) -> PoolId;

    /// 归还引用计数归零的块。
    fn reclaim(&self, reclaimed: ReclaimedBuffer);

    /// 将块调整为 `new_len` 字节。
    fn resize(&self, block: &mut BytesMut, new_len: usize) -> Result<(), BufferError>;
}

/// 一次回收携带的上下文：槽位编号与块内存。
#[derive(Debug)]
pub struct ReclaimedBuffer {
    slot: usize,
    block: BytesMut,
}

impl ReclaimedBuffer {
    pub fn new(slot: usize, block: BytesMut) -> Self {
        Self { slot, block }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// 消耗结构，返回槽位与块内存。
    pub fn into_parts(self) -> (usize, BytesMut) {
        (self.slot, self.block)
    }
}

/// `Lease` 追踪一次租借，在最后一个持有者释放时触发回收。
///
/// # 结构设计（How）
/// - `Arc<Lease>` 的强引用计数即缓冲的引用计数：克隆句柄即 retain，丢弃句柄即 release；
/// - 计数由 1 变 0 时 `Drop` 取出块并交给 `recycler.reclaim`，
///   空闲链表的插入在池锁内完成，与计数变化保持原子的先后关系；
/// - `len` 在块锁之外记录负载长度，只在持有块锁并且调整尺寸成功后写入。
struct Lease {
    slot: usize,
    len: AtomicUsize,
    block: Mutex<BytesMut>,
    recycler: Arc<dyn BufferRecycler>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let block = mem::take(self.block.get_mut());
        self.recycler
            .reclaim(ReclaimedBuffer::new(self.slot, block));
    }
}

/// `PooledBuffer` 是从缓冲池借出的引用计数句柄。
///
/// # 设计动机（Why）
/// - 调用方只看到负载，池的簿记（槽位、空闲链表、水位）全部隐藏在句柄之后；
/// - 共享所有权只能通过 `clone`（retain）获得，释放只能通过 `Drop`（release），
///   不存在重复释放或释放后继续使用的路径。
///
/// # 契约说明（What）
/// - 同一租约的所有克隆共享同一块内存，[`lock`](Self::lock) 在持有者之间互斥；
/// - [`set_size`](Self::set_size) 委派给所属池：动态池重新分配，固定池恒定返回
///   [`BufferError::NotSupported`]；
/// - 最后一个克隆被丢弃时，块恰好归还一次。
#[derive(Clone)]
pub struct PooledBuffer {
    lease: Arc<Lease>,
}

impl PooledBuffer {
    /// 使用给定的块与回收句柄创建缓冲，初始引用计数为 1。
    pub fn new(slot: usize, block: BytesMut, recycler: Arc<dyn BufferRecycler>) -> Self {
        Self {
            lease: Arc::new(Lease {
                slot,
                len: AtomicUsize::new(block.len()),
                block: Mutex::new(block),
                recycler,
            }),
        }
    }

    /// 所属池内的槽位编号。
    pub fn slot(&self) -> usize {
        self.lease.slot
    }

    pub fn pool_id(&self) -> PoolId {
        self.lease.recycler.pool_id()
    }

    /// 当前引用计数（持有者数量）。
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.lease)
    }

    /// 两个句柄是否指向同一次租借。
    pub fn same_lease(&self, other: &PooledBuffer) -> bool {
        Arc::ptr_eq(&self.lease, &other.lease)
    }

    /// 负载长度，不获取块锁，持有 [`BufferGuard`] 时也可以调用。
    pub fn len(&self) -> usize {
        self.lease.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获得负载的独占访问。
    ///
    /// 块锁不可重入：持有守卫期间，同一线程不得在该缓冲上调用
    /// [`lock`](Self::lock)、[`to_vec`](Self::to_vec)、[`write_at`](Self::write_at)
    /// 或 [`set_size`](Self::set_size)。
    pub fn lock(&self) -> BufferGuard<'_> {
        BufferGuard {
            inner: self.lease.block.lock(),
        }
    }

    /// 复制负载内容。
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().to_vec()
    }

    /// 从 `offset` 起写入 `src`。
    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<(), BufferError> {
        let mut guard = self.lock();
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= guard.len())
            .ok_or_else(|| {
                BufferError::invalid_argument(format!(
                    "write of {} bytes at offset {offset} exceeds buffer length {}",
                    src.len(),
                    guard.len()
                ))
            })?;
        guard[offset..end].copy_from_slice(src);
        Ok(())
    }

    /// 调整负载长度；失败时缓冲保持原有长度与内容。
    pub fn set_size(&self, new_len: usize) -> Result<(), BufferError> {
        let mut block = self.lease.block.lock();
        self.lease.recycler.resize(&mut block, new_len)?;
        self.lease.len.store(block.len(), Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("pool", &self.pool_id())
            .field("slot", &self.slot())
            .field("len", &self.len())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// 负载的独占视图，解引用为字节切片。长度只能通过 [`PooledBuffer::set_size`] 改变。
pub struct BufferGuard<'a> {
    inner: MutexGuard<'a, BytesMut>,
}

impl Deref for BufferGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner[..]
    }
}

impl DerefMut for BufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.inner[..]
    }
}
