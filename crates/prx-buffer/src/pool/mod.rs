//! 缓冲池核心。
//!
//! # 模块角色（Why）
//! - 统一维护缓冲生命周期：空闲链表、借出计数、水位标记与用户回调；
//! - 具体策略（[`DynamicStrategy`]、[`FixedStrategy`]）只回答“如何再造一批块”以及
//!   “能否调整尺寸”，其余状态机全部在这里。
//!
//! # 核心机制（How）
//! - 槽位数组 + 下标空闲链表取代侵入式双向链表：`slots[i]` 记录槽位状态，
//!   空闲链表持有空闲块的所有权，借出块的所有权转移到 [`PooledBuffer`] 的租约中；
//! - 单把 `spin::Mutex` 保护空闲链表、槽位状态、计数与水位标记；
//! - 水位跨越在锁内判定、锁外回调；日志同样在解锁后输出。
//!
//! # 契约说明（What）
//! - 槽位空闲当且仅当其引用计数为 0，借出当且仅当引用计数 >= 1；
//! - 低水位回调在空闲数降到 `low_watermark` 及以下时触发一次，
//!   直到空闲数回升到 `high_watermark` 以上触发恢复回调之前不会再次触发。

mod dynamic;
mod fixed;

use std::{
    collections::VecDeque,
    marker::PhantomData,
    mem,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use arc_swap::ArcSwap;
use bytes::BytesMut;
use spin::Mutex;
use tracing::{debug, warn};

pub use dynamic::DynamicStrategy;
pub use fixed::FixedStrategy;

use crate::{
    alloc::{Allocator, SystemAllocator},
    config::{LeakPolicy, PoolConfig, PoolKind},
    error::BufferError,
    pooled_buffer::{BufferRecycler, PoolId, PooledBuffer, ReclaimedBuffer},
    sealed::Sealed,
    watermark::{Watermark, WatermarkCallback, WatermarkHook},
};

/// 动态池：每个缓冲独立分配，可调整尺寸。
pub type DynamicPool = BufferPool<DynamicStrategy>;

/// 固定块池：缓冲从连续 slab 切分，尺寸恒定。
pub type FixedPool = BufferPool<FixedStrategy>;

/// 池的扩容与调整尺寸策略。仅由本 crate 实现。
pub trait BlockSource: Sealed + Send + Sync + 'static {
    /// 策略对应的池类型。
    const KIND: PoolKind;

    #[doc(hidden)]
    fn with_allocator(allocator: Arc<dyn Allocator>) -> Self;

    /// 新建至多 `count` 个 `item_size` 字节的块；一个都造不出来时返回错误。
    #[doc(hidden)]
    fn grow(&self, pool: &str, item_size: usize, count: usize) -> Result<Vec<BytesMut>, BufferError>;

    #[doc(hidden)]
    fn resize(&self, pool: &str, block: &mut BytesMut, new_len: usize) -> Result<(), BufferError>;

    /// `get_size` 的结果。
    #[doc(hidden)]
    fn size_of(&self, buffer: &PooledBuffer, item_size: usize) -> usize;

    /// 池关闭后释放策略自身持有的簿记。
    #[doc(hidden)]
    fn release_all(&self);
}

/// 槽位状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// 位于空闲链表，引用计数为 0。
    Free,
    /// 已借出，引用计数 >= 1。
    CheckedOut,
}

/// 池生命周期。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolPhase {
    Active,
    Closed,
}

/// 缓冲池统计快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    pub kind: PoolKind,
    pub item_size: usize,
    /// 已创建的缓冲总数。
    pub total_buffers: usize,
    /// 空闲链表长度。
    pub available_buffers: usize,
    /// 借出的缓冲数。
    pub active_leases: usize,
    /// 池持有的块内存字节数（含借出部分）。
    pub allocated_bytes: usize,
    /// 因空闲链表为空而失败的分配次数。
    pub failed_acquisitions: u64,
    /// 成功扩容的次数（含创建时的首次扩容）。
    pub grow_events: u64,
    /// 低水位标记是否处于置位状态。
    pub low_watermark_engaged: bool,
    pub phase: PoolPhase,
}

struct FreeSlot {
    slot: usize,
    block: BytesMut,
}

struct PoolState {
    slots: Vec<SlotState>,
    free: VecDeque<FreeSlot>,
    checked_out: usize,
    low_engaged: bool,
    phase: PoolPhase,
}

#[derive(Default)]
struct PoolMetrics {
    allocated_bytes: AtomicUsize,
    failed_acquisitions: AtomicU64,
    grow_events: AtomicU64,
}

impl PoolMetrics {
    fn increase_allocated(&self, bytes: usize) {
        self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn decrease_allocated(&self, bytes: usize) {
        saturating_sub(&self.allocated_bytes, bytes);
    }

    fn record_failure(&self) {
        self.failed_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_grow(&self) {
        self.grow_events.fetch_add(1, Ordering::Relaxed);
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}

/// 一次扩容的结果，解锁后用于记录日志。
enum GrowOutcome {
    Grown { added: usize, total: usize },
    /// 已达到 `max_count`。
    Capped(BufferError),
    Failed(BufferError),
}

struct PoolCore<S> {
    id: PoolId,
    name: String,
    item_size: usize,
    config: PoolConfig,
    strategy: S,
    hook: ArcSwap<WatermarkHook>,
    state: Mutex<PoolState>,
    metrics: PoolMetrics,
}

impl<S: BlockSource> PoolCore<S> {
    fn new(
        name: String,
        item_size: usize,
        config: PoolConfig,
        strategy: S,
        callback: Option<WatermarkCallback>,
    ) -> Self {
        Self {
            id: PoolId::next(),
            name,
            item_size,
            config,
            strategy,
            hook: ArcSwap::from_pointee(WatermarkHook::new(callback)),
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                free: VecDeque::new(),
                checked_out: 0,
                low_engaged: false,
                phase: PoolPhase::Active,
            }),
            metrics: PoolMetrics::default(),
        }
    }

    /// 在持锁状态下扩容，新块追加到空闲链表尾部。
    fn grow_locked(&self, state: &mut PoolState) -> GrowOutcome {
        let total = state.slots.len();
        let remaining = self
            .config
            .max_count
            .map_or(usize::MAX, |max| max.saturating_sub(total));
        let count = self.config.initial_count.min(remaining);
        if count == 0 {
            return GrowOutcome::Capped(BufferError::out_of_memory(
                &self.name,
                format!("max_count {total} reached"),
            ));
        }
        let blocks = match self.strategy.grow(&self.name, self.item_size, count) {
            Ok(blocks) => blocks,
            Err(err) => return GrowOutcome::Failed(err),
        };
        let added = blocks.len();
        let mut bytes = 0;
        for block in blocks {
            bytes += block.len();
            let slot = state.slots.len();
            state.slots.push(SlotState::Free);
            state.free.push_back(FreeSlot { slot, block });
        }
        self.metrics.increase_allocated(bytes);
        self.metrics.record_grow();
        GrowOutcome::Grown {
            added,
            total: state.slots.len(),
        }
    }

    fn log_grow(&self, outcome: &GrowOutcome) {
        match outcome {
            GrowOutcome::Grown { added, total } => {
                debug!(pool = %self.name, added, total, "buffer pool grown");
            }
            GrowOutcome::Capped(err) => {
                debug!(pool = %self.name, error = %err, "buffer pool at capacity");
            }
            GrowOutcome::Failed(err) => {
                warn!(pool = %self.name, error = %err, "buffer pool could not grow");
            }
        }
    }

    /// 首次扩容，失败即构造失败。
    fn prime(&self) -> Result<(), BufferError> {
        let outcome = {
            let mut state = self.state.lock();
            self.grow_locked(&mut state)
        };
        self.log_grow(&outcome);
        match outcome {
            GrowOutcome::Grown { .. } => Ok(()),
            GrowOutcome::Capped(err) | GrowOutcome::Failed(err) => Err(err),
        }
    }

    fn fire(&self, mark: Watermark) {
        debug!(pool = %self.name, watermark = ?mark, "buffer pool watermark crossed");
        self.hook.load().fire(mark);
    }

    fn acquire(self: &Arc<Self>) -> Result<PooledBuffer, BufferError> {
        let mut grow = None;
        let mut crossing = None;
        let taken = {
            let mut state = self.state.lock();
            if state.phase == PoolPhase::Closed {
                return Err(BufferError::Closed {
                    pool: self.name.clone(),
                });
            }
            match state.free.pop_front() {
                None => None,
                Some(FreeSlot { slot, block }) => {
                    if state.free.is_empty() {
                        grow = Some(self.grow_locked(&mut state));
                    }
                    if state.free.len() <= self.config.low_watermark && !state.low_engaged {
                        state.low_engaged = true;
                        crossing = Some(Watermark::Low);
                    }
                    state.slots[slot] = SlotState::CheckedOut;
                    state.checked_out += 1;
                    Some((slot, block))
                }
            }
        };

        if let Some(outcome) = &grow {
            self.log_grow(outcome);
        }
        let Some((slot, block)) = taken else {
            self.metrics.record_failure();
            debug!(pool = %self.name, "buffer pool exhausted");
            return Err(BufferError::out_of_memory(&self.name, "free list is empty"));
        };
        if let Some(mark) = crossing {
            self.fire(mark);
        }
        let recycler: Arc<dyn BufferRecycler> = self.clone();
        Ok(PooledBuffer::new(slot, block, recycler))
    }

    fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.state.lock().slots.get(slot).copied()
    }

    fn close(&self) -> Result<(), BufferError> {
        let drained = {
            let mut state = self.state.lock();
            match (state.phase, state.checked_out) {
                (PoolPhase::Closed, _) => return Ok(()),
                (PoolPhase::Active, 0) => {
                    state.phase = PoolPhase::Closed;
                    state.low_engaged = false;
                    mem::take(&mut state.free)
                }
                (PoolPhase::Active, outstanding) => {
                    drop(state);
                    warn!(pool = %self.name, outstanding, "buffer pool freed with buffers checked out");
                    if self.config.leak_policy == LeakPolicy::Panic {
                        panic!(
                            "buffer pool `{}` freed with {outstanding} buffer(s) checked out",
                            self.name
                        );
                    }
                    return Err(BufferError::Leaked {
                        pool: self.name.clone(),
                        outstanding,
                    });
                }
            }
        };
        let released: usize = drained.iter().map(|free| free.block.len()).sum();
        drop(drained);
        self.strategy.release_all();
        self.metrics.decrease_allocated(released);
        self.hook.store(Arc::new(WatermarkHook::default()));
        debug!(pool = %self.name, released, "buffer pool freed");
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        let (total_buffers, available_buffers, active_leases, low_watermark_engaged, phase) = {
            let state = self.state.lock();
            (
                state.slots.len(),
                state.free.len(),
                state.checked_out,
                state.low_engaged,
                state.phase,
            )
        };
        PoolStats {
            name: self.name.clone(),
            kind: S::KIND,
            item_size: self.item_size,
            total_buffers,
            available_buffers,
            active_leases,
            allocated_bytes: self.metrics.allocated_bytes.load(Ordering::Relaxed),
            failed_acquisitions: self.metrics.failed_acquisitions.load(Ordering::Relaxed),
            grow_events: self.metrics.grow_events.load(Ordering::Relaxed),
            low_watermark_engaged,
            phase,
        }
    }
}

impl<S: BlockSource> BufferRecycler for PoolCore<S> {
    fn pool_id(&self) -> PoolId {
        self.id
    }

    fn reclaim(&self, reclaimed: ReclaimedBuffer) {
        let (slot, block) = reclaimed.into_parts();
        let crossing = {
            let mut state = self.state.lock();
            debug_assert_eq!(state.slots.get(slot), Some(&SlotState::CheckedOut));
            state.slots[slot] = SlotState::Free;
            state.checked_out -= 1;
            state.free.push_back(FreeSlot { slot, block });
            if state.free.len() > self.config.high_watermark && state.low_engaged {
                state.low_engaged = false;
                Some(Watermark::High)
            } else {
                None
            }
        };
        if let Some(mark) = crossing {
            self.fire(mark);
        }
    }

    fn resize(&self, block: &mut BytesMut, new_len: usize) -> Result<(), BufferError> {
        let before = block.len();
        self.strategy.resize(&self.name, block, new_len)?;
        let after = block.len();
        if after > before {
            self.metrics.increase_allocated(after - before);
        } else {
            self.metrics.decrease_allocated(before - after);
        }
        Ok(())
    }
}

/// 通用缓冲池句柄，克隆后共享同一个池。
///
/// 通过 [`DynamicPool`] / [`FixedPool`] 别名使用；统一的操作面见
/// [`BufferFactory`](crate::BufferFactory)。
pub struct BufferPool<S> {
    core: Arc<PoolCore<S>>,
}

impl<S> std::fmt::Debug for BufferPool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("item_size", &self.core.item_size)
            .finish_non_exhaustive()
    }
}

impl<S> Clone for BufferPool<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S: BlockSource> BufferPool<S> {
    /// 以默认分配器创建池，并完成首次扩容。
    pub fn create(
        name: impl Into<String>,
        item_size: usize,
        config: PoolConfig,
    ) -> Result<Self, BufferError> {
        Self::builder(name, item_size).config(config).build()
    }

    pub fn builder(name: impl Into<String>, item_size: usize) -> PoolBuilder<S> {
        PoolBuilder {
            name: name.into(),
            item_size,
            config: PoolConfig::default(),
            allocator: Arc::new(SystemAllocator),
            callback: None,
            _strategy: PhantomData,
        }
    }

    pub fn id(&self) -> PoolId {
        self.core.id
    }

    /// 规范化后的配置。
    pub fn config(&self) -> &PoolConfig {
        &self.core.config
    }

    /// 槽位当前状态；越界返回 `None`。
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.core.slot_state(slot)
    }

    pub(crate) fn owns(&self, buffer: &PooledBuffer) -> Result<(), BufferError> {
        if buffer.pool_id() == self.core.id {
            Ok(())
        } else {
            Err(BufferError::invalid_argument(format!(
                "buffer from {} handed to pool `{}`",
                buffer.pool_id(),
                self.core.name
            )))
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.core.name
    }

    pub(crate) fn item_size(&self) -> usize {
        self.core.item_size
    }

    pub(crate) fn strategy(&self) -> &S {
        &self.core.strategy
    }

    pub(crate) fn acquire(&self) -> Result<PooledBuffer, BufferError> {
        self.core.acquire()
    }

    pub(crate) fn free_count(&self) -> usize {
        self.core.available()
    }

    pub(crate) fn close(&self) -> Result<(), BufferError> {
        self.core.close()
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        self.core.stats()
    }

    pub(crate) fn replace_callback(&self, callback: Option<WatermarkCallback>) {
        self.core.hook.store(Arc::new(WatermarkHook::new(callback)));
    }
}

/// 缓冲池构造器。
pub struct PoolBuilder<S> {
    name: String,
    item_size: usize,
    config: PoolConfig,
    allocator: Arc<dyn Allocator>,
    callback: Option<WatermarkCallback>,
    _strategy: PhantomData<fn() -> S>,
}

impl<S: BlockSource> PoolBuilder<S> {
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// 替换块内存分配器。
    pub fn allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// 注册水位回调。
    pub fn on_watermark(mut self, callback: impl Fn(Watermark) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// 校验配置、创建池并完成首次扩容。
    pub fn build(self) -> Result<BufferPool<S>, BufferError> {
        if self.item_size == 0 {
            return Err(BufferError::invalid_argument(format!(
                "pool `{}` must have a non-zero item_size",
                self.name
            )));
        }
        let config = self.config.normalized()?;
        let core = Arc::new(PoolCore::new(
            self.name,
            self.item_size,
            config,
            S::with_allocator(self.allocator),
            self.callback,
        ));
        core.prime()?;
        debug!(pool = %core.name, kind = ?S::KIND, item_size = core.item_size, "buffer pool created");
        Ok(BufferPool { core })
    }
}
