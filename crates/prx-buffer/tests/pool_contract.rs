//! `pool_contract` 集成测试：从公开 API 视角验证池的生命周期契约。
//!
//! # 测试目标（Why）
//! - 借出、retain、归还与扩容的组合必须保持“空闲当且仅当引用计数为 0”；
//! - 调整尺寸失败、固定块池拒绝调整尺寸时，缓冲必须保持原样且仍处于借出状态；
//! - 泄漏策略与关闭后的行为需要对调用方可预测。
//!
//! # 结构安排（How）
//! - 端到端场景：动态池扩容、固定块池容量上限；
//! - `proptest` 随机驱动 retain/release 序列，对照槽位状态；
//! - 注入会失败的分配器覆盖错误路径。

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use bytes::BytesMut;
use prx_buffer::{
    AllocError, Allocator, BufferError, BufferFactory, DynamicPool, FixedPool, LeakPolicy,
    PoolConfig, PoolPhase, SlotState, SystemAllocator, new_buffer,
};
use proptest::prelude::*;

/// 只允许不超过 `limit` 字节的块，用来模拟内存紧张。
struct CappedAllocator {
    limit: usize,
}

impl Allocator for CappedAllocator {
    fn allocate(&self, len: usize) -> Result<BytesMut, AllocError> {
        if len > self.limit {
            return Err(AllocError::new(len));
        }
        SystemAllocator.allocate(len)
    }

    fn reallocate(&self, block: &mut BytesMut, new_len: usize) -> Result<(), AllocError> {
        if new_len > self.limit {
            return Err(AllocError::new(new_len));
        }
        SystemAllocator.reallocate(block, new_len)
    }
}

/// 只允许固定次数的 `allocate`，用来让一次扩容中途失败。
struct BudgetedAllocator {
    remaining: AtomicUsize,
}

impl BudgetedAllocator {
    fn new(budget: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(budget),
        }
    }
}

impl Allocator for BudgetedAllocator {
    fn allocate(&self, len: usize) -> Result<BytesMut, AllocError> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map_err(|_| AllocError::new(len))?;
        SystemAllocator.allocate(len)
    }

    fn reallocate(&self, block: &mut BytesMut, new_len: usize) -> Result<(), AllocError> {
        SystemAllocator.reallocate(block, new_len)
    }
}

/// 动态池：4 个耗尽后扩容一批，归还全部后空闲数为 8。
#[test]
fn dynamic_pool_grows_by_initial_count() {
    let pool = DynamicPool::create("scenario-1", 64, PoolConfig::default().with_initial_count(4))
        .expect("创建动态池失败");
    assert_eq!(pool.available(), 4);

    let mut held: Vec<_> = (0..4).map(|_| pool.alloc(None).expect("前 4 次分配")).collect();
    held.push(pool.alloc(None).expect("扩容后的第 5 次分配"));
    assert!(held.iter().all(|buffer| pool.get_size(buffer) == 64));

    drop(held);
    assert_eq!(pool.available(), 8);

    let stats = pool.stats();
    assert_eq!(stats.total_buffers, 8);
    assert_eq!(stats.active_leases, 0);
    assert_eq!(stats.grow_events, 2);
    assert_eq!(stats.allocated_bytes, 8 * 64);
}

/// 一次扩容只造出部分缓冲时仍算成功，新增的缓冲立即可用。
#[test]
fn partial_growth_is_success() {
    let pool = DynamicPool::builder("budgeted", 64)
        .config(PoolConfig::default().with_initial_count(4))
        .allocator(Arc::new(BudgetedAllocator::new(6)))
        .build()
        .expect("创建动态池失败");

    let mut held: Vec<_> = (0..4).map(|_| pool.alloc(None).expect("前 4 次分配")).collect();
    let stats = pool.stats();
    assert_eq!(stats.total_buffers, 6);
    assert_eq!(stats.grow_events, 2);
    assert_eq!(pool.available(), 2);

    held.push(pool.alloc(None).expect("部分扩容后的分配"));
    assert_eq!(pool.available(), 1);
    drop(held);
    assert_eq!(pool.available(), 6);
}

/// 持有负载守卫时查询长度不得阻塞：长度记录在块锁之外。
#[test]
fn get_size_does_not_wait_for_payload_guard() {
    let (done, finished) = mpsc::channel();
    thread::spawn(move || {
        let dynamic = DynamicPool::create("guarded", 48, PoolConfig::default().with_initial_count(1))
            .expect("创建动态池失败");
        let fixed = FixedPool::create("guarded-fixed", 24, PoolConfig::default().with_initial_count(1))
            .expect("创建固定块池失败");
        let grown = dynamic.alloc(None).expect("分配");
        let carved = fixed.alloc(None).expect("分配");

        let mut guard = grown.lock();
        guard[0] = 1;
        let sizes = (dynamic.get_size(&grown), grown.len(), format!("{grown:?}"));
        drop(guard);

        let guard = carved.lock();
        let fixed_size = fixed.get_size(&carved);
        drop(guard);

        let _ = done.send((sizes, fixed_size));
    });

    let ((dynamic_size, len, debug), fixed_size) = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("持有守卫时查询长度被阻塞");
    assert_eq!((dynamic_size, len), (48, 48));
    assert!(debug.contains("len: 48"), "{debug}");
    assert_eq!(fixed_size, 24);
}

/// 调整尺寸成功后长度立即可见。
#[test]
fn resize_updates_reported_length() {
    let pool = DynamicPool::create("resized", 16, PoolConfig::default().with_initial_count(1))
        .expect("创建动态池失败");
    let buffer = pool.alloc(None).expect("分配");
    pool.set_size(&buffer, 40).expect("扩大");
    assert_eq!((pool.get_size(&buffer), buffer.len()), (40, 40));
    pool.set_size(&buffer, 8).expect("缩小");
    assert_eq!((pool.get_size(&buffer), buffer.lock().len()), (8, 8));
}

/// 固定块池：达到 `max_count` 后第三次分配失败，归还后再次分配仍落在同一 slab。
#[test]
fn fixed_pool_respects_max_count() {
    let pool = FixedPool::create(
        "scenario-3",
        32,
        PoolConfig::default().with_initial_count(2).with_max_count(2),
    )
    .expect("创建固定块池失败");

    let first = pool.alloc(None).expect("第一次分配");
    let second = pool.alloc(None).expect("第二次分配");
    assert!(matches!(
        pool.alloc(None),
        Err(BufferError::OutOfMemory { .. })
    ));
    assert_eq!(pool.stats().failed_acquisitions, 1);

    drop(first);
    let third = pool.alloc(None).expect("归还后再次分配");
    assert_eq!(pool.slab_count(), 1);
    assert_eq!(pool.slab_of(&third), Some(0));
    assert_eq!(pool.slab_of(&second), Some(0));
    assert_eq!(pool.get_size(&third), 32);
}

#[test]
fn fixed_pool_rejects_resize_and_keeps_content() {
    let pool = FixedPool::create(
        "fixed-resize",
        16,
        PoolConfig::default().with_initial_count(2).with_max_count(2),
    )
    .expect("创建固定块池失败");
    let buffer = pool.alloc(None).expect("分配");
    buffer.write_at(0, b"fixed").expect("写入");

    assert!(matches!(
        pool.set_size(&buffer, 64),
        Err(BufferError::NotSupported { operation: "set_size", .. })
    ));
    assert_eq!(buffer.len(), 16);
    assert_eq!(&buffer.to_vec()[..5], b"fixed");
    assert!(new_buffer(&pool, 16).is_none());
    assert_eq!(pool.available(), 1);
}

/// 调整尺寸失败后缓冲仍处于借出状态，长度与内容不变，之后可以正常归还。
#[test]
fn failed_resize_preserves_buffer() {
    let pool = DynamicPool::builder("capped", 64)
        .config(PoolConfig::default().with_initial_count(2))
        .allocator(Arc::new(CappedAllocator { limit: 256 }))
        .build()
        .expect("创建动态池失败");

    let buffer = pool.alloc(None).expect("分配");
    buffer.write_at(60, b"tail").expect("写入");
    let err = pool.set_size(&buffer, 4096).expect_err("超过上限必须失败");
    assert!(matches!(err, BufferError::OutOfMemory { .. }));

    assert_eq!(buffer.len(), 64);
    assert_eq!(&buffer.to_vec()[60..], b"tail");
    assert_eq!(pool.slot_state(buffer.slot()), Some(SlotState::CheckedOut));

    pool.set_size(&buffer, 128).expect("上限内扩大");
    assert_eq!(pool.get_size(&buffer), 128);
    assert_eq!(&buffer.to_vec()[60..64], b"tail");

    let slot = buffer.slot();
    pool.release(buffer).expect("归还");
    assert_eq!(pool.slot_state(slot), Some(SlotState::Free));
    assert_eq!(pool.available(), 2);
}

#[test]
fn zero_length_resize_is_invalid() {
    let pool = DynamicPool::create("zero", 8, PoolConfig::default()).expect("创建动态池失败");
    let buffer = pool.alloc(None).expect("分配");
    assert!(matches!(
        pool.set_size(&buffer, 0),
        Err(BufferError::InvalidArgument { .. })
    ));
    assert_eq!(buffer.len(), 8);
}

#[test]
fn construction_fails_when_first_grow_fails() {
    let err = DynamicPool::builder("starved", 512)
        .allocator(Arc::new(CappedAllocator { limit: 64 }))
        .build()
        .expect_err("首次扩容失败时构造必须失败");
    assert!(matches!(err, BufferError::OutOfMemory { .. }));

    assert!(matches!(
        FixedPool::create("empty-item", 0, PoolConfig::default()),
        Err(BufferError::InvalidArgument { .. })
    ));
}

#[test]
fn new_buffer_sizes_dynamic_buffers() {
    let pool = DynamicPool::create("sized", 32, PoolConfig::default().with_initial_count(1))
        .expect("创建动态池失败");
    let buffer = new_buffer(&pool, 1500).expect("动态池支持调整尺寸");
    assert_eq!(pool.get_size(&buffer), 1500);
    assert!(new_buffer(&pool, 0).is_none());
}

/// 存在未归还缓冲时 `free` 报告泄漏且池保持可用；全部归还后才真正关闭。
#[test]
fn free_reports_leaks_and_stays_active() {
    let pool = DynamicPool::create("leaky", 16, PoolConfig::default().with_initial_count(2))
        .expect("创建动态池失败");
    let held = pool.alloc(None).expect("分配");

    assert_eq!(
        pool.free(),
        Err(BufferError::Leaked {
            pool: "leaky".into(),
            outstanding: 1,
        })
    );
    assert_eq!(pool.stats().phase, PoolPhase::Active);
    let extra = pool.alloc(None).expect("泄漏报告后仍可分配");

    drop(held);
    drop(extra);
    pool.free().expect("全部归还后关闭");
    assert_eq!(pool.stats().phase, PoolPhase::Closed);
    assert_eq!(pool.available(), 0);
    assert!(matches!(pool.alloc(None), Err(BufferError::Closed { .. })));
    pool.free().expect("重复关闭是空操作");
}

#[test]
#[should_panic(expected = "checked out")]
fn panic_policy_aborts_on_leak() {
    let pool = FixedPool::create(
        "strict",
        16,
        PoolConfig::default().with_leak_policy(LeakPolicy::Panic),
    )
    .expect("创建固定块池失败");
    let _held = pool.alloc(None).expect("分配");
    let _ = pool.free();
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Retain,
    Release,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Retain), Just(Op::Release)]
}

proptest! {
    /// 单槽位池上任意 retain/release 序列：空闲当且仅当净引用计数为 0。
    #[test]
    fn slot_is_free_iff_refcount_is_zero(ops in proptest::collection::vec(op(), 1..64)) {
        let pool = DynamicPool::create(
            "refcount",
            8,
            PoolConfig::default().with_initial_count(1).with_max_count(1),
        )
        .expect("创建动态池失败");
        let mut handles = Vec::new();

        for op in ops {
            match op {
                Op::Retain => {
                    let next = match handles.first() {
                        Some(original) => pool.alloc(Some(original)),
                        None => pool.alloc(None),
                    }
                    .expect("单槽位空闲时分配必须成功");
                    handles.push(next);
                }
                Op::Release => {
                    if let Some(handle) = handles.pop() {
                        pool.release(handle).expect("归还");
                    }
                }
            }

            let expected = if handles.is_empty() { SlotState::Free } else { SlotState::CheckedOut };
            prop_assert_eq!(pool.slot_state(0), Some(expected));
            prop_assert_eq!(pool.available(), usize::from(handles.is_empty()));
            if let Some(first) = handles.first() {
                prop_assert_eq!(first.ref_count(), handles.len());
            }
        }
    }
}
