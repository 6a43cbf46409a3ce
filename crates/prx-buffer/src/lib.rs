#![deny(unsafe_code)]

//! `prx-buffer` 为边缘代理的 I/O 队列提供池化缓冲。
//!
//! # 模块定位（Why）
//! - 高频收发路径不能每个报文都走一次全局分配器，缓冲需要复用；
//! - 上游生产者需要在池即将耗尽时得到背压信号，而不是在分配失败后才发现。
//!
//! # 组成（How）
//! - [`pool`]：池核心状态机，以及两种策略 [`DynamicPool`]（独立分配、可调整尺寸）与
//!   [`FixedPool`]（slab 切分、尺寸恒定）；
//! - [`PooledBuffer`]：引用计数句柄，`Clone` 即 retain，`Drop` 即 release；
//! - [`BufferFactory`]：对象安全的统一操作面，配合 [`create_factory`] 由配置驱动；
//! - [`Watermark`]：低水位 / 恢复两种边沿事件，回调总在池锁之外执行。
//!
//! ```rust
//! use prx_buffer::{BufferFactory, DynamicPool, PoolConfig, new_buffer};
//!
//! let factory = DynamicPool::create("egress", 256, PoolConfig::default())
//!     .expect("pool")
//!     .into_factory();
//! let buffer = new_buffer(factory.as_ref(), 1500).expect("buffer");
//! assert_eq!(factory.get_size(&buffer), 1500);
//! drop(buffer);
//! factory.free().expect("no leaks");
//! ```

pub mod alloc;
pub mod config;
pub mod error;
pub mod factory;
pub mod pool;
pub mod pooled_buffer;
pub mod watermark;

pub use alloc::{Allocator, SystemAllocator};
pub use config::{DEFAULT_INITIAL_COUNT, LeakPolicy, PoolConfig, PoolKind, PoolSettings};
pub use error::{AllocError, BufferError, ConfigError};
pub use factory::{BufferFactory, create_factory, new_buffer};
pub use pool::{
    BlockSource, BufferPool, DynamicPool, DynamicStrategy, FixedPool, FixedStrategy, PoolBuilder,
    PoolPhase, PoolStats, SlotState,
};
pub use pooled_buffer::{BufferGuard, BufferRecycler, PoolId, PooledBuffer, ReclaimedBuffer};
pub use watermark::{Watermark, WatermarkCallback, signal_on_recovery};

mod sealed {
    pub trait Sealed {}
}
