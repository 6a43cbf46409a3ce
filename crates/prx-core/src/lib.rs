#![deny(unsafe_code)]

//! `prx-core` 汇集边缘代理 I/O 内核的叶子契约。
//!
//! # 模块定位（Why）
//! - [`error`] 定义跨 crate 共享的 [`CoreError`] 与稳定错误码，缓冲池与日志扇出的错误最终都汇入这里；
//! - [`ringbuf`] 提供固定容量、构造后零分配的环形字节缓冲，是日志流的存储介质；
//! - [`signal`] 提供手动/自动复位事件，承接缓冲池的背压回调。
//!
//! # 依赖关系（How）
//! - 本 crate 不依赖其它 prx crate；`prx-buffer` 与 `prx-log` 均建立在它之上。

pub mod error;
pub mod ringbuf;
pub mod signal;

pub use error::{CoreError, ErrorCategory, ErrorCause, Result};
pub use ringbuf::RingBuffer;
pub use signal::{Signal, SignalKind};
