#![deny(unsafe_code)]

//! `prx-log` 把进程内的 `tracing` 事件扇出到任意数量的日志流。
//!
//! # 模块定位（Why）
//! - 运维端需要在不重启代理的情况下“附着”到实时日志，订阅者可能很慢甚至暂停读取；
//! - 每个订阅者拥有独立的 [`RingBuffer`](prx_core::RingBuffer)，写满后丢弃新行并计数，
//!   生产者永远不会因为订阅者而阻塞。
//!
//! # 组成（How）
//! - [`LogHub`]：显式的扇出上下文，可克隆共享，没有全局单例；
//! - [`LogStream`]：订阅句柄，丢弃即退订；
//! - [`LogHubLayer`]：`tracing_subscriber::Layer` 实现，把事件格式化为单行文本；
//! - [`install`]：组装 `EnvFilter + fmt + LogHubLayer` 并设置为全局 Subscriber。

mod error;
mod hub;
mod install;
mod layer;

pub use error::LogError;
pub use hub::{LogHub, LogStream};
pub use install::install;
pub use layer::LogHubLayer;
