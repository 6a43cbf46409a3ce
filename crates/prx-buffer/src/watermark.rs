//! 水位回调。
//!
//! 池在空闲数跨越阈值时调用用户回调：降到低水位及以下报告 [`Watermark::Low`]，
//! 回升到高水位以上报告 [`Watermark::High`]。回调是边沿触发的，每次跨越只调用一次，
//! 并且总是在池锁释放之后执行，回调内部可以安全地再次分配或归还缓冲。

use std::sync::Arc;

use prx_core::Signal;

/// 水位跨越方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Watermark {
    /// 空闲数降到低水位及以下。
    Low,
    /// 空闲数恢复到高水位以上。
    High,
}

impl Watermark {
    pub fn is_low(self) -> bool {
        matches!(self, Watermark::Low)
    }
}

/// 水位回调；需要上下文时由闭包捕获。
pub type WatermarkCallback = Arc<dyn Fn(Watermark) + Send + Sync>;

/// 回调插槽，`None` 即空操作。
#[derive(Default)]
pub(crate) struct WatermarkHook {
    callback: Option<WatermarkCallback>,
}

impl WatermarkHook {
    pub(crate) fn new(callback: Option<WatermarkCallback>) -> Self {
        Self { callback }
    }

    pub(crate) fn fire(&self, mark: Watermark) {
        if let Some(callback) = &self.callback {
            callback(mark);
        }
    }
}

/// 把水位事件桥接到信号：低水位复位、恢复时置位。
///
/// 生产者在 `signal.wait_timeout(..)` 上等待，即可在池恢复后继续申请缓冲。
///
/// ```rust
/// use std::sync::Arc;
/// use prx_buffer::{Watermark, signal_on_recovery};
/// use prx_core::{Signal, SignalKind};
///
/// let signal = Arc::new(Signal::new(SignalKind::ManualReset, true));
/// let callback = signal_on_recovery(Arc::clone(&signal));
/// callback(Watermark::Low);
/// assert!(!signal.is_set());
/// callback(Watermark::High);
/// assert!(signal.is_set());
/// ```
pub fn signal_on_recovery(signal: Arc<Signal>) -> WatermarkCallback {
    Arc::new(move |mark| match mark {
        Watermark::Low => signal.reset(),
        Watermark::High => signal.set(),
    })
}
