//! 基于条件变量的事件信号。
//!
//! 手动复位信号一旦置位便唤醒全部等待者并保持置位；自动复位信号只放行一个等待者，
//! 随后自动清除。缓冲池的水位回调通常驱动一个手动复位信号，生产者在低水位时等待它。

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 信号的复位语义。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    /// 置位后保持，直到显式 [`Signal::reset`]。
    ManualReset,
    /// 每次放行一个等待者后自动清除。
    AutoReset,
}

/// 手动/自动复位事件。
///
/// # 契约说明（What）
/// - `set` 与 `reset` 可在任意线程调用；
/// - `wait_timeout` 返回 `true` 表示观测到置位，`false` 表示超时；
/// - 自动复位模式下，观测到置位的等待者负责清除状态。
#[derive(Debug)]
pub struct Signal {
    kind: SignalKind,
    state: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    /// 创建信号，`initially_set` 决定初始状态。
    pub fn new(kind: SignalKind, initially_set: bool) -> Self {
        Self {
            kind,
            state: Mutex::new(initially_set),
            cond: Condvar::new(),
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// 置位并唤醒等待者。
    pub fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        match self.kind {
            SignalKind::ManualReset => {
                self.cond.notify_all();
            }
            SignalKind::AutoReset => {
                self.cond.notify_one();
            }
        }
    }

    /// 清除置位状态。
    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// 无限期等待置位。
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !*state {
            self.cond.wait(&mut state);
        }
        if self.kind == SignalKind::AutoReset {
            *state = false;
        }
    }

    /// 在 `timeout` 内等待置位。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !*state {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let observed = *state;
        if observed && self.kind == SignalKind::AutoReset {
            *state = false;
        }
        observed
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new(SignalKind::ManualReset, false)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn manual_reset_stays_set_until_reset() {
        let signal = Signal::new(SignalKind::ManualReset, false);
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(5)));
        assert!(signal.wait_timeout(Duration::from_millis(5)));
        signal.reset();
        assert!(!signal.is_set());
    }

    #[test]
    fn auto_reset_releases_single_waiter() {
        let signal = Signal::new(SignalKind::AutoReset, true);
        assert!(signal.wait_timeout(Duration::from_millis(5)));
        assert!(!signal.is_set());
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn set_wakes_blocked_waiter() {
        let signal = Arc::new(Signal::default());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        signal.set();
        assert!(waiter.join().expect("waiter thread panicked"));
    }
}
