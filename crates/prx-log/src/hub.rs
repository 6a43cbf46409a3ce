//! 日志扇出中心与订阅流。
//!
//! # 核心机制（How）
//! - 订阅列表由 `RwLock` 保护，发布路径只取读锁，订阅 / 退订取写锁；
//! - 每个流的环形缓冲由独立的 `Mutex` 串行化读写，环形缓冲本身不带锁；
//! - 一行放不下时整行丢弃并累加 `dropped_bytes`，读者不会看到半行。

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::{Mutex, RwLock};
use prx_core::{Result, RingBuffer};

#[derive(Default)]
struct HubInner {
    streams: RwLock<Vec<Weak<StreamInner>>>,
}

struct StreamInner {
    ring: Mutex<RingBuffer>,
    dropped: AtomicU64,
}

impl StreamInner {
    fn push(&self, line: &[u8]) {
        let mut ring = self.ring.lock();
        if ring.capacity() < line.len() {
            drop(ring);
            self.dropped.fetch_add(line.len() as u64, Ordering::Relaxed);
            return;
        }
        ring.write(line);
    }
}

/// 日志扇出上下文，克隆后共享同一组订阅者。
#[derive(Clone, Default)]
pub struct LogHub {
    inner: Arc<HubInner>,
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建一个缓冲容量为 `capacity` 字节的订阅流。
    pub fn subscribe(&self, capacity: usize) -> Result<LogStream> {
        let stream = Arc::new(StreamInner {
            ring: Mutex::new(RingBuffer::new(capacity)?),
            dropped: AtomicU64::new(0),
        });
        let mut streams = self.inner.streams.write();
        streams.retain(|weak| weak.strong_count() > 0);
        streams.push(Arc::downgrade(&stream));
        Ok(LogStream {
            inner: stream,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// 当前存活的订阅数。
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .streams
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// 把一行文本写入所有订阅流。
    pub fn publish(&self, line: &str) {
        let streams = self.inner.streams.read();
        for stream in streams.iter().filter_map(Weak::upgrade) {
            stream.push(line.as_bytes());
        }
    }
}

/// 订阅句柄。丢弃即退订。
pub struct LogStream {
    inner: Arc<StreamInner>,
    hub: Weak<HubInner>,
}

impl LogStream {
    /// 读出至多 `dst.len()` 字节。
    pub fn read(&self, dst: &mut [u8]) -> usize {
        self.inner.ring.lock().read(dst)
    }

    /// 取出当前缓存的全部字节。
    pub fn drain(&self) -> Vec<u8> {
        let mut ring = self.inner.ring.lock();
        let mut out = vec![0; ring.available()];
        let read = ring.read(&mut out);
        out.truncate(read);
        out
    }

    /// 取出缓存内容并按 UTF-8 解码，非法字节以替换字符表示。
    pub fn drain_string(&self) -> String {
        String::from_utf8_lossy(&self.drain()).into_owned()
    }

    /// 待读取的字节数。
    pub fn available(&self) -> usize {
        self.inner.ring.lock().available()
    }

    /// 因缓冲已满被丢弃的字节数。
    pub fn dropped_bytes(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let target = Arc::downgrade(&self.inner);
            hub.streams
                .write()
                .retain(|weak| !weak.ptr_eq(&target) && weak.strong_count() > 0);
        }
    }
}
