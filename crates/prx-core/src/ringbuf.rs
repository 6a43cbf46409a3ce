//! 固定容量的单读单写环形字节缓冲。
//!
//! # 模块定位（Why）
//! - 为日志流订阅者缓存格式化后的消息，写满后丢弃多余字节而不是阻塞生产者；
//! - 构造后不再分配，读写均为至多两段连续拷贝。
//!
//! # 核心机制（How）
//! - 底层只有一块 `size + 1` 字节的存储，`read`/`write` 为其中的游标；
//! - `read == write` 即为空；`write` 恰好落后 `read` 一个字节即为满。
//!   不维护额外的布尔标记，多出的哨兵字节保证“满”和“空”可以仅凭两个游标区分。
//!
//! # 并发约束（What）
//! - 类型内部没有锁。所有修改游标的方法都要求 `&mut self`，
//!   因此共享时必须由调用方在外部串行化（`prx-log` 使用互斥锁包裹每个流）。

use crate::error::{CoreError, Result, codes};

/// 单块存储上的环形缓冲。
///
/// 游标均为 `storage` 内的下标：`start` 恒为 0，`end` 为 `storage.len()`。
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    read: usize,
    write: usize,
}

impl RingBuffer {
    /// 创建可容纳 `size` 字节的环形缓冲。
    ///
    /// # 契约说明（What）
    /// - 额外分配一个哨兵字节，总存储为 `size + 1`；
    /// - 分配失败返回 [`codes::RESOURCE_OUT_OF_MEMORY`]，不会中止进程；
    /// - `size == 0` 合法，得到一个永远写不进数据的缓冲。
    pub fn new(size: usize) -> Result<Self> {
        let total = size.checked_add(1).ok_or_else(|| {
            CoreError::new(
                codes::RESOURCE_OUT_OF_MEMORY,
                format!("ring buffer size {size} overflows"),
            )
        })?;
        let mut storage = Vec::new();
        storage.try_reserve_exact(total).map_err(|err| {
            CoreError::new(
                codes::RESOURCE_OUT_OF_MEMORY,
                format!("failed to allocate {total} bytes for ring buffer"),
            )
            .with_cause(err)
        })?;
        storage.resize(total, 0);
        Ok(Self {
            storage: storage.into_boxed_slice(),
            read: 0,
            write: 0,
        })
    }

    /// 构造时传入的可用容量。
    pub fn size(&self) -> usize {
        self.storage.len() - 1
    }

    fn end(&self) -> usize {
        self.storage.len()
    }

    /// 当前保证可写入的字节数。
    pub fn capacity(&self) -> usize {
        if self.write >= self.read {
            (self.end() - self.write) + self.read - 1
        } else {
            self.read - self.write - 1
        }
    }

    /// 当前保证可读取的字节数。
    pub fn available(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            (self.end() - self.read) + self.write
        }
    }

    /// 缓冲内是否没有未读数据。
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// 丢弃全部未读数据，游标回到起点。
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// 从 `write` 开始的一段连续可写区间长度。
    ///
    /// 读游标位于起点时，写游标不得走到 `end`：回绕后会与读游标重合，
    /// 被误判为空。
    fn writable_span(&self) -> usize {
        if self.write >= self.read {
            if self.read == 0 {
                self.end() - 1 - self.write
            } else {
                self.end() - self.write
            }
        } else {
            self.read - self.write - 1
        }
    }

    fn readable_span(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.end() - self.read
        }
    }

    /// 尽力写入 `src`，返回实际写入的字节数。
    ///
    /// 至多两段连续拷贝；永不覆盖未读数据，超出容量的部分直接丢弃。
    pub fn write(&mut self, src: &[u8]) -> usize {
        let mut written = 0;
        for _ in 0..2 {
            let span = self.writable_span().min(src.len() - written);
            if span == 0 {
                break;
            }
            self.storage[self.write..self.write + span]
                .copy_from_slice(&src[written..written + span]);
            written += span;
            self.write += span;
            if self.write == self.end() {
                self.write = 0;
            }
        }
        written
    }

    /// 尽力读取到 `dst`，返回实际读取的字节数。
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        for _ in 0..2 {
            let span = self.readable_span().min(dst.len() - copied);
            if span == 0 {
                break;
            }
            dst[copied..copied + span].copy_from_slice(&self.storage[self.read..self.read + span]);
            copied += span;
            self.read += span;
            if self.read == self.end() {
                self.read = 0;
            }
        }
        copied
    }
}
