//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义缓冲池对外暴露的错误语义，并与 `prx-core::CoreError` 的稳定错误码对齐；
//! - 区分“稍后可恢复”（内存不足）、“永远不会成功”（固定池调整尺寸）与“调用方缺陷”（非法参数、泄漏）。
//!
//! ## 设计要求（What）
//! - 所有错误派生 `thiserror::Error`；
//! - 通过 `From<BufferError> for CoreError` 让上层直接用 `?` 汇入统一错误域。

use prx_core::{CoreError, ErrorCategory, error::codes};
use thiserror::Error;

/// 缓冲池错误域。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// 空闲链表耗尽、扩容失败或内存分配失败。调用方可以稍后重试或降低负载。
    #[error("buffer pool `{pool}` is out of memory: {detail}")]
    OutOfMemory { pool: String, detail: String },

    /// 后端不具备该能力，例如固定块池调整尺寸。重试永远不会成功。
    #[error("buffer pool `{pool}` does not support `{operation}`")]
    NotSupported {
        pool: String,
        operation: &'static str,
    },

    /// 参数非法：零长度、零容量配置或跨池误用。
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// 销毁时仍有缓冲未归还，池保持可用状态。
    #[error("buffer pool `{pool}` still has {outstanding} buffer(s) checked out")]
    Leaked { pool: String, outstanding: usize },

    /// 池已关闭，不再分配。
    #[error("buffer pool `{pool}` is closed")]
    Closed { pool: String },
}

impl BufferError {
    pub(crate) fn out_of_memory(pool: &str, detail: impl Into<String>) -> Self {
        Self::OutOfMemory {
            pool: pool.to_owned(),
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    /// 对应的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::OutOfMemory { .. } => codes::RESOURCE_OUT_OF_MEMORY,
            BufferError::NotSupported { .. } => codes::APP_NOT_SUPPORTED,
            BufferError::InvalidArgument { .. } => codes::APP_INVALID_ARGUMENT,
            BufferError::Leaked { .. } => codes::BUFFER_LEAKED,
            BufferError::Closed { .. } => codes::BUFFER_POOL_CLOSED,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BufferError::OutOfMemory { .. } => ErrorCategory::Retryable,
            BufferError::NotSupported { .. } | BufferError::Closed { .. } => {
                ErrorCategory::NonRetryable
            }
            BufferError::InvalidArgument { .. } | BufferError::Leaked { .. } => {
                ErrorCategory::ProgrammerError
            }
        }
    }
}

impl From<BufferError> for CoreError {
    fn from(value: BufferError) -> Self {
        let category = value.category();
        CoreError::new(value.code(), value.to_string()).with_category(category)
    }
}

/// 分配器无法提供请求的字节数。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("failed to allocate {requested} bytes")]
pub struct AllocError {
    requested: usize,
}

impl AllocError {
    pub fn new(requested: usize) -> Self {
        Self { requested }
    }

    pub fn requested(&self) -> usize {
        self.requested
    }
}

/// 配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse pool settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid pool settings: {0}")]
    Invalid(#[from] BufferError),
}

impl From<ConfigError> for CoreError {
    fn from(value: ConfigError) -> Self {
        let message = value.to_string();
        match value {
            ConfigError::Parse(err) => CoreError::new(codes::CONFIG_INVALID, message).with_cause(err),
            ConfigError::Invalid(err) => CoreError::new(codes::CONFIG_INVALID, message).with_cause(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_keeps_code_and_category() {
        let err = BufferError::NotSupported {
            pool: "fixed-32".into(),
            operation: "set_size",
        };
        let core: CoreError = err.into();
        assert_eq!(core.code(), codes::APP_NOT_SUPPORTED);
        assert_eq!(core.category(), ErrorCategory::NonRetryable);

        let oom: CoreError = BufferError::out_of_memory("dyn", "max_count reached").into();
        assert!(oom.is_retryable());
    }
}
