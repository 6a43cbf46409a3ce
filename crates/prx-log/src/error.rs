use prx_core::{CoreError, ErrorCategory, error::codes};
use thiserror::Error;

/// 日志接入层的错误。
#[derive(Debug, Error)]
pub enum LogError {
    /// `install` 已在本进程执行过。
    #[error("prx-log is already installed")]
    AlreadyInstalled,
    /// 外部已设置全局 Subscriber。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,
    /// 过滤表达式无法解析。
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter { directive: String, reason: String },
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

impl From<LogError> for CoreError {
    fn from(value: LogError) -> Self {
        let message = value.to_string();
        match value {
            LogError::InvalidFilter { .. } => CoreError::new(codes::CONFIG_INVALID, message)
                .with_category(ErrorCategory::NonRetryable),
            LogError::SetGlobalSubscriber(err) => CoreError::new(codes::LOG_ALREADY_INSTALLED, message)
                .with_cause(err)
                .with_category(ErrorCategory::ProgrammerError),
            LogError::AlreadyInstalled | LogError::SubscriberAlreadySet => {
                CoreError::new(codes::LOG_ALREADY_INSTALLED, message)
                    .with_category(ErrorCategory::ProgrammerError)
            }
        }
    }
}
