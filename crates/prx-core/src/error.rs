use std::{borrow::Cow, error::Error, fmt};

/// `CoreError` 是 prx 各 crate 共享的稳定错误域。
///
/// # 设计背景（Why）
/// - 缓冲池、环形缓冲、日志扇出在不同层次产生的故障需要合流为统一的错误码，
///   以便日志与告警按码值聚合，而不是解析自然语言消息。
///
/// # 契约说明（What）
/// - `code`：稳定字符串，使用 [`codes`] 模块中的常量，遵循 `<领域>.<语义>` 约定；
/// - `message`：面向排障人员的描述；
/// - `cause`：可选底层原因，通过 [`Error::source`] 暴露；
/// - `category`：可选的显式分类，未设置时按错误码查表。
///
/// # 风险提示（Trade-offs）
/// - 结构体只承载信息，不做格式化或上报；调用方自行决定如何记录。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    category: Option<ErrorCategory>,
}

/// 底层原因，保持 `Send + Sync` 以便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 统一的返回值别名。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

impl CoreError {
    /// 构造核心错误。
    ///
    /// ```rust
    /// use prx_core::{CoreError, error::codes};
    ///
    /// let err = CoreError::new(codes::RESOURCE_OUT_OF_MEMORY, "slab allocation failed");
    /// assert_eq!(err.code(), codes::RESOURCE_OUT_OF_MEMORY);
    /// assert!(err.cause().is_none());
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 就地设置底层原因。
    pub fn set_cause(&mut self, cause: impl Error + Send + Sync + 'static) {
        self.cause = Some(Box::new(cause));
    }

    /// 显式覆盖分类，优先级高于按码查表。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 获取结构化错误分类。
    ///
    /// # 执行逻辑（How）
    /// 1. 优先返回显式设置的分类；
    /// 2. 否则按错误码查表；
    /// 3. 查表失败时回退为 [`ErrorCategory::NonRetryable`]。
    pub fn category(&self) -> ErrorCategory {
        self.category
            .or_else(|| lookup_default_category(self.code))
            .unwrap_or(ErrorCategory::NonRetryable)
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 调用方是否可以在稍后重试同一操作。
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Retryable)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 错误分类，驱动调用方的处置策略。
///
/// # 契约说明（What）
/// - `Retryable`：资源暂时不足（例如池耗尽），降低负载或稍后重试即可恢复；
/// - `NonRetryable`：能力不匹配（例如固定池调整尺寸），重试永远不会成功；
/// - `ProgrammerError`：空输入、零长度、跨池误用等调用方缺陷，应在开发期暴露。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable,
    NonRetryable,
    ProgrammerError,
}

fn lookup_default_category(code: &str) -> Option<ErrorCategory> {
    match code {
        codes::RESOURCE_OUT_OF_MEMORY => Some(ErrorCategory::Retryable),
        codes::APP_NOT_SUPPORTED | codes::BUFFER_POOL_CLOSED | codes::LOG_ALREADY_INSTALLED => {
            Some(ErrorCategory::NonRetryable)
        }
        codes::APP_INVALID_ARGUMENT | codes::APP_FAULT | codes::BUFFER_LEAKED => {
            Some(ErrorCategory::ProgrammerError)
        }
        codes::CONFIG_INVALID => Some(ErrorCategory::ProgrammerError),
        _ => None,
    }
}

/// 稳定错误码集合，遵循 `<领域>.<语义>` 命名。
pub mod codes {
    /// 内存分配或池扩容失败。
    pub const RESOURCE_OUT_OF_MEMORY: &str = "resource.out_of_memory";
    /// 后端不具备请求的能力（例如固定池调整尺寸）。
    pub const APP_NOT_SUPPORTED: &str = "app.not_supported";
    /// 参数非法：零长度、空输入或跨池误用。
    pub const APP_INVALID_ARGUMENT: &str = "app.invalid_argument";
    /// 调用方传入了已失效的对象。
    pub const APP_FAULT: &str = "app.fault";
    /// 销毁缓冲池时仍有未归还的缓冲。
    pub const BUFFER_LEAKED: &str = "buffer.leaked";
    /// 缓冲池已关闭。
    pub const BUFFER_POOL_CLOSED: &str = "buffer.pool_closed";
    /// 配置无法解析或校验失败。
    pub const CONFIG_INVALID: &str = "config.invalid";
    /// 全局日志订阅者重复安装。
    pub const LOG_ALREADY_INSTALLED: &str = "log.already_installed";
}
