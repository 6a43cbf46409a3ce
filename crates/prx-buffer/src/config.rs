//! 缓冲池配置。
//!
//! # 模块定位（Why）
//! - 池的扩容步长、水位阈值与容量上限需要由部署方调优，因此全部字段可从 TOML 加载；
//! - 构造池之前统一做一次规范化，池内部只面对满足不变量的配置。
//!
//! # 规范化规则（What）
//! 1. `initial_count == 0` 或 `max_count == Some(0)` 视为非法参数；
//! 2. 设置了 `max_count` 时，`high_watermark` 被钳制到 `max_count`；
//! 3. 钳制后若 `low_watermark > high_watermark`，两者都重置为 0。

use serde::{Deserialize, Serialize};

use crate::error::{BufferError, ConfigError};

/// 每次扩容默认创建的缓冲数。
pub const DEFAULT_INITIAL_COUNT: usize = 10;

/// 销毁池时发现未归还缓冲的处理策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakPolicy {
    /// 返回 [`BufferError::Leaked`]，池保持可用。
    #[default]
    Report,
    /// 直接 panic，适合测试与调试环境尽早暴露泄漏。
    Panic,
}

/// 池的分配策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// 每个缓冲独立分配，可调整尺寸。
    #[default]
    Dynamic,
    /// 从连续 slab 中切分的定长缓冲。
    Fixed,
}

/// 缓冲池参数。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 每次扩容创建的缓冲数。
    pub initial_count: usize,
    /// 空闲数降到该值及以下时触发低水位回调。
    pub low_watermark: usize,
    /// 空闲数回升到该值以上时触发恢复回调。
    pub high_watermark: usize,
    /// 池生命周期内最多创建的缓冲数。
    pub max_count: Option<usize>,
    pub leak_policy: LeakPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_count: DEFAULT_INITIAL_COUNT,
            low_watermark: 0,
            high_watermark: 0,
            max_count: None,
            leak_policy: LeakPolicy::Report,
        }
    }
}

impl PoolConfig {
    pub fn with_initial_count(mut self, initial_count: usize) -> Self {
        self.initial_count = initial_count;
        self
    }

    pub fn with_watermarks(mut self, low: usize, high: usize) -> Self {
        self.low_watermark = low;
        self.high_watermark = high;
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn with_leak_policy(mut self, leak_policy: LeakPolicy) -> Self {
        self.leak_policy = leak_policy;
        self
    }

    /// 校验并规范化配置，返回池实际使用的参数。
    pub fn normalized(mut self) -> Result<Self, BufferError> {
        if self.initial_count == 0 {
            return Err(BufferError::invalid_argument(
                "initial_count must be greater than zero",
            ));
        }
        if let Some(max_count) = self.max_count {
            if max_count == 0 {
                return Err(BufferError::invalid_argument(
                    "max_count must be greater than zero when set",
                ));
            }
            self.high_watermark = self.high_watermark.min(max_count);
        }
        if self.low_watermark > self.high_watermark {
            tracing::warn!(
                low = self.low_watermark,
                high = self.high_watermark,
                "low watermark exceeds high watermark, disabling both"
            );
            self.low_watermark = 0;
            self.high_watermark = 0;
        }
        Ok(self)
    }
}

/// 一个池的完整描述，可直接由配置文件驱动 [`create_factory`](crate::create_factory)。
///
/// ```rust
/// use prx_buffer::{PoolKind, PoolSettings};
///
/// let settings = PoolSettings::from_toml_str(
///     r#"
///     name = "ingress"
///     kind = "fixed"
///     item_size = 2048
///     initial_count = 16
///     max_count = 64
///     "#,
/// )
/// .expect("valid settings");
/// assert_eq!(settings.kind, PoolKind::Fixed);
/// assert_eq!(settings.pool.max_count, Some(64));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub name: String,
    #[serde(default)]
    pub kind: PoolKind,
    pub item_size: usize,
    #[serde(flatten)]
    pub pool: PoolConfig,
}

impl PoolSettings {
    /// 解析 TOML 并立即校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BufferError> {
        if self.item_size == 0 {
            return Err(BufferError::invalid_argument(format!(
                "pool `{}` must have a non-zero item_size",
                self.name
            )));
        }
        self.pool.clone().normalized().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_watermarks_reset_to_zero() {
        let config = PoolConfig::default()
            .with_watermarks(8, 3)
            .normalized()
            .expect("normalize");
        assert_eq!((config.low_watermark, config.high_watermark), (0, 0));
    }

    #[test]
    fn high_watermark_clamped_to_max_count() {
        let config = PoolConfig::default()
            .with_watermarks(2, 50)
            .with_max_count(20)
            .normalized()
            .expect("normalize");
        assert_eq!(config.high_watermark, 20);
        assert_eq!(config.low_watermark, 2);
    }

    #[test]
    fn clamping_below_low_disables_watermarks() {
        let config = PoolConfig::default()
            .with_watermarks(6, 9)
            .with_max_count(4)
            .normalized()
            .expect("normalize");
        assert_eq!((config.low_watermark, config.high_watermark), (0, 0));
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(matches!(
            PoolConfig::default().with_initial_count(0).normalized(),
            Err(BufferError::InvalidArgument { .. })
        ));
        assert!(matches!(
            PoolConfig::default().with_max_count(0).normalized(),
            Err(BufferError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn settings_default_to_dynamic_kind() {
        let settings = PoolSettings::from_toml_str(
            r#"
            name = "egress"
            item_size = 512
            low_watermark = 1
            high_watermark = 4
            leak_policy = "panic"
            "#,
        )
        .expect("parse settings");
        assert_eq!(settings.kind, PoolKind::Dynamic);
        assert_eq!(settings.pool.initial_count, DEFAULT_INITIAL_COUNT);
        assert_eq!(settings.pool.leak_policy, LeakPolicy::Panic);
    }

    #[test]
    fn zero_item_size_fails_validation() {
        let err = PoolSettings::from_toml_str("name = \"bad\"\nitem_size = 0\n")
            .expect_err("zero item size must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
