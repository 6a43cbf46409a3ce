use std::sync::OnceLock;

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::{error::LogError, hub::LogHub, layer::LogHubLayer};

static INSTALLED: OnceLock<LogHub> = OnceLock::new();

/// 设置全局 Subscriber：`EnvFilter + fmt + LogHubLayer`。
///
/// # 契约说明（What）
/// - `filter` 为 `None` 时读取 `RUST_LOG`，未设置则使用 `info`；
/// - 每个进程只能成功一次，重复调用返回 [`LogError::AlreadyInstalled`]；
/// - 外部已经设置过全局 Subscriber 时返回 [`LogError::SubscriberAlreadySet`]。
pub fn install(hub: &LogHub, filter: Option<&str>) -> Result<(), LogError> {
    if INSTALLED.get().is_some() {
        return Err(LogError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(LogError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(filter)?)
        .with(tracing_subscriber::fmt::layer())
        .with(LogHubLayer::new(hub.clone()));
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED
        .set(hub.clone())
        .map_err(|_| LogError::AlreadyInstalled)
}

fn build_env_filter(filter: Option<&str>) -> Result<EnvFilter, LogError> {
    match filter {
        Some(directive) => EnvFilter::try_new(directive).map_err(|err| LogError::InvalidFilter {
            directive: directive.to_owned(),
            reason: err.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}
