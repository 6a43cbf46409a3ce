//! `install_contract` 集成测试：全局安装只能成功一次，安装后事件进入日志流。
//!
//! 全局 Subscriber 在进程内只能设置一次，因此本文件只包含一个测试函数，
//! 按顺序覆盖非法过滤表达式、首次安装、事件扇出与重复安装。

use prx_core::{CoreError, error::codes};
use prx_log::{LogError, LogHub, install};

#[test]
fn install_once_and_fan_out() {
    let hub = LogHub::new();
    let stream = hub.subscribe(4096).expect("订阅失败");

    assert!(matches!(
        install(&hub, Some("prx_buffer=loud")),
        Err(LogError::InvalidFilter { .. })
    ));

    install(&hub, Some("debug")).expect("首次安装");
    tracing::info!(target: "prx_edge", pool = "egress", "proxy started");
    let captured = stream.drain_string();
    assert!(captured.contains("INFO prx_edge: proxy started pool=egress\n"), "{captured}");

    let err = install(&hub, None).expect_err("重复安装必须失败");
    assert!(matches!(err, LogError::AlreadyInstalled));
    let core: CoreError = err.into();
    assert_eq!(core.code(), codes::LOG_ALREADY_INSTALLED);
}
