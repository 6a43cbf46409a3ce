//! 把 `tracing` 事件格式化为单行文本并发布到 [`LogHub`]。
//!
//! 行格式：`LEVEL target: message key=value ...\n`。没有订阅者时直接跳过格式化。

use std::fmt::{self, Write as _};

use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use crate::hub::LogHub;

/// 发布到 [`LogHub`] 的 `tracing` 层。
#[derive(Clone)]
pub struct LogHubLayer {
    hub: LogHub,
}

impl LogHubLayer {
    pub fn new(hub: LogHub) -> Self {
        Self { hub }
    }
}

impl<S: Subscriber> Layer<S> for LogHubLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.hub.has_subscribers() {
            return;
        }
        let metadata = event.metadata();
        let mut line = LineVisitor::default();
        event.record(&mut line);
        self.hub.publish(&line.finish(metadata.level(), metadata.target()));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self, level: &tracing::Level, target: &str) -> String {
        let mut line = format!("{level} {target}: {}", self.message);
        line.push_str(&self.fields);
        line.push('\n');
        line
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
