//! 点击 / 曝光事件的异步落盘
//!
//! 发出方只把事件推入内存缓冲区并立即返回；缓冲区按时间间隔或数量阈值批量写入 `EventSink`。

mod recorder;
mod sink;

pub use recorder::EventRecorder;
pub use sink::EventSink;
