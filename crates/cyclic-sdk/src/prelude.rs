//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use cyclic_sdk::prelude::*;
//! ```

// 发送层（推荐入口）
pub use cyclic_sender::{
    Completion, EXIT_COMPLETED, EXIT_SINK_FAILED, EXIT_STOPPED, FrameKey, PeriodSender,
    SendContext, SendFrame, SenderMetricsSnapshot, SequenceConfig, SequenceSender, Sink, UdpSink,
};

// 定时层
pub use cyclic_timing::{CallbackTimer, TimerStrategy};

// 日志层
pub use cyclic_logger::{AsyncLogger, LoggerConfig, NamePattern, RotationMode};

// 错误类型
pub use cyclic_logger::LoggerError;
pub use cyclic_sender::SenderError;
pub use cyclic_timing::TimerError;
