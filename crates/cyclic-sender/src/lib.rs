//! # Cyclic Sender
//!
//! 基于 [`cyclic_timing::CallbackTimer`] 的帧发送层：
//! - [`PeriodSender`]：多帧各自独立的周期与相位偏移，运行中增删改
//! - [`SequenceSender`]：按顺序播放帧脚本，支持轮间延迟与有限/无限重复
//! - [`UdpSink`]：把发送回调落到 UDP socket
//!
//! 两种发送器都以 1ms 为 tick，每个发送器只占用一个定时器线程。

mod error;
pub mod frame;
pub mod metrics;
pub mod period;
pub mod sequence;
pub mod sink;

pub use error::SenderError;
pub use frame::{DEFAULT_PERIOD_MS, FrameKey, SendContext, SendFrame};
pub use metrics::{SenderMetrics, SenderMetricsSnapshot};
pub use period::{
    DEFAULT_MAX_FRAMES, DEFAULT_SEND_BUFFER_SIZE, MAX_FRAMES_LIMIT, MAX_SEND_BUFFER_SIZE,
    MIN_SEND_BUFFER_SIZE, PeriodSender,
};
pub use sequence::{
    Completion, EXIT_COMPLETED, EXIT_SINK_FAILED, EXIT_STOPPED, SequenceConfig, SequenceSender,
};
pub use sink::{Sink, UdpSink};
