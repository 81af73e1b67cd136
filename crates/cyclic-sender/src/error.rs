//! 发送器错误类型定义

use cyclic_timing::TimerError;
use thiserror::Error;

/// 发送器错误类型
#[derive(Error, Debug)]
pub enum SenderError {
    /// 运行中不允许的操作（修改缓冲区配置、重复启动序列）
    #[error("Sender is busy (running)")]
    Busy,

    /// 帧数量超出上限
    #[error("Frame capacity exceeded (limit: {limit})")]
    Capacity { limit: usize },

    /// 配置值超出允许范围
    #[error("{what} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        what: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// 帧无效（周期为 0、数据超出发送缓冲区）
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// 序列为空
    #[error("Send queue is empty")]
    EmptyQueue,

    /// 未设置发送回调
    #[error("No sink set")]
    NoSink,

    /// 定时器错误
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),
}
