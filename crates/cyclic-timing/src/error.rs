//! 定时器错误类型定义

use thiserror::Error;

/// 定时器错误类型
#[derive(Error, Debug)]
pub enum TimerError {
    /// 定时器已在运行
    #[error("Timer is already running")]
    AlreadyRunning,

    /// 启动前未设置回调
    #[error("No callback set")]
    NoCallback,

    /// 间隔必须大于 0
    #[error("Invalid timer interval: {0}us")]
    InvalidInterval(u64),

    /// 定时器线程创建失败
    #[error("Failed to spawn timer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::TimerError;

    #[test]
    fn test_timer_error_display() {
        assert_eq!(
            TimerError::AlreadyRunning.to_string(),
            "Timer is already running"
        );
        assert_eq!(TimerError::NoCallback.to_string(), "No callback set");
        assert_eq!(
            TimerError::InvalidInterval(0).to_string(),
            "Invalid timer interval: 0us"
        );

        let io = std::io::Error::other("resource exhausted");
        let msg = TimerError::Spawn(io).to_string();
        assert!(msg.contains("spawn") && msg.contains("resource exhausted"));
    }
}
