//! 日志器错误类型定义

use thiserror::Error;

/// 日志器错误类型
#[derive(Error, Debug)]
pub enum LoggerError {
    /// 配置命令无效（未知参数、缺少值、数值或枚举非法）
    #[error("Invalid logger config: {0}")]
    Config(String),

    /// 运行中不允许修改配置
    #[error("Logger is running; stop it before reconfiguring")]
    Busy,

    /// 文件 IO 错误
    #[error("Log file IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 写线程创建失败
    #[error("Failed to spawn log writer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::LoggerError;

    #[test]
    fn test_logger_error_display() {
        let err = LoggerError::Config("unknown option --foo".to_string());
        assert_eq!(err.to_string(), "Invalid logger config: unknown option --foo");

        let err: LoggerError = std::io::Error::other("disk full").into();
        assert!(err.to_string().contains("disk full"));

        assert!(LoggerError::Busy.to_string().contains("running"));
    }
}
