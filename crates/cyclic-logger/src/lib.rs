//! # Cyclic Logger
//!
//! 异步轮转文件日志器：生产者无锁入队（`crossbeam-channel` 有界队列），
//! 单独的写线程批量写盘并按大小轮转。
//!
//! - 配置：命令字符串（`--baseFileName UDS_Log --logDir ./logs`）或 [`LoggerConfig`]
//! - 轮转：INCREMENTING（删除最旧文件）/ ROLLING（循环覆盖）
//! - 命名：`<base>_<YYYYMMDD_HHMMSS>_<index><ext>` / `<base>_<index><ext>` / `<base><ext>`
//! - 可以通过 [`AsyncLogger::writer`] 作为 `tracing-subscriber` 的输出

pub mod config;
mod error;
mod hex;
mod logger;
pub mod naming;

pub use config::{
    DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES, LoggerConfig, MAX_ROLLING_FILES, NamePattern,
    RotationMode,
};
pub use error::LoggerError;
pub use hex::{format_hex, write_hex};
pub use logger::{AsyncLogger, LOG_QUEUE_SIZE, LogWriter};
