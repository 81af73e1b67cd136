//! Cyclic SDK - 高精度周期/序列帧发送引擎
//!
//! 面向 CAN/UDS 测试工具与台架工具的基础设施，分层如下：
//!
//! - **定时层** (`timing`): 睡眠 + 自旋混合等待、单线程回调定时器、CPU 绑核
//! - **发送层** (`sender`): 周期发送器（多帧独立周期与相位）、序列发送器（脚本回放）
//! - **日志层** (`logger`): 无锁队列 + 单写线程的轮转文件日志器
//!
//! # 快速开始
//!
//! ```no_run
//! use cyclic_sdk::prelude::*;
//!
//! cyclic_sdk::init_logger!();
//!
//! let sender = PeriodSender::new();
//! sender.set_sink(|data: &[u8], ctx: &SendContext| {
//!     println!("{} -> {} bytes", ctx.key, data.len());
//!     data.len() as i32
//! });
//! sender
//!     .add_frame(SendFrame::new(FrameKey::new(1, 0, 0x7E0), vec![0x02, 0x3E, 0x00]).with_period(2000))
//!     .unwrap();
//! ```

pub use cyclic_logger as logger;
pub use cyclic_sender as sender;
pub use cyclic_timing as timing;

// Prelude 模块
pub mod prelude;

// --- 用户以此为界 ---
// 以下是通过 Facade Pattern 提供的公共 API

// 定时层
pub use cyclic_timing::{CallbackTimer, PrecisionWait, TimerError, TimerStrategy};

// 发送层
pub use cyclic_sender::{
    FrameKey, PeriodSender, SendContext, SendFrame, SenderError, SequenceConfig, SequenceSender,
    Sink, UdpSink,
};

// 日志层
pub use cyclic_logger::{AsyncLogger, LoggerConfig, LoggerError};

#[doc(hidden)]
pub mod __private {
    pub use tracing_log;
    pub use tracing_subscriber;
}

/// 初始化全局 `tracing` 订阅器
///
/// - 过滤规则优先读取 `RUST_LOG`，否则使用 `default_filter`
/// - 通过 `tracing-log` 把 `log` crate 的记录转发到 `tracing`
///
/// 重复调用是安全的：已经安装过订阅器时返回 `false`。
pub fn init_tracing(default_filter: &str) -> bool {
    use __private::tracing_subscriber::{EnvFilter, fmt};

    // 其它组件可能已经安装过 LogTracer
    let _ = __private::tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = fmt().with_env_filter(filter).with_thread_names(true).finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// 初始化日志输出
///
/// ```no_run
/// cyclic_sdk::init_logger!();          // 默认 info
/// cyclic_sdk::init_logger!("debug");   // 指定默认级别 / 过滤规则
/// ```
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger!("info")
    };
    ($filter:expr) => {
        $crate::init_tracing($filter)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_logger_twice() {
        let first = crate::init_logger!("debug");
        let second = crate::init_logger!();
        // 第二次调用不会覆盖已有的订阅器
        assert!(!second || !first);
        tracing::info!("logger initialized");
    }
}
