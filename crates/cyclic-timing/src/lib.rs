//! # Cyclic Timing
//!
//! 高精度定时基础设施：
//! - [`PrecisionWait`]：睡眠 + 自旋混合等待，亚毫秒级命中截止时间
//! - [`CallbackTimer`]：单线程周期驱动器，每个 tick 调用一次回调
//! - [`TimerStrategy`]：等待策略（AUTO / KERNEL / SLEEP_HYBRID / BUSY_WAIT）
//! - [`CpuAffinity`]：定时器线程绑核能力接口

pub mod affinity;
mod error;
pub mod strategy;
pub mod timer;
pub mod wait;

pub use affinity::{AffinityGuard, CpuAffinity, SystemCpuAffinity};
pub use error::TimerError;
pub use strategy::{AtomicTimerStrategy, TimerStrategy};
pub use timer::{CallbackTimer, DEFAULT_INTERVAL_US, TimerCallback};
pub use wait::{PrecisionWait, SPIN_THRESHOLD};
