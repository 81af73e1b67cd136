//! 发送器指标
//!
//! 原子计数器，可以在任何线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 发送器实时指标
///
/// 由定时器线程更新，外部通过 [`SenderMetrics::snapshot`] 读取。
#[derive(Debug, Default)]
pub struct SenderMetrics {
    /// 发送成功的帧数（回调返回值 >= 0）
    pub frames_sent: AtomicU64,

    /// 回调返回负值（或 panic）的次数
    pub sink_errors: AtomicU64,

    /// 处理过的 tick 数
    pub ticks: AtomicU64,

    /// 因落后被跳过的发送时隙
    ///
    /// 回调阻塞超过一个周期时，发送器只补发一次，其余时隙计入这里。
    pub slots_dropped: AtomicU64,
}

impl SenderMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取快照（`Relaxed`，计数器之间可能有微小时间差）
    pub fn snapshot(&self) -> SenderMetricsSnapshot {
        SenderMetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            slots_dropped: self.slots_dropped.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.frames_sent.store(0, Ordering::Relaxed);
        self.sink_errors.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.slots_dropped.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderMetricsSnapshot {
    pub frames_sent: u64,
    pub sink_errors: u64,
    pub ticks: u64,
    pub slots_dropped: u64,
}

impl SenderMetricsSnapshot {
    /// 发送失败率（百分比）；没有发送记录时返回 0.0
    pub fn error_rate(&self) -> f64 {
        let total = self.frames_sent + self.sink_errors;
        if total == 0 {
            return 0.0;
        }
        (self.sink_errors as f64 / total as f64) * 100.0
    }
}
