//! 定时器等待策略
//!
//! 定义 `CallbackTimer` 在两个 tick 之间如何等待，用于在精度与 CPU 占用之间取舍。

use std::sync::atomic::{AtomicU8, Ordering};

/// 定时器等待策略
///
/// # 策略说明
///
/// | 策略 | 值 | 精度 | CPU 占用 |
/// |------|----|------|----------|
/// | Auto | 0 | ~50μs（`spin_sleep` 按平台校准） | 低 |
/// | Kernel | 1 | 取决于内核定时器（Linux ~60μs，Windows ~1ms） | 最低 |
/// | SleepHybrid | 2 | ~10μs（睡眠大部分时间，最后 100μs 自旋） | 中 |
/// | BusyWait | 3 | ~1μs | 独占一个核心 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u8)]
pub enum TimerStrategy {
    /// 自动选择（默认）
    ///
    /// 使用 `spin_sleep` 的平台默认精度：先交给操作系统睡眠，剩余部分自旋。
    #[default]
    Auto = 0,

    /// 纯内核睡眠
    Kernel = 1,

    /// 睡眠 + 自旋混合
    ///
    /// 剩余时间大于 `SPIN_THRESHOLD` 时睡眠 `剩余 - SPIN_THRESHOLD`，之后忙等。
    SleepHybrid = 2,

    /// 纯忙等
    BusyWait = 3,
}

impl TimerStrategy {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Auto。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Kernel,
            2 => Self::SleepHybrid,
            3 => Self::BusyWait,
            _ => Self::Auto,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否会占用 CPU 自旋
    pub fn spins(self) -> bool {
        !matches!(self, Self::Kernel)
    }
}

impl std::str::FromStr for TimerStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "0" => Ok(Self::Auto),
            "kernel" | "1" => Ok(Self::Kernel),
            "hybrid" | "sleep_hybrid" | "sleep-hybrid" | "2" => Ok(Self::SleepHybrid),
            "busy" | "busy_wait" | "busy-wait" | "3" => Ok(Self::BusyWait),
            other => Err(format!("unknown timer strategy: {other}")),
        }
    }
}

/// 等待策略（原子版本，用于线程间共享）
///
/// 定时器线程每个 tick 读取一次，外部线程可以在运行中切换。
///
/// ```rust
/// use cyclic_timing::{AtomicTimerStrategy, TimerStrategy};
/// use std::sync::atomic::Ordering;
///
/// let strategy = AtomicTimerStrategy::new(TimerStrategy::Auto);
/// strategy.set(TimerStrategy::BusyWait, Ordering::Relaxed);
/// assert_eq!(strategy.get(Ordering::Relaxed), TimerStrategy::BusyWait);
/// ```
#[derive(Debug, Default)]
pub struct AtomicTimerStrategy {
    inner: AtomicU8,
}

impl AtomicTimerStrategy {
    /// 创建新的原子策略
    pub fn new(strategy: TimerStrategy) -> Self {
        Self {
            inner: AtomicU8::new(strategy.as_u8()),
        }
    }

    /// 获取当前策略
    pub fn get(&self, ordering: Ordering) -> TimerStrategy {
        TimerStrategy::from_u8(self.inner.load(ordering))
    }

    /// 设置策略
    pub fn set(&self, strategy: TimerStrategy, ordering: Ordering) {
        self.inner.store(strategy.as_u8(), ordering);
    }
}

impl Clone for AtomicTimerStrategy {
    fn clone(&self) -> Self {
        Self::new(self.get(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_wire_values() {
        assert_eq!(TimerStrategy::Auto.as_u8(), 0);
        assert_eq!(TimerStrategy::Kernel.as_u8(), 1);
        assert_eq!(TimerStrategy::SleepHybrid.as_u8(), 2);
        assert_eq!(TimerStrategy::BusyWait.as_u8(), 3);
    }

    #[test]
    fn test_from_u8() {
        assert_eq!(TimerStrategy::from_u8(0), TimerStrategy::Auto);
        assert_eq!(TimerStrategy::from_u8(2), TimerStrategy::SleepHybrid);
        assert_eq!(TimerStrategy::from_u8(3), TimerStrategy::BusyWait);
        assert_eq!(TimerStrategy::from_u8(200), TimerStrategy::Auto); // 无效值
    }

    #[test]
    fn test_from_str() {
        assert_eq!("hybrid".parse::<TimerStrategy>(), Ok(TimerStrategy::SleepHybrid));
        assert_eq!("BUSY".parse::<TimerStrategy>(), Ok(TimerStrategy::BusyWait));
        assert_eq!("1".parse::<TimerStrategy>(), Ok(TimerStrategy::Kernel));
        assert!("fast".parse::<TimerStrategy>().is_err());
    }

    #[test]
    fn test_atomic_strategy() {
        let strategy = AtomicTimerStrategy::new(TimerStrategy::Kernel);
        assert_eq!(strategy.get(Ordering::Relaxed), TimerStrategy::Kernel);

        strategy.set(TimerStrategy::SleepHybrid, Ordering::Relaxed);
        assert_eq!(strategy.get(Ordering::Relaxed), TimerStrategy::SleepHybrid);

        let cloned = strategy.clone();
        assert_eq!(cloned.get(Ordering::Relaxed), TimerStrategy::SleepHybrid);
    }

    #[test]
    fn test_default() {
        let strategy: TimerStrategy = Default::default();
        assert_eq!(strategy, TimerStrategy::Auto);
        assert!(!TimerStrategy::Kernel.spins());
    }
}
