//! 高精度等待原语
//!
//! 睡眠覆盖大部分时间，最后一小段自旋，以亚毫秒精度命中截止时间。
//! 单纯的 `std::thread::sleep` 在不同平台上有 60μs ~ 2ms 的抖动，
//! 无法支撑 1ms 周期的发送调度。

use crate::strategy::TimerStrategy;
use std::hint;
use std::thread;
use std::time::{Duration, Instant};

/// 自旋阈值：剩余时间小于此值时不再睡眠，直接忙等
pub const SPIN_THRESHOLD: Duration = Duration::from_micros(100);

/// 高精度等待器
///
/// 无状态，除了所选的 [`TimerStrategy`]。可以在任何线程创建和使用。
///
/// # Example
///
/// ```
/// use cyclic_timing::{PrecisionWait, TimerStrategy};
/// use std::time::{Duration, Instant};
///
/// let wait = PrecisionWait::new(TimerStrategy::SleepHybrid);
/// let deadline = Instant::now() + Duration::from_micros(500);
/// wait.wait_until(deadline);
/// assert!(Instant::now() >= deadline);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecisionWait {
    strategy: TimerStrategy,
}

impl PrecisionWait {
    /// 创建等待器
    pub const fn new(strategy: TimerStrategy) -> Self {
        Self { strategy }
    }

    /// 当前策略
    pub fn strategy(&self) -> TimerStrategy {
        self.strategy
    }

    /// 等待到 `deadline`（单调时钟）
    ///
    /// 返回时 `Instant::now() >= deadline`。截止时间已过则立即返回。
    /// 睡眠被提前唤醒时会重新进入循环。
    pub fn wait_until(&self, deadline: Instant) {
        match self.strategy {
            TimerStrategy::Auto => loop {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                spin_sleep::sleep(deadline - now);
            },
            TimerStrategy::Kernel => loop {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                thread::sleep(deadline - now);
            },
            TimerStrategy::SleepHybrid => hybrid_wait_until(deadline),
            TimerStrategy::BusyWait => spin_until(deadline),
        }
    }

    /// 等待一段时间
    pub fn wait_for(&self, duration: Duration) {
        self.wait_until(Instant::now() + duration);
    }
}

/// 睡眠 `剩余 - SPIN_THRESHOLD`，剩下的部分自旋
fn hybrid_wait_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD {
            thread::sleep(remaining - SPIN_THRESHOLD);
        } else {
            spin_until(deadline);
            return;
        }
    }
}

#[inline]
fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TimerStrategy; 4] = [
        TimerStrategy::Auto,
        TimerStrategy::Kernel,
        TimerStrategy::SleepHybrid,
        TimerStrategy::BusyWait,
    ];

    #[test]
    fn test_never_returns_before_deadline() {
        for strategy in ALL {
            let wait = PrecisionWait::new(strategy);
            for micros in [0u64, 50, 150, 1_000, 2_500] {
                let deadline = Instant::now() + Duration::from_micros(micros);
                wait.wait_until(deadline);
                assert!(
                    Instant::now() >= deadline,
                    "{:?} returned early for {}us",
                    strategy,
                    micros
                );
            }
        }
    }

    #[test]
    fn test_past_deadline_returns_immediately() {
        let wait = PrecisionWait::new(TimerStrategy::SleepHybrid);
        let past = Instant::now();
        std::thread::sleep(Duration::from_millis(1));

        let start = Instant::now();
        wait.wait_until(past);
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_hybrid_tail_error_is_bounded() {
        // 宽松上界：CI 机器负载高时调度抖动可能到毫秒级
        let wait = PrecisionWait::new(TimerStrategy::SleepHybrid);
        let mut worst = Duration::ZERO;
        for _ in 0..20 {
            let deadline = Instant::now() + Duration::from_millis(1);
            wait.wait_until(deadline);
            worst = worst.max(Instant::now() - deadline);
        }
        assert!(worst < Duration::from_millis(20), "worst overshoot {:?}", worst);
    }

    #[test]
    fn test_wait_for() {
        let wait = PrecisionWait::new(TimerStrategy::BusyWait);
        let start = Instant::now();
        wait.wait_for(Duration::from_micros(300));
        assert!(start.elapsed() >= Duration::from_micros(300));
    }
}
