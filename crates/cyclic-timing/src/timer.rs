//! 高精度回调定时器
//!
//! 一个定时器只驱动一个回调（单一职责），回调在专用线程上按固定间隔执行。
//!
//! # 时间模型
//!
//! 第 k 个 tick 的截止时间是 `start + k * interval`，由起点推导而不是由"现在"推导，
//! 因此单次迭代的抖动不会累积（无漂移）。
//!
//! 回调超时（overrun）时：
//! - 只落后一个 tick：下一个 tick 立即执行（背靠背一次）
//! - 落后多个 tick：跳过错过的网格点，只补一次，然后重新对齐
//!
//! tick 计数器每次回调前加一，回调拿到的是新值（第一次回调看到 1），
//! 因此计数严格递增且无空洞，与跳过的网格点无关。

use crate::affinity::{AffinityGuard, SystemCpuAffinity};
use crate::error::TimerError;
use crate::strategy::{AtomicTimerStrategy, TimerStrategy};
use crate::wait::PrecisionWait;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// 默认间隔：1ms
pub const DEFAULT_INTERVAL_US: u64 = 1000;

/// 定时器回调
///
/// 参数是当前 tick 计数；返回 0 继续，非 0 停止定时器。
pub type TimerCallback = Arc<dyn Fn(u64) -> i32 + Send + Sync>;

/// 定时器线程与外部共享的状态
#[derive(Debug, Default)]
struct TimerShared {
    running: AtomicBool,
    /// 每次 start 递增；旧线程发现代数变化后退出
    generation: AtomicU64,
    tick_count: AtomicU64,
    overruns: AtomicU64,
    strategy: AtomicTimerStrategy,
}

impl TimerShared {
    #[inline]
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }
}

/// 定时器线程句柄及其所属的代
struct TimerThread {
    generation: u64,
    handle: JoinHandle<()>,
}

/// 高精度回调定时器
///
/// # 状态机
///
/// `Idle → Running → Stopping → Idle`，由原子标志守护。
///
/// # 线程安全
///
/// 所有方法都只需要 `&self`，可以放进 `Arc` 在任意线程调用。
/// `stop()` 可以在回调内部调用：此时只请求停止，join 推迟到下一次
/// 从其他线程调用 `stop()`/`start()` 或 `Drop`。
///
/// # Example
///
/// ```
/// use cyclic_timing::CallbackTimer;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// let timer = CallbackTimer::new();
/// let last = Arc::new(AtomicU64::new(0));
/// let last_cb = last.clone();
/// timer.set_callback(move |tick| {
///     last_cb.store(tick, Ordering::Relaxed);
///     if tick >= 5 { 1 } else { 0 }
/// });
/// timer.start(500).unwrap();
/// std::thread::sleep(std::time::Duration::from_millis(50));
/// timer.stop();
/// assert_eq!(last.load(Ordering::Relaxed), 5);
/// ```
pub struct CallbackTimer {
    shared: Arc<TimerShared>,
    callback: Mutex<Option<TimerCallback>>,
    thread: Mutex<Option<TimerThread>>,
    cpu_affinity: AtomicBool,
    name: String,
}

impl CallbackTimer {
    /// 创建定时器（惰性，不创建线程）
    pub fn new() -> Self {
        Self::with_name("cyclic-timer")
    }

    /// 创建带线程名的定时器
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(TimerShared::default()),
            callback: Mutex::new(None),
            thread: Mutex::new(None),
            cpu_affinity: AtomicBool::new(false),
            name: name.into(),
        }
    }

    /// 设置回调
    ///
    /// 运行中设置的回调从下一次 `start()` 开始生效。
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(u64) -> i32 + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Arc::new(callback));
    }

    /// 设置等待策略（运行中也可以切换，下一个 tick 生效）
    pub fn set_strategy(&self, strategy: TimerStrategy) {
        self.shared.strategy.set(strategy, Ordering::Relaxed);
    }

    /// 当前等待策略
    pub fn strategy(&self) -> TimerStrategy {
        self.shared.strategy.get(Ordering::Relaxed)
    }

    /// 启用/禁用 CPU 亲和性（下一次 `start()` 生效）
    ///
    /// 启用后定时器线程启动时绑定到最空闲的核心，退出时恢复。
    pub fn set_cpu_affinity(&self, enabled: bool) {
        self.cpu_affinity.store(enabled, Ordering::Relaxed);
    }

    /// 启动定时器
    ///
    /// # 错误
    ///
    /// - [`TimerError::InvalidInterval`]：间隔为 0
    /// - [`TimerError::NoCallback`]：未设置回调
    /// - [`TimerError::AlreadyRunning`]：已在运行
    /// - [`TimerError::Spawn`]：线程创建失败
    pub fn start(&self, interval_us: u64) -> Result<(), TimerError> {
        if interval_us == 0 {
            return Err(TimerError::InvalidInterval(interval_us));
        }
        let callback = self.callback.lock().clone().ok_or(TimerError::NoCallback)?;

        let (generation, previous) = {
            let mut thread_slot = self.thread.lock();
            if self
                .shared
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(TimerError::AlreadyRunning);
            }
            // 先换代，旧线程看到代数变化后退出，之后才能安全 join
            let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
            (generation, thread_slot.take())
        };

        // 回收上一次运行（可能是回调内部自停止留下的句柄）；join 时不持有锁
        if let Some(previous) = previous
            && previous.handle.thread().id() != thread::current().id()
        {
            let _ = previous.handle.join();
        }

        self.shared.tick_count.store(0, Ordering::Release);
        self.shared.overruns.store(0, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_micros(interval_us);
        let pin_cpu = self.cpu_affinity.load(Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || timer_loop(shared, callback, interval, generation, pin_cpu));

        match spawned {
            Ok(handle) => {
                let mut thread_slot = self.thread.lock();
                // 期间若有 stop() + start() 换代，本线程会自行退出，不覆盖新句柄
                if self.shared.generation.load(Ordering::Acquire) == generation {
                    *thread_slot = Some(TimerThread { generation, handle });
                }
                drop(thread_slot);
                debug!("Timer '{}' started, interval {}us", self.name, interval_us);
                Ok(())
            },
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                error!("Failed to spawn timer thread '{}': {}", self.name, e);
                Err(TimerError::Spawn(e))
            },
        }
    }

    /// 停止定时器（幂等）
    ///
    /// 从其他线程调用时等待定时器线程退出；从回调内部调用时只请求停止。
    pub fn stop(&self) {
        // 与 start() 在同一把锁下修改 running，并发的 start() 不会把新线程交给这里 join
        let timer_thread = {
            let mut thread_slot = self.thread.lock();
            self.shared.running.store(false, Ordering::Release);
            match thread_slot.take() {
                Some(timer_thread) if timer_thread.handle.thread().id() == thread::current().id() => {
                    // 自停止：不能 join 自己，句柄留给之后回收
                    *thread_slot = Some(timer_thread);
                    trace!("Timer '{}' stop requested from its own thread", self.name);
                    return;
                },
                Some(timer_thread) => timer_thread,
                None => return,
            }
        };

        // running 已在锁内清除，之后的 start() 必然换代，该线程一定会退出
        trace!("Joining timer '{}' generation {}", self.name, timer_thread.generation);
        if timer_thread.handle.join().is_err() {
            error!("Timer thread '{}' terminated abnormally", self.name);
        }
        debug!("Timer '{}' stopped", self.name);
    }

    /// 是否在运行（任意线程可读）
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// 当前 tick 计数（每次 start 重置为 0）
    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count.load(Ordering::Acquire)
    }

    /// 因回调超时被跳过的网格点数量
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

impl Default for CallbackTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallbackTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CallbackTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTimer")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("tick_count", &self.tick_count())
            .field("strategy", &self.strategy())
            .finish()
    }
}

/// 定时器线程主循环
fn timer_loop(
    shared: Arc<TimerShared>,
    callback: TimerCallback,
    interval: Duration,
    generation: u64,
    pin_cpu: bool,
) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::{info, warn};

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Timer thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set timer thread priority: {:?}. \
                 On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            ),
        }
    }

    let _affinity = pin_cpu.then(|| AffinityGuard::pin_least_busy(SystemCpuAffinity::new()));

    let interval_ns = interval.as_nanos().max(1);
    let start = Instant::now();
    let mut k: u64 = 0;

    loop {
        if !shared.is_current(generation) {
            break;
        }

        k += 1;
        let deadline = start + deadline_offset(interval, k);
        PrecisionWait::new(shared.strategy.get(Ordering::Relaxed)).wait_until(deadline);

        if !shared.is_current(generation) {
            break;
        }

        // Release：回调之外的读者（如 add_frame）看到的计数不早于本次回调
        let tick = shared.tick_count.fetch_add(1, Ordering::AcqRel) + 1;

        match panic::catch_unwind(AssertUnwindSafe(|| callback(tick))) {
            Ok(0) => {},
            Ok(code) => {
                debug!("Timer callback returned {} at tick {}, stopping", code, tick);
                break;
            },
            Err(_) => {
                error!("Timer callback panicked at tick {}, stopping", tick);
                break;
            },
        }

        // 超时处理：落后多于一个 tick 时跳过中间的网格点
        let elapsed_slots = (Instant::now().duration_since(start).as_nanos() / interval_ns) as u64;
        if elapsed_slots > k + 1 {
            let skipped = elapsed_slots - 1 - k;
            shared.overruns.fetch_add(skipped, Ordering::Relaxed);
            trace!("Timer overrun at tick {}: skipping {} slots", tick, skipped);
            k = elapsed_slots - 1;
        }
    }

    if shared.generation.load(Ordering::Acquire) == generation {
        shared.running.store(false, Ordering::Release);
    }
}

/// 第 `n` 个截止时间相对起点的偏移（`Duration` 只实现了 `* u32`）
#[inline]
fn deadline_offset(interval: Duration, n: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(n as u128);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
