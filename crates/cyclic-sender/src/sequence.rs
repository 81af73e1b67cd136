//! 序列发送器
//!
//! 按顺序播放一个帧脚本：帧之间按各自的 `delay_ms` 间隔，
//! 每轮结束后等待 `round_end_delay_ms`，可有限次或无限重复。
//!
//! # 调度（1ms tick）
//!
//! 启动时 `next = frames[0].delay`。tick `c >= next` 时发送 `frames[i]`，`i += 1`：
//! - 轮内：`next = c + frames[i].delay`
//! - 轮末：`round += 1`；非无限且 `round >= repeat_count` 时完成；
//!   否则 `i = 0`，`next = c + round_end_delay + frames[0].delay`
//!
//! # 完成回调
//!
//! 每次运行最多触发一次：`0` 正常完成，`-1` 用户停止，`-2` 发送失败
//! （回调返回负值或 panic）。

use crate::error::SenderError;
use crate::frame::{FrameKey, SendContext, SendFrame};
use crate::metrics::{SenderMetrics, SenderMetricsSnapshot};
use crate::period::TICK_INTERVAL_US;
use crate::sink::Sink;
use bytes::Bytes;
use cyclic_timing::{CallbackTimer, TimerStrategy};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, error, info};

/// 完成码：正常完成
pub const EXIT_COMPLETED: i32 = 0;
/// 完成码：用户停止
pub const EXIT_STOPPED: i32 = -1;
/// 完成码：发送失败
pub const EXIT_SINK_FAILED: i32 = -2;

/// 完成回调
pub type Completion = Arc<dyn Fn(i32) + Send + Sync>;

/// 序列配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceConfig {
    /// 无限重复
    pub is_forever: bool,
    /// 重复次数（非无限时，0 按 1 处理）
    pub repeat_count: u32,
    /// 每轮结束后的间隔（ms）
    pub round_end_delay_ms: u32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            is_forever: false,
            repeat_count: 1,
            round_end_delay_ms: 10,
        }
    }
}

impl SequenceConfig {
    fn rounds(&self) -> Option<u32> {
        (!self.is_forever).then(|| self.repeat_count.max(1))
    }
}

/// 定时器线程私有的游标
#[derive(Debug, Default)]
struct Cursor {
    index: usize,
    next_send_tick: u64,
    config: SequenceConfig,
}

/// tick 处理的结果
enum Step {
    Continue,
    Finished(i32),
}

struct SequenceShared {
    frames: RwLock<Vec<SendFrame>>,
    sink: RwLock<Option<Sink>>,
    completion: Mutex<Option<Completion>>,
    cursor: Mutex<Cursor>,
    current_round: AtomicU32,
    active: AtomicBool,
    /// 本次运行已经触发过完成回调
    completed: AtomicBool,
    metrics: SenderMetrics,
}

impl SequenceShared {
    fn new() -> Self {
        Self {
            frames: RwLock::new(Vec::new()),
            sink: RwLock::new(None),
            completion: Mutex::new(None),
            cursor: Mutex::new(Cursor::default()),
            current_round: AtomicU32::new(0),
            active: AtomicBool::new(false),
            completed: AtomicBool::new(true),
            metrics: SenderMetrics::new(),
        }
    }

    fn on_tick(&self, tick: u64) -> i32 {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        if !self.active.load(Ordering::Acquire) {
            return 1;
        }

        match self.step(tick) {
            Step::Continue => 0,
            Step::Finished(code) => {
                self.active.store(false, Ordering::Release);
                self.complete(code);
                1
            },
        }
    }

    fn step(&self, tick: u64) -> Step {
        let Some(sink) = self.sink.read().clone() else {
            return Step::Finished(EXIT_SINK_FAILED);
        };

        let mut cursor = self.cursor.lock();
        if tick < cursor.next_send_tick {
            return Step::Continue;
        }

        let frames = self.frames.read();
        if frames.is_empty() {
            return Step::Finished(EXIT_COMPLETED);
        }
        let frame = &frames[cursor.index];
        let ctx = SendContext {
            key: frame.key,
            tick,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| sink(&frame.data[..], &ctx))) {
            Ok(rc) if rc >= 0 => {
                self.metrics.frames_sent.fetch_add(1, Ordering::Relaxed);
            },
            Ok(rc) => {
                self.metrics.sink_errors.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Sequence sink returned {} for frame {} (index {}), aborting",
                    rc, frame.key, cursor.index
                );
                return Step::Finished(EXIT_SINK_FAILED);
            },
            Err(_) => {
                self.metrics.sink_errors.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Sequence sink panicked for frame {} (index {}), aborting",
                    frame.key, cursor.index
                );
                return Step::Finished(EXIT_SINK_FAILED);
            },
        }

        cursor.index += 1;
        if cursor.index < frames.len() {
            cursor.next_send_tick = tick + u64::from(frames[cursor.index].delay_ms);
            return Step::Continue;
        }

        let round = self.current_round.fetch_add(1, Ordering::AcqRel) + 1;
        if cursor.config.rounds().is_some_and(|rounds| round >= rounds) {
            debug!("Sequence finished after {} rounds", round);
            return Step::Finished(EXIT_COMPLETED);
        }

        cursor.index = 0;
        cursor.next_send_tick = tick
            + u64::from(cursor.config.round_end_delay_ms)
            + u64::from(frames[0].delay_ms);
        Step::Continue
    }

    /// 触发完成回调（每次运行最多一次，调用时不持有内部锁）
    fn complete(&self, code: i32) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Sequence completed with code {}", code);
        let completion = self.completion.lock().clone();
        if let Some(completion) = completion {
            completion(code);
        }
    }
}

/// 序列发送器
///
/// # Example
///
/// ```no_run
/// use cyclic_sender::{FrameKey, SendFrame, SequenceConfig, SequenceSender};
///
/// let sender = SequenceSender::new();
/// sender.set_sink(|data, _ctx| data.len() as i32);
/// sender.set_completion(|code| println!("sequence done: {code}"));
/// sender.set_config(SequenceConfig {
///     is_forever: false,
///     repeat_count: 2,
///     round_end_delay_ms: 100,
/// });
///
/// let frames = (0..3)
///     .map(|i| SendFrame::new(FrameKey::new(1, 0, i), vec![i as u8]).with_delay(20))
///     .collect();
/// sender.start(frames).unwrap();
/// ```
pub struct SequenceSender {
    shared: Arc<SequenceShared>,
    timer: CallbackTimer,
    config: Mutex<SequenceConfig>,
    lifecycle: Mutex<()>,
}

impl SequenceSender {
    /// 创建发送器（惰性，不创建线程）
    pub fn new() -> Self {
        let shared = Arc::new(SequenceShared::new());
        let timer = CallbackTimer::with_name("sequence-sender");

        let tick_shared = Arc::clone(&shared);
        timer.set_callback(move |tick| tick_shared.on_tick(tick));

        Self {
            shared,
            timer,
            config: Mutex::new(SequenceConfig::default()),
            lifecycle: Mutex::new(()),
        }
    }

    /// 设置发送回调；返回负值会中止序列（完成码 -2）
    pub fn set_sink<F>(&self, sink: F)
    where
        F: Fn(&[u8], &SendContext) -> i32 + Send + Sync + 'static,
    {
        *self.shared.sink.write() = Some(Arc::new(sink));
    }

    /// 设置已经包装好的发送回调
    pub fn set_shared_sink(&self, sink: Sink) {
        *self.shared.sink.write() = Some(sink);
    }

    /// 设置完成回调
    ///
    /// 正常完成和发送失败时在定时器线程上调用，用户停止时在调用 `stop()` 的线程上调用。
    pub fn set_completion<F>(&self, completion: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        *self.shared.completion.lock() = Some(Arc::new(completion));
    }

    /// 设置重复配置（下一次 `start()` 生效）
    pub fn set_config(&self, config: SequenceConfig) {
        *self.config.lock() = config;
    }

    /// 当前配置
    pub fn config(&self) -> SequenceConfig {
        *self.config.lock()
    }

    /// 设置定时器等待策略
    pub fn set_timer_strategy(&self, strategy: TimerStrategy) {
        self.timer.set_strategy(strategy);
    }

    /// 启用/禁用定时器线程绑核（下一次启动生效）
    pub fn enable_cpu_affinity(&self, enabled: bool) {
        self.timer.set_cpu_affinity(enabled);
    }

    /// 开始播放
    ///
    /// # 错误
    ///
    /// - [`SenderError::Busy`]：上一次运行尚未结束
    /// - [`SenderError::EmptyQueue`]：队列为空
    /// - [`SenderError::NoSink`]：未设置发送回调
    pub fn start(&self, frames: Vec<SendFrame>) -> Result<(), SenderError> {
        let _lifecycle = self.lifecycle.lock();
        if self.shared.active.load(Ordering::Acquire) {
            return Err(SenderError::Busy);
        }
        if frames.is_empty() {
            return Err(SenderError::EmptyQueue);
        }
        if self.shared.sink.read().is_none() {
            return Err(SenderError::NoSink);
        }

        // 回收上一次运行的线程（可能刚在回调里结束）
        self.timer.stop();

        let config = self.config();
        let count = frames.len();
        *self.shared.cursor.lock() = Cursor {
            index: 0,
            next_send_tick: u64::from(frames[0].delay_ms),
            config,
        };
        *self.shared.frames.write() = frames;
        self.shared.current_round.store(0, Ordering::Release);
        self.shared.completed.store(false, Ordering::Release);
        self.shared.active.store(true, Ordering::Release);

        if let Err(e) = self.timer.start(TICK_INTERVAL_US) {
            self.shared.active.store(false, Ordering::Release);
            self.shared.completed.store(true, Ordering::Release);
            return Err(e.into());
        }

        info!(
            "Sequence started: {} frames, {:?}",
            count, config
        );
        Ok(())
    }

    /// 停止播放（幂等）
    ///
    /// 运行未完成时以 `-1` 触发完成回调。可以在发送回调或完成回调内部调用。
    pub fn stop(&self) {
        let was_active = self.shared.active.swap(false, Ordering::AcqRel);
        self.timer.stop();
        if was_active {
            self.shared.complete(EXIT_STOPPED);
        }
    }

    /// 替换所有匹配帧的数据（不改变顺序）；返回替换的帧数
    pub fn update_data(&self, key: FrameKey, data: impl Into<Bytes>) -> usize {
        let data = data.into();
        let mut frames = self.shared.frames.write();
        let mut updated = 0;
        for frame in frames.iter_mut().filter(|f| f.key == key) {
            frame.data = data.clone();
            updated += 1;
        }
        updated
    }

    /// 是否在播放
    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// 已完成的轮数
    pub fn current_round(&self) -> u32 {
        self.shared.current_round.load(Ordering::Acquire)
    }

    /// 发送指标快照
    pub fn metrics(&self) -> SenderMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Default for SequenceSender {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SequenceSender {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SequenceSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceSender")
            .field("running", &self.is_running())
            .field("current_round", &self.current_round())
            .field("config", &self.config())
            .finish()
    }
}
