//! 周期发送器
//!
//! 一个定时器线程（1ms tick）承载任意数量的帧，每帧有独立的周期和相位偏移。
//!
//! # 调度
//!
//! 每帧保存一个原子的目标 tick。tick `c` 时在帧表读锁下扫描：
//! - `target <= c` 的帧调用一次发送回调，然后 `target += period`
//! - 如果仍然 `target <= c`（回调阻塞导致落后），直接对齐到 `c + period`，
//!   不做突发补发，错过的时隙计入 `slots_dropped`
//!
//! 在 tick `c` 插入延迟为 `d` 的帧，首次目标是 `c + d`。
//! 每次（重新）启动时所有目标重置为各自的 `delay`。
//!
//! # 生命周期
//!
//! 第一次成功添加帧时自动启动；删除/清空使帧表为空时自动停止。
//! 也可以显式 [`PeriodSender::start`] / [`PeriodSender::stop`]。

use crate::error::SenderError;
use crate::frame::{FrameKey, SendContext, SendFrame};
use crate::metrics::{SenderMetrics, SenderMetricsSnapshot};
use crate::sink::Sink;
use arc_swap::ArcSwap;
use bytes::Bytes;
use cyclic_timing::{CallbackTimer, TimerStrategy};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// 默认发送缓冲区大小（单帧数据上限）
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 8192;
/// 发送缓冲区下限
pub const MIN_SEND_BUFFER_SIZE: usize = 256;
/// 发送缓冲区上限
pub const MAX_SEND_BUFFER_SIZE: usize = 65536;
/// 默认最大帧数
pub const DEFAULT_MAX_FRAMES: usize = 255;
/// 最大帧数上限
pub const MAX_FRAMES_LIMIT: usize = 1024;

/// 发送器 tick 间隔：1ms
pub(crate) const TICK_INTERVAL_US: u64 = 1000;

/// 连续发送错误时每隔多少次打一条 warn
pub(crate) const ERROR_LOG_INTERVAL: u64 = 1000;

/// 帧表中的一项
struct FrameSlot {
    /// 运行中可替换，读侧无锁
    data: ArcSwap<Bytes>,
    period: u64,
    delay: u64,
    next_target: AtomicU64,
    /// 插入（或重新启动）时的 tick；之后的第一个 tick 才能发送
    armed_at: AtomicU64,
}

impl FrameSlot {
    fn new(frame: SendFrame, now: u64) -> Self {
        let delay = u64::from(frame.delay_ms);
        Self {
            data: ArcSwap::from_pointee(frame.data),
            period: u64::from(frame.period_ms),
            delay,
            next_target: AtomicU64::new(now + delay),
            armed_at: AtomicU64::new(now),
        }
    }

    /// 从 `target` 落后到 `tick` 时跳过的时隙数
    ///
    /// 插入时刻及之前的网格点本来就无法发送，不计入。
    fn skipped_slots(&self, target: u64, tick: u64) -> u64 {
        let first_due = self.armed_at.load(Ordering::Acquire) + 1;
        tick.saturating_sub(target.max(first_due)) / self.period
    }
}

/// 定时器线程与 API 共享的状态
struct PeriodShared {
    frames: RwLock<BTreeMap<FrameKey, FrameSlot>>,
    sink: RwLock<Option<Sink>>,
    /// `stop()` 清除；回调在扫描中途看到后立即退出
    active: AtomicBool,
    metrics: SenderMetrics,
}

impl PeriodShared {
    fn new() -> Self {
        Self {
            frames: RwLock::new(BTreeMap::new()),
            sink: RwLock::new(None),
            active: AtomicBool::new(false),
            metrics: SenderMetrics::new(),
        }
    }

    /// tick 处理：返回非 0 让定时器停止
    fn on_tick(&self, tick: u64) -> i32 {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);

        let Some(sink) = self.sink.read().clone() else {
            return 0;
        };

        let frames = self.frames.read();
        for (key, slot) in frames.iter() {
            if !self.active.load(Ordering::Acquire) {
                return 1;
            }

            let target = slot.next_target.load(Ordering::Acquire);
            if target > tick {
                continue;
            }

            let data = slot.data.load();
            let payload: &[u8] = &data;
            let rc = sink(payload, &SendContext { key: *key, tick });
            if rc < 0 {
                let errors = self.metrics.sink_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if errors == 1 || errors % ERROR_LOG_INTERVAL == 0 {
                    warn!(
                        "Sink returned {} for frame {} at tick {} ({} errors total)",
                        rc, key, tick, errors
                    );
                }
            } else {
                self.metrics.frames_sent.fetch_add(1, Ordering::Relaxed);
            }

            let mut next = target + slot.period;
            if next <= tick {
                let dropped = slot.skipped_slots(target, tick);
                self.metrics.slots_dropped.fetch_add(dropped, Ordering::Relaxed);
                next = tick + slot.period;
            }
            slot.next_target.store(next, Ordering::Release);
        }

        if self.active.load(Ordering::Acquire) { 0 } else { 1 }
    }

    /// 所有目标重置为各自的 delay
    fn rebase(&self) {
        for slot in self.frames.read().values() {
            slot.armed_at.store(0, Ordering::Release);
            slot.next_target.store(slot.delay, Ordering::Release);
        }
    }
}

/// 周期发送器
///
/// # Example
///
/// ```no_run
/// use cyclic_sender::{FrameKey, PeriodSender, SendFrame};
///
/// let sender = PeriodSender::new();
/// sender.set_sink(|data, ctx| {
///     println!("{} -> {:02X?}", ctx.key, data);
///     0
/// });
///
/// // 第一次添加后自动开始发送
/// let key = FrameKey::new(0x01, 0x0001, 0x123);
/// sender
///     .add_frame(SendFrame::new(key, vec![0x01, 0x02]).with_period(100))
///     .unwrap();
///
/// sender.update_data(key, vec![0x03, 0x04]).unwrap();
/// sender.remove_frame(key); // 帧表为空，自动停止
/// ```
pub struct PeriodSender {
    shared: Arc<PeriodShared>,
    timer: CallbackTimer,
    /// 串行化自动启停，避免并发 add/remove 交错
    lifecycle: Mutex<()>,
    send_buffer_size: AtomicUsize,
    max_frames: AtomicUsize,
}

impl PeriodSender {
    /// 创建发送器（惰性，不创建线程）
    pub fn new() -> Self {
        let shared = Arc::new(PeriodShared::new());
        let timer = CallbackTimer::with_name("period-sender");

        let tick_shared = Arc::clone(&shared);
        timer.set_callback(move |tick| tick_shared.on_tick(tick));

        Self {
            shared,
            timer,
            lifecycle: Mutex::new(()),
            send_buffer_size: AtomicUsize::new(DEFAULT_SEND_BUFFER_SIZE),
            max_frames: AtomicUsize::new(DEFAULT_MAX_FRAMES),
        }
    }

    /// 设置发送回调
    pub fn set_sink<F>(&self, sink: F)
    where
        F: Fn(&[u8], &SendContext) -> i32 + Send + Sync + 'static,
    {
        *self.shared.sink.write() = Some(Arc::new(sink));
    }

    /// 设置已经包装好的发送回调（如 [`crate::UdpSink::into_sink`]）
    pub fn set_shared_sink(&self, sink: Sink) {
        *self.shared.sink.write() = Some(sink);
    }

    /// 设置发送缓冲区大小（单帧数据上限），范围 `[256, 65536]`
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SenderError> {
        if self.is_running() {
            return Err(SenderError::Busy);
        }
        check_range("send buffer size", size, MIN_SEND_BUFFER_SIZE, MAX_SEND_BUFFER_SIZE)?;
        self.send_buffer_size.store(size, Ordering::Relaxed);
        Ok(())
    }

    /// 设置最大帧数，范围 `[1, 1024]`
    pub fn set_max_frames(&self, max: usize) -> Result<(), SenderError> {
        if self.is_running() {
            return Err(SenderError::Busy);
        }
        check_range("max frames", max, 1, MAX_FRAMES_LIMIT)?;
        self.max_frames.store(max, Ordering::Relaxed);
        Ok(())
    }

    /// 当前发送缓冲区大小
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size.load(Ordering::Relaxed)
    }

    /// 当前最大帧数
    pub fn max_frames(&self) -> usize {
        self.max_frames.load(Ordering::Relaxed)
    }

    /// 设置定时器等待策略（运行中也可以切换）
    pub fn set_timer_strategy(&self, strategy: TimerStrategy) {
        self.timer.set_strategy(strategy);
    }

    /// 启用/禁用定时器线程绑核（下一次启动生效）
    pub fn enable_cpu_affinity(&self, enabled: bool) {
        self.timer.set_cpu_affinity(enabled);
    }

    /// 添加（或按键替换）一帧
    pub fn add_frame(&self, frame: SendFrame) -> Result<usize, SenderError> {
        self.add_frames(std::iter::once(frame))
    }

    /// 批量添加（或替换）帧
    ///
    /// 替换会覆盖数据、周期和延迟，并重置该帧的调度。整批要么全部生效，要么全部不生效。
    /// 返回本批次的帧数。
    ///
    /// # 错误
    ///
    /// - [`SenderError::NoSink`]：未设置发送回调
    /// - [`SenderError::InvalidFrame`]：周期为 0 或数据超出发送缓冲区
    /// - [`SenderError::Capacity`]：帧表会超过最大帧数
    pub fn add_frames(
        &self,
        frames: impl IntoIterator<Item = SendFrame>,
    ) -> Result<usize, SenderError> {
        let frames: Vec<SendFrame> = frames.into_iter().collect();
        if frames.is_empty() {
            return Ok(0);
        }
        if self.shared.sink.read().is_none() {
            return Err(SenderError::NoSink);
        }

        let buffer_size = self.send_buffer_size();
        for frame in &frames {
            validate_frame(frame, buffer_size)?;
        }

        let _lifecycle = self.lifecycle.lock();
        let count = frames.len();
        {
            let mut map = self.shared.frames.write();

            let limit = self.max_frames();
            let fresh = frames
                .iter()
                .map(|f| f.key)
                .filter(|key| !map.contains_key(key))
                .collect::<BTreeSet<_>>()
                .len();
            if map.len() + fresh > limit {
                return Err(SenderError::Capacity { limit });
            }

            let now = self.current_tick();
            for frame in frames {
                debug!(
                    "Add frame {} (period {}ms, delay {}ms, {} bytes) at tick {}",
                    frame.key,
                    frame.period_ms,
                    frame.delay_ms,
                    frame.data.len(),
                    now
                );
                map.insert(frame.key, FrameSlot::new(frame, now));
            }
        }

        self.ensure_running()?;
        Ok(count)
    }

    /// 只替换数据，调度不变
    ///
    /// 返回 `false` 表示键不存在。新数据最迟在该帧的下一次发送生效。
    pub fn update_data(&self, key: FrameKey, data: impl Into<Bytes>) -> Result<bool, SenderError> {
        let data = data.into();
        let buffer_size = self.send_buffer_size();
        if data.len() > buffer_size {
            return Err(SenderError::InvalidFrame(format!(
                "frame {} data is {} bytes, send buffer is {}",
                key,
                data.len(),
                buffer_size
            )));
        }

        match self.shared.frames.read().get(&key) {
            Some(slot) => {
                slot.data.store(Arc::new(data));
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// 删除一帧；帧表变空时停止定时器
    pub fn remove_frame(&self, key: FrameKey) -> bool {
        let _lifecycle = self.lifecycle.lock();
        let (removed, empty) = {
            let mut map = self.shared.frames.write();
            let removed = map.remove(&key).is_some();
            (removed, map.is_empty())
        };
        if removed {
            debug!("Removed frame {}", key);
            if empty {
                self.halt();
            }
        }
        removed
    }

    /// 清空所有帧并停止；返回删除的帧数
    pub fn clear(&self) -> usize {
        self.clear_range(FrameKey::from_raw(0), FrameKey::from_raw(u64::MAX))
    }

    /// 清除某个类型（键的高 16 位）下的所有帧
    pub fn clear_type(&self, frame_type: u16) -> usize {
        let (lo, hi) = FrameKey::type_bounds(frame_type);
        self.clear_range(lo, hi)
    }

    /// 清除某个（类型, 分组）（键的高 32 位）下的所有帧
    pub fn clear_group(&self, frame_type: u16, group: u16) -> usize {
        let (lo, hi) = FrameKey::group_bounds(frame_type, group);
        self.clear_range(lo, hi)
    }

    /// 显式启动（需要至少一帧）；已在运行时为空操作
    pub fn start(&self) -> Result<(), SenderError> {
        if self.shared.sink.read().is_none() {
            return Err(SenderError::NoSink);
        }
        let _lifecycle = self.lifecycle.lock();
        if self.shared.frames.read().is_empty() {
            return Err(SenderError::EmptyQueue);
        }
        self.ensure_running()
    }

    /// 停止发送（幂等）
    ///
    /// 可以在发送回调内部调用：当前 tick 不再发送剩余帧，线程在之后回收。
    /// 帧表保留，下一次添加或 `start()` 时从各帧的 delay 重新开始。
    pub fn stop(&self) {
        self.halt();
    }

    /// 是否在发送
    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::Acquire) && self.timer.is_running()
    }

    /// 当前 tick 计数（每次启动从 0 开始）
    pub fn tick_count(&self) -> u64 {
        self.timer.tick_count()
    }

    /// 帧数量
    pub fn len(&self) -> usize {
        self.shared.frames.read().len()
    }

    /// 帧表是否为空
    pub fn is_empty(&self) -> bool {
        self.shared.frames.read().is_empty()
    }

    /// 是否包含某帧
    pub fn contains(&self, key: FrameKey) -> bool {
        self.shared.frames.read().contains_key(&key)
    }

    /// 发送指标快照
    pub fn metrics(&self) -> SenderMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn current_tick(&self) -> u64 {
        if self.timer.is_running() {
            self.timer.tick_count()
        } else {
            0
        }
    }

    /// 调用方持有 `lifecycle`
    fn ensure_running(&self) -> Result<(), SenderError> {
        if self.is_running() {
            return Ok(());
        }

        // 回收回调内部自停止留下的线程，之后才能安全重置目标
        self.timer.stop();
        self.shared.rebase();
        self.shared.active.store(true, Ordering::Release);

        if let Err(e) = self.timer.start(TICK_INTERVAL_US) {
            self.shared.active.store(false, Ordering::Release);
            return Err(e.into());
        }
        info!("Period sender started with {} frames", self.len());
        Ok(())
    }

    fn halt(&self) {
        if self.shared.active.swap(false, Ordering::AcqRel) {
            info!("Period sender stopped");
        }
        self.timer.stop();
    }

    fn clear_range(&self, lo: FrameKey, hi: FrameKey) -> usize {
        let _lifecycle = self.lifecycle.lock();
        let (removed, empty) = {
            let mut map = self.shared.frames.write();
            let before = map.len();
            map.retain(|key, _| *key < lo || *key > hi);
            (before - map.len(), map.is_empty())
        };
        if removed > 0 {
            debug!("Cleared {} frames in {}..={}", removed, lo, hi);
        }
        if empty {
            self.halt();
        }
        removed
    }
}

impl Default for PeriodSender {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PeriodSender {
    fn drop(&mut self) {
        self.halt();
    }
}

impl std::fmt::Debug for PeriodSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodSender")
            .field("frames", &self.len())
            .field("running", &self.is_running())
            .field("tick_count", &self.tick_count())
            .finish()
    }
}

fn check_range(what: &'static str, value: usize, min: usize, max: usize) -> Result<(), SenderError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SenderError::OutOfRange {
            what,
            value,
            min,
            max,
        })
    }
}

fn validate_frame(frame: &SendFrame, buffer_size: usize) -> Result<(), SenderError> {
    if frame.period_ms == 0 {
        return Err(SenderError::InvalidFrame(format!(
            "frame {} has period 0",
            frame.key
        )));
    }
    if frame.data.len() > buffer_size {
        return Err(SenderError::InvalidFrame(format!(
            "frame {} data is {} bytes, send buffer is {}",
            frame.key,
            frame.data.len(),
            buffer_size
        )));
    }
    Ok(())
}
