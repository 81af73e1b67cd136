//! 发送帧与帧键
//!
//! 帧键是 64 位复合键：`type:16 | group:16 | message_id:32`。
//! 高 16 位区分协议类型，中间 16 位区分通道/分组，低 32 位是报文 ID，
//! 因此可以按类型或按（类型, 分组）批量清除。

use bytes::Bytes;
use std::fmt;

/// 默认发送周期（ms）
pub const DEFAULT_PERIOD_MS: u32 = 50;

/// 64 位复合帧键
///
/// ```
/// use cyclic_sender::FrameKey;
///
/// let key = FrameKey::new(0x01, 0x0001, 0x0000_0001);
/// assert_eq!(key.raw(), 0x0001_0001_0000_0001);
/// assert_eq!(key.frame_type(), 0x01);
/// assert_eq!(key.group(), 0x0001);
/// assert_eq!(key.message_id(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameKey(u64);

impl FrameKey {
    /// 由（类型, 分组, 报文 ID）组合
    pub const fn new(frame_type: u16, group: u16, message_id: u32) -> Self {
        Self(((frame_type as u64) << 48) | ((group as u64) << 32) | message_id as u64)
    }

    /// 从原始 64 位值构造
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始 64 位值
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// 高 16 位：类型
    pub const fn frame_type(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// 中间 16 位：分组
    pub const fn group(self) -> u16 {
        (self.0 >> 32) as u16
    }

    /// 低 32 位：报文 ID
    pub const fn message_id(self) -> u32 {
        self.0 as u32
    }

    /// 某个类型下所有键的闭区间
    pub(crate) fn type_bounds(frame_type: u16) -> (Self, Self) {
        (
            Self::new(frame_type, 0, 0),
            Self::new(frame_type, u16::MAX, u32::MAX),
        )
    }

    /// 某个（类型, 分组）下所有键的闭区间
    pub(crate) fn group_bounds(frame_type: u16, group: u16) -> (Self, Self) {
        (
            Self::new(frame_type, group, 0),
            Self::new(frame_type, group, u32::MAX),
        )
    }
}

impl From<u64> for FrameKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<FrameKey> for u64 {
    fn from(key: FrameKey) -> Self {
        key.0
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}:{:04X}:{:08X}",
            self.frame_type(),
            self.group(),
            self.message_id()
        )
    }
}

/// 待发送的帧
///
/// `delay_ms` 在周期发送器中是相对插入时刻的绝对相位偏移，
/// 在序列发送器中是该帧之前的间隔。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFrame {
    pub key: FrameKey,
    pub data: Bytes,
    pub period_ms: u32,
    pub delay_ms: u32,
}

impl SendFrame {
    /// 创建帧（周期 50ms，无延迟）
    pub fn new(key: FrameKey, data: impl Into<Bytes>) -> Self {
        Self {
            key,
            data: data.into(),
            period_ms: DEFAULT_PERIOD_MS,
            delay_ms: 0,
        }
    }

    /// 设置周期
    pub fn with_period(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms;
        self
    }

    /// 设置延迟
    pub fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// 每次发送回调携带的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendContext {
    /// 正在发送的帧
    pub key: FrameKey,
    /// 发送时的 tick（1 tick = 1ms）
    pub tick: u64,
}
