//! 命令定义和实现

pub mod check_log;
pub mod period;
pub mod sequence;

pub use check_log::CheckLogCommand;
pub use period::PeriodCommand;
pub use sequence::SequenceCommand;

use anyhow::{Context, Result};
use clap::Args;
use cyclic_sdk::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// 发送类命令的公共参数
#[derive(Args, Debug)]
pub struct TransportArgs {
    /// 任务文件（TOML，`.json` 扩展名按 JSON 解析）
    #[arg(short, long)]
    pub job: PathBuf,

    /// UDP 目标地址
    #[arg(short, long)]
    pub target: String,

    /// 本地绑定地址
    #[arg(long, default_value = "0.0.0.0:0")]
    pub bind: String,

    /// 定时器等待策略：auto / kernel / hybrid / busy
    #[arg(long, default_value = "auto")]
    pub strategy: TimerStrategy,

    /// 定时器线程绑定到负载最低的 CPU 核
    #[arg(long)]
    pub pin_cpu: bool,

    /// 记录每一帧的日志器配置，如 "--logDir ./logs --logTag TX"
    #[arg(long, allow_hyphen_values = true)]
    pub log: Option<String>,
}

impl TransportArgs {
    /// 连接 UDP 目标，按需启动帧记录
    pub fn open(&self) -> Result<(Sink, Option<Arc<AsyncLogger>>)> {
        let udp = UdpSink::connect(self.bind.as_str(), self.target.as_str())
            .with_context(|| format!("failed to connect UDP sink to {}", self.target))?;
        println!("✅ UDP {} -> {}", udp.local_addr()?, self.target);

        let recorder = match &self.log {
            Some(command) => Some(open_recorder(command)?),
            None => None,
        };
        Ok((recording_sink(udp, recorder.clone()), recorder))
    }
}

/// 按命令字符串启动日志器
pub fn open_recorder(command: &str) -> Result<Arc<AsyncLogger>> {
    let logger = AsyncLogger::new();
    logger
        .set_config(command)
        .with_context(|| format!("invalid logger config '{command}'"))?;
    logger.start().context("failed to start frame recorder")?;
    if let Some(path) = logger.current_log_path() {
        println!("📼 Recording frames to {}", path.display());
    }
    Ok(Arc::new(logger))
}

/// UDP 发送 + 可选的帧记录
fn recording_sink(udp: UdpSink, recorder: Option<Arc<AsyncLogger>>) -> Sink {
    Arc::new(move |data: &[u8], ctx: &SendContext| {
        let rc = udp.send(data);
        if let Some(logger) = &recorder {
            if rc >= 0 {
                logger.log_hex(&format!("{} ", ctx.key), data);
            } else {
                logger.log(&format!("{} send failed at tick {}", ctx.key, ctx.tick));
            }
        }
        rc
    })
}

/// 安装 Ctrl+C 处理，返回运行标志
pub fn install_stop_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        println!("\n收到退出信号，正在关闭...");
    })
    .context("failed to install Ctrl+C handler")?;
    Ok(running)
}

/// 等待 Ctrl+C、时长到达或 `finished()` 返回 true
pub fn wait_until(running: &AtomicBool, duration: Option<Duration>, finished: impl Fn() -> bool) {
    let start = Instant::now();
    while running.load(Ordering::SeqCst) && !finished() {
        if duration.is_some_and(|d| start.elapsed() >= d) {
            println!("⏱️  达到时长限制");
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// 打印发送统计
pub fn print_summary(metrics: SenderMetricsSnapshot, recorder: Option<&AsyncLogger>) {
    println!(
        "📊 sent {} frames, {} sink errors ({:.2}%), {} slots dropped, {} ticks",
        metrics.frames_sent,
        metrics.sink_errors,
        metrics.error_rate(),
        metrics.slots_dropped,
        metrics.ticks
    );
    if let Some(logger) = recorder {
        if logger.dropped() > 0 {
            println!("⚠️  {} log records dropped", logger.dropped());
        }
        if let Some(error) = logger.last_error() {
            println!("⚠️  last logger error: {error}");
        }
    }
}
