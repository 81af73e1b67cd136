//! 周期发送命令
//!
//! 任务文件中的每一帧按自己的周期与相位偏移发送，直到 Ctrl+C 或时长到达。

use super::{TransportArgs, install_stop_handler, print_summary, wait_until};
use crate::job::Job;
use anyhow::{Context, Result};
use clap::Args;
use cyclic_sdk::PeriodSender;
use std::time::Duration;
use tracing::info;

/// 周期发送命令参数
#[derive(Args, Debug)]
pub struct PeriodCommand {
    #[command(flatten)]
    pub transport: TransportArgs,

    /// 运行时长（毫秒），不指定则运行到 Ctrl+C
    #[arg(short, long)]
    pub duration_ms: Option<u64>,
}

impl PeriodCommand {
    pub fn execute(&self) -> Result<()> {
        let job = Job::load(&self.transport.job)?;
        let frames = job.send_frames()?;
        let (sink, recorder) = self.transport.open()?;

        let sender = PeriodSender::new();
        sender.set_timer_strategy(self.transport.strategy);
        sender.enable_cpu_affinity(self.transport.pin_cpu);
        sender.set_shared_sink(sink);

        let running = install_stop_handler()?;
        let count = sender.add_frames(frames).context("failed to schedule frames")?;
        info!("Period job started with {} frames", count);
        println!("▶️  {} frames scheduled (strategy {:?})", count, self.transport.strategy);

        wait_until(&running, self.duration_ms.map(Duration::from_millis), || {
            !sender.is_running()
        });

        sender.stop();
        if let Some(logger) = &recorder {
            logger.stop();
        }
        print_summary(sender.metrics(), recorder.as_deref());
        Ok(())
    }
}
