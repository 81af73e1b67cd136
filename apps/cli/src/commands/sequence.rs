//! 序列发送命令
//!
//! 按文件顺序播放帧，`delay_ms` 为该帧之前的间隔，支持重复与轮间延迟。

use super::{TransportArgs, install_stop_handler, print_summary, wait_until};
use crate::job::Job;
use anyhow::{Context, Result, bail};
use clap::Args;
use cyclic_sdk::prelude::*;
use crossbeam_channel::bounded;

/// 序列发送命令参数
#[derive(Args, Debug)]
pub struct SequenceCommand {
    #[command(flatten)]
    pub transport: TransportArgs,

    /// 重复次数
    #[arg(short, long, default_value_t = 1, conflicts_with = "forever")]
    pub repeat: u32,

    /// 无限重复，直到 Ctrl+C
    #[arg(long)]
    pub forever: bool,

    /// 每轮结束后的间隔（毫秒）
    #[arg(long, default_value_t = 10)]
    pub round_delay_ms: u32,
}

impl SequenceCommand {
    pub fn execute(&self) -> Result<()> {
        let job = Job::load(&self.transport.job)?;
        let frames = job.send_frames()?;
        let (sink, recorder) = self.transport.open()?;

        let sequence = SequenceSender::new();
        sequence.set_timer_strategy(self.transport.strategy);
        sequence.enable_cpu_affinity(self.transport.pin_cpu);
        sequence.set_shared_sink(sink);
        sequence.set_config(SequenceConfig {
            is_forever: self.forever,
            repeat_count: self.repeat,
            round_end_delay_ms: self.round_delay_ms,
        });

        let (done_tx, done_rx) = bounded(1);
        sequence.set_completion(move |code| {
            let _ = done_tx.try_send(code);
        });

        let running = install_stop_handler()?;
        let count = frames.len();
        sequence.start(frames).context("failed to start sequence")?;
        println!("▶️  {} frames, {:?}", count, sequence.config());

        wait_until(&running, None, || !done_rx.is_empty());
        sequence.stop();

        if let Some(logger) = &recorder {
            logger.stop();
        }
        print_summary(sequence.metrics(), recorder.as_deref());

        match done_rx.try_recv().unwrap_or(EXIT_STOPPED) {
            EXIT_COMPLETED => {
                println!("✅ Sequence completed after {} rounds", sequence.current_round());
                Ok(())
            },
            EXIT_STOPPED => {
                println!("⏹️  Sequence stopped in round {}", sequence.current_round() + 1);
                Ok(())
            },
            code => bail!("sequence aborted: sink failed (code {code})"),
        }
    }
}
