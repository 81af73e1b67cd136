//! # Cyclic CLI
//!
//! 台架发送工具：把任务文件中的帧按周期或序列发送到 UDP 目标。
//!
//! ```bash
//! # 周期发送 10 秒，每一帧记录到 ./logs
//! cyclic-cli period --job job.toml --target 127.0.0.1:9000 --duration-ms 10000 \
//!     --log "--logDir ./logs --logTag TX"
//!
//! # 序列重复 3 次，轮间隔 100ms
//! cyclic-cli sequence --job script.toml --target 127.0.0.1:9000 --repeat 3 --round-delay-ms 100
//!
//! # 检查日志器配置
//! cyclic-cli check-log "--baseFileName UDS_Log --rotationMode ROLLING --maxFiles 5"
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod job;

use commands::{CheckLogCommand, PeriodCommand, SequenceCommand};

/// Cyclic CLI - 周期/序列帧发送工具
#[derive(Parser, Debug)]
#[command(name = "cyclic-cli")]
#[command(about = "Periodic and sequenced frame transmission to a UDP target", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 周期发送（Ctrl+C 或时长到达时停止）
    Period {
        #[command(flatten)]
        args: PeriodCommand,
    },

    /// 序列发送
    Sequence {
        #[command(flatten)]
        args: SequenceCommand,
    },

    /// 检查日志器配置命令字符串
    CheckLog {
        #[command(flatten)]
        args: CheckLogCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    cyclic_sdk::init_logger!("cyclic_cli=info,cyclic_sender=info,cyclic_logger=warn");

    let cli = Cli::parse();

    match cli.command {
        Commands::Period { args } => args.execute(),
        Commands::Sequence { args } => args.execute(),
        Commands::CheckLog { args } => args.execute(),
    }
}
