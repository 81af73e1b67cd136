//! 日志器配置检查命令
//!
//! 解析命令字符串，打印生效的配置和第一个文件的路径。不创建任何文件。

use anyhow::{Context, Result};
use clap::Args;
use cyclic_sdk::logger::{LoggerConfig, naming};

/// 日志器配置检查参数
#[derive(Args, Debug)]
pub struct CheckLogCommand {
    /// 配置命令字符串，如 "--baseFileName UDS_Log --maxFiles 5"
    #[arg(allow_hyphen_values = true)]
    pub command: String,
}

impl CheckLogCommand {
    pub fn execute(&self) -> Result<()> {
        let config = resolve(&self.command)?;
        let timestamp = naming::current_timestamp();
        println!("✅ {config}");
        println!("   first file: {}", naming::file_path(&config, &timestamp, 1).display());
        Ok(())
    }
}

fn resolve(command: &str) -> Result<LoggerConfig> {
    command
        .parse::<LoggerConfig>()
        .with_context(|| format!("invalid logger config '{command}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let config = resolve("--baseFileName UDS_Log --maxFiles 5").unwrap();
        assert_eq!(config.base_file_name, "UDS_Log");
        assert_eq!(config.max_files, 5);

        let err = resolve("--maxFiles 0").unwrap_err();
        assert!(format!("{err:#}").contains("maxFiles"));
    }
}
