//! 日志文件命名

use crate::config::{LoggerConfig, NamePattern};
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// 文件名中的时间戳：`YYYYMMDD_HHMMSS`（本地时间）
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// 当前本地时间的时间戳
pub fn current_timestamp() -> String {
    timestamp(Local::now())
}

/// 按命名模式生成文件名
pub fn file_name(config: &LoggerConfig, timestamp: &str, index: u32) -> String {
    let base = &config.base_file_name;
    let ext = &config.file_extension;
    match config.name_pattern {
        NamePattern::BaseTimeIndexExt => format!("{base}_{timestamp}_{index}{ext}"),
        NamePattern::BaseIndexExt => format!("{base}_{index}{ext}"),
        NamePattern::BaseExt => format!("{base}{ext}"),
    }
}

/// 从文件名解析 `(时间戳, 序号)`，不属于当前配置的文件返回 `None`
///
/// `BASE_INDEX_EXT` 的时间戳为空串；`BASE_EXT` 没有序号，总是返回 `None`。
pub fn parse_file_name(config: &LoggerConfig, name: &str) -> Option<(String, u32)> {
    let rest = name
        .strip_prefix(config.base_file_name.as_str())?
        .strip_prefix('_')?
        .strip_suffix(config.file_extension.as_str())?;

    match config.name_pattern {
        NamePattern::BaseIndexExt => Some((String::new(), parse_index(rest)?)),
        NamePattern::BaseTimeIndexExt => {
            let (stamp, index) = rest.rsplit_once('_')?;
            if !is_timestamp(stamp) {
                return None;
            }
            Some((stamp.to_string(), parse_index(index)?))
        },
        NamePattern::BaseExt => None,
    }
}

fn parse_index(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `YYYYMMDD_HHMMSS`
fn is_timestamp(stamp: &str) -> bool {
    stamp.len() == 15
        && stamp.bytes().enumerate().all(|(i, b)| match i {
            8 => b == b'_',
            _ => b.is_ascii_digit(),
        })
}

/// 完整路径
pub fn file_path(config: &LoggerConfig, timestamp: &str, index: u32) -> PathBuf {
    config.log_dir.join(file_name(config, timestamp, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(timestamp(now), "20240305_070809");
    }

    #[test]
    fn test_file_names() {
        let config = LoggerConfig::default().with_base_file_name("UDS_Log");
        assert_eq!(
            file_name(&config, "20240305_070809", 3),
            "UDS_Log_20240305_070809_3.log"
        );

        let config = config.with_name_pattern(NamePattern::BaseIndexExt);
        assert_eq!(file_name(&config, "ignored", 12), "UDS_Log_12.log");

        let config = config
            .with_name_pattern(NamePattern::BaseExt)
            .with_file_extension("txt");
        assert_eq!(file_name(&config, "ignored", 5), "UDS_Log.txt");
    }

    #[test]
    fn test_parse_file_name() {
        let config = LoggerConfig::default().with_base_file_name("UDS_Log");
        assert_eq!(
            parse_file_name(&config, "UDS_Log_20240305_070809_3.log"),
            Some(("20240305_070809".to_string(), 3))
        );
        assert_eq!(parse_file_name(&config, "UDS_Log_2024_070809_3.log"), None);
        assert_eq!(parse_file_name(&config, "UDS_Log_20240305_070809_3.txt"), None);
        assert_eq!(parse_file_name(&config, "Other_20240305_070809_3.log"), None);

        let config = config.with_name_pattern(NamePattern::BaseIndexExt);
        assert_eq!(parse_file_name(&config, "UDS_Log_12.log"), Some((String::new(), 12)));
        assert_eq!(parse_file_name(&config, "UDS_Log_x_12.log"), None);
        assert_eq!(parse_file_name(&config, "UDS_Log_.log"), None);
        assert_eq!(parse_file_name(&config, "UDS_Log_+1.log"), None);

        let config = config.with_name_pattern(NamePattern::BaseExt);
        assert_eq!(parse_file_name(&config, "UDS_Log.log"), None);
    }

    #[test]
    fn test_file_path_joins_dir() {
        let config = LoggerConfig::default()
            .with_log_dir("logs")
            .with_name_pattern(NamePattern::BaseIndexExt);
        assert_eq!(
            file_path(&config, "", 1),
            PathBuf::from("logs").join("app_log_1.log")
        );
    }
}
