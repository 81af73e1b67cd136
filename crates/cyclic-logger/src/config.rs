//! 日志器配置
//!
//! 支持两种形式：
//! - 命令字符串：`--baseFileName UDS_Log --logDir ./logs --maxFiles 5`
//!   （值可以用双引号包含空格）
//! - 结构体：[`LoggerConfig`] + builder 风格的 setter
//!
//! 命令字符串在当前配置的基础上修改，解析失败时不改变任何状态。

use crate::error::LoggerError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 默认单文件大小上限：10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// 默认文件数量上限
pub const DEFAULT_MAX_FILES: usize = 10;
/// 文件数量上限的最大值
pub const MAX_ROLLING_FILES: usize = 100;

/// 文件轮转模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    /// 序号递增，超出 `max_files` 时删除最旧的文件
    #[default]
    Incrementing,
    /// 序号在 `1..=max_files` 之间循环，覆盖旧文件
    Rolling,
}

impl FromStr for RotationMode {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INCREMENTING" => Ok(Self::Incrementing),
            "ROLLING" => Ok(Self::Rolling),
            _ => Err(LoggerError::Config(format!(
                "invalid rotationMode '{s}' (expected INCREMENTING or ROLLING)"
            ))),
        }
    }
}

impl fmt::Display for RotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Incrementing => "INCREMENTING",
            Self::Rolling => "ROLLING",
        })
    }
}

/// 文件命名模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePattern {
    /// `<base>_<YYYYMMDD_HHMMSS>_<index><ext>`
    #[default]
    BaseTimeIndexExt,
    /// `<base>_<index><ext>`
    BaseIndexExt,
    /// `<base><ext>`（轮转时原地截断）
    BaseExt,
}

impl FromStr for NamePattern {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BASE_TIME_INDEX_EXT" => Ok(Self::BaseTimeIndexExt),
            "BASE_INDEX_EXT" => Ok(Self::BaseIndexExt),
            "BASE_EXT" => Ok(Self::BaseExt),
            _ => Err(LoggerError::Config(format!(
                "invalid namePattern '{s}' (expected BASE_TIME_INDEX_EXT, BASE_INDEX_EXT or BASE_EXT)"
            ))),
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BaseTimeIndexExt => "BASE_TIME_INDEX_EXT",
            Self::BaseIndexExt => "BASE_INDEX_EXT",
            Self::BaseExt => "BASE_EXT",
        })
    }
}

/// 日志器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    pub base_file_name: String,
    pub log_dir: PathBuf,
    /// 带前导点，如 `.log`；为空表示无扩展名
    pub file_extension: String,
    pub max_file_size: u64,
    pub max_files: usize,
    pub rotation_mode: RotationMode,
    pub name_pattern: NamePattern,
    /// 非空时 `log()` / `log_hex()` 写入 `[tag] ` 前缀
    pub log_tag: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            base_file_name: "app_log".to_string(),
            log_dir: PathBuf::from("."),
            file_extension: ".log".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            rotation_mode: RotationMode::default(),
            name_pattern: NamePattern::default(),
            log_tag: String::new(),
        }
    }
}

impl LoggerConfig {
    pub fn with_base_file_name(mut self, name: impl Into<String>) -> Self {
        self.base_file_name = name.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// 缺少前导点时自动补上
    pub fn with_file_extension(mut self, ext: &str) -> Self {
        self.file_extension = normalize_extension(ext);
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_rotation_mode(mut self, mode: RotationMode) -> Self {
        self.rotation_mode = mode;
        self
    }

    pub fn with_name_pattern(mut self, pattern: NamePattern) -> Self {
        self.name_pattern = pattern;
        self
    }

    pub fn with_log_tag(mut self, tag: impl Into<String>) -> Self {
        self.log_tag = tag.into();
        self
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), LoggerError> {
        if self.base_file_name.is_empty() {
            return Err(LoggerError::Config("baseFileName must not be empty".into()));
        }
        if self.max_file_size == 0 {
            return Err(LoggerError::Config("maxFileSize must be greater than 0".into()));
        }
        if !(1..=MAX_ROLLING_FILES).contains(&self.max_files) {
            return Err(LoggerError::Config(format!(
                "maxFiles must be in 1..={}, got {}",
                MAX_ROLLING_FILES, self.max_files
            )));
        }
        Ok(())
    }

    /// 在当前配置上应用命令字符串，返回新配置（自身不变）
    ///
    /// # Example
    ///
    /// ```
    /// use cyclic_logger::{LoggerConfig, RotationMode};
    ///
    /// let config = LoggerConfig::default()
    ///     .apply_command("--baseFileName UDS_Log --logDir \"./my logs\" --rotationMode ROLLING")
    ///     .unwrap();
    /// assert_eq!(config.base_file_name, "UDS_Log");
    /// assert_eq!(config.log_dir.to_str(), Some("./my logs"));
    /// assert_eq!(config.rotation_mode, RotationMode::Rolling);
    /// ```
    pub fn apply_command(&self, command: &str) -> Result<Self, LoggerError> {
        let mut config = self.clone();
        let tokens = tokenize(command)?;
        let mut iter = tokens.into_iter();

        while let Some(flag) = iter.next() {
            let Some(name) = flag.strip_prefix("--") else {
                return Err(LoggerError::Config(format!(
                    "expected an option starting with '--', got '{flag}'"
                )));
            };
            let value = match iter.next() {
                Some(value) if !value.starts_with("--") => value,
                _ => {
                    return Err(LoggerError::Config(format!(
                        "missing value for option --{name}"
                    )));
                },
            };

            match name {
                "baseFileName" => config.base_file_name = value,
                "logDir" => config.log_dir = PathBuf::from(value),
                "fileExtension" => config.file_extension = normalize_extension(&value),
                "maxFileSize" => config.max_file_size = parse_number(name, &value)?,
                "maxFiles" => config.max_files = parse_number(name, &value)?,
                "rotationMode" => config.rotation_mode = value.parse()?,
                "namePattern" => config.name_pattern = value.parse()?,
                "logTag" => config.log_tag = value,
                other => {
                    return Err(LoggerError::Config(format!("unknown option --{other}")));
                },
            }
        }

        config.validate()?;
        Ok(config)
    }
}

impl FromStr for LoggerConfig {
    type Err = LoggerError;

    /// 以默认配置为基础解析命令字符串
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::default().apply_command(s)
    }
}

impl fmt::Display for LoggerConfig {
    /// 输出等价的命令字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "--baseFileName {} --logDir {} --fileExtension {} --maxFileSize {} --maxFiles {} \
             --rotationMode {} --namePattern {}",
            quote(&self.base_file_name),
            quote(&self.log_dir.to_string_lossy()),
            quote(&self.file_extension),
            self.max_file_size,
            self.max_files,
            self.rotation_mode,
            self.name_pattern
        )?;
        if !self.log_tag.is_empty() {
            write!(f, " --logTag {}", quote(&self.log_tag))?;
        }
        Ok(())
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, LoggerError> {
    value
        .parse()
        .map_err(|_| LoggerError::Config(format!("invalid number for --{name}: '{value}'")))
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

/// 按空白切分，双引号内的空白保留
fn tokenize(command: &str) -> Result<Vec<String>, LoggerError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in command.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            },
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            },
            c => {
                current.push(c);
                in_token = true;
            },
        }
    }

    if quoted {
        return Err(LoggerError::Config("unterminated quote in config command".into()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
