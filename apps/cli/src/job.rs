//! 任务文件
//!
//! TOML（默认）或 JSON（`.json` 扩展名）：
//!
//! ```toml
//! [[frames]]
//! type = 1
//! group = 0
//! id = 0x7E0
//! data = "02 3E 00"
//! period_ms = 2000
//! delay_ms = 0
//! ```

use anyhow::{Context, Result, bail};
use cyclic_sdk::{FrameKey, SendFrame};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 任务文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub frames: Vec<JobFrame>,
}

/// 任务中的一帧
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFrame {
    #[serde(rename = "type", default)]
    pub frame_type: u16,

    #[serde(default)]
    pub group: u16,

    pub id: u32,

    /// 十六进制字节，允许空白分隔（"01 02 0A" / "01020A"）
    pub data: String,

    #[serde(default = "default_period_ms")]
    pub period_ms: u32,

    #[serde(default)]
    pub delay_ms: u32,
}

fn default_period_ms() -> u32 {
    cyclic_sdk::sender::DEFAULT_PERIOD_MS
}

impl Job {
    /// 从文件加载（按扩展名选择格式）
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let job: Job = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON job file {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("invalid TOML job file {}", path.display()))?
        };

        if job.frames.is_empty() {
            bail!("job file {} contains no frames", path.display());
        }
        Ok(job)
    }

    /// 转换为发送帧（保持文件中的顺序）
    pub fn send_frames(&self) -> Result<Vec<SendFrame>> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, frame)| frame.to_send_frame().with_context(|| format!("frame #{i}")))
            .collect()
    }
}

impl JobFrame {
    pub fn key(&self) -> FrameKey {
        FrameKey::new(self.frame_type, self.group, self.id)
    }

    pub fn to_send_frame(&self) -> Result<SendFrame> {
        let data = parse_hex(&self.data)?;
        Ok(SendFrame::new(self.key(), data)
            .with_period(self.period_ms)
            .with_delay(self.delay_ms))
    }
}

/// 解析十六进制字节串
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        bail!("frame data is empty");
    }
    hex::decode(&compact).with_context(|| format!("invalid hex data '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("01 02 0A").unwrap(), vec![0x01, 0x02, 0x0A]);
        assert_eq!(parse_hex("7f3e").unwrap(), vec![0x7F, 0x3E]);
        assert!(parse_hex("").is_err());
        assert!(parse_hex("0").is_err());
        assert!(parse_hex("GG").is_err());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        fs::write(
            &path,
            r#"
[[frames]]
type = 1
id = 0x7E0
data = "02 3E 00"
period_ms = 2000

[[frames]]
type = 1
group = 2
id = 0x7E1
data = "03 22 F1 90"
delay_ms = 5
"#,
        )
        .unwrap();

        let job = Job::load(&path).unwrap();
        let frames = job.send_frames().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].key, FrameKey::new(1, 0, 0x7E0));
        assert_eq!(frames[0].period_ms, 2000);
        assert_eq!(frames[0].delay_ms, 0);
        assert_eq!(&frames[1].data[..], &[0x03, 0x22, 0xF1, 0x90]);
        assert_eq!(frames[1].key.group(), 2);
        assert_eq!(frames[1].period_ms, cyclic_sdk::sender::DEFAULT_PERIOD_MS);
        assert_eq!(frames[1].delay_ms, 5);
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(
            &path,
            r#"{ "frames": [ { "type": 2, "id": 16, "data": "10 01", "period_ms": 100 } ] }"#,
        )
        .unwrap();

        let frames = Job::load(&path).unwrap().send_frames().unwrap();
        assert_eq!(frames[0].key, FrameKey::new(2, 0, 16));
        assert_eq!(frames[0].period_ms, 100);
    }

    #[test]
    fn test_rejects_empty_and_bad_frames() {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.toml");
        fs::write(&empty, "frames = []\n").unwrap();
        assert!(Job::load(&empty).is_err());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[[frames]]\nid = 1\ndata = \"zz\"\n").unwrap();
        let job = Job::load(&bad).unwrap();
        let err = job.send_frames().unwrap_err();
        assert!(format!("{err:#}").contains("frame #0"));
    }
}
