use crate::core::{LoopStatus, PixelFormat, PlayerError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// configurePlayer 模式：循环
pub const CONFIG_MODE_LOOP: i32 = 0;
/// configurePlayer 模式：像素格式
pub const CONFIG_MODE_PIXEL_TYPE: i32 = 1;
/// 像素格式 -1 表示“不修改”
pub const PIXEL_TYPE_NONE: i32 = -1;
/// 固件接受但用途不明的像素格式值
const PIXEL_TYPE_UNKNOWN_ACCEPTED: i32 = 4;

/// 播放器配置（configurePlayer）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub loop_status: LoopStatus,
    pub pixel_format: PixelFormat,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            loop_status: LoopStatus::NoLoop,
            pixel_format: PixelFormat::Abgr8888,
        }
    }
}

impl PlayerConfig {
    /// 应用一次 configurePlayer 调用
    ///
    /// 校验失败时不修改任何字段
    pub fn configure(&mut self, mode: i32, value: i32) -> Result<()> {
        match mode {
            CONFIG_MODE_LOOP => {
                self.loop_status =
                    LoopStatus::from_raw(value).ok_or(PlayerError::InvalidConfigValue(value))?;
            }
            CONFIG_MODE_PIXEL_TYPE => match value {
                PIXEL_TYPE_NONE => {}
                PIXEL_TYPE_UNKNOWN_ACCEPTED => {
                    warn!("⚠️  configurePlayer 未知像素格式 pixelMode={}", value);
                }
                _ => {
                    self.pixel_format =
                        PixelFormat::from_raw(value).ok_or(PlayerError::InvalidConfigValue(value))?;
                }
            },
            _ => {
                warn!("⚠️  configurePlayer 无效模式 configMode={}, configAttr={}", mode, value);
                return Err(PlayerError::InvalidConfigMode(mode));
            }
        }
        Ok(())
    }
}

/// 引擎设置
///
/// 默认值即固件常量，部分游戏的时序依赖这些值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 环形缓冲区包数
    pub ringbuffer_packets: u32,
    /// 解码工作区大小（字节）
    pub decode_workspace_size: u32,
    /// setSource 之后的线程延迟（微秒）
    pub set_source_delay_us: u32,
    /// releaseSource 之后的线程延迟（微秒）
    pub release_delay_us: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ringbuffer_packets: 581,
            decode_workspace_size: 0x10000,
            set_source_delay_us: 100_000,
            release_delay_us: 10_000,
        }
    }
}

impl EngineSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CONFIG_MODE_LOOP, 0)]
    #[case(CONFIG_MODE_LOOP, 1)]
    #[case(CONFIG_MODE_PIXEL_TYPE, PIXEL_TYPE_NONE)]
    #[case(CONFIG_MODE_PIXEL_TYPE, 0)]
    #[case(CONFIG_MODE_PIXEL_TYPE, 3)]
    #[case(CONFIG_MODE_PIXEL_TYPE, 4)]
    fn test_accepted_values(#[case] mode: i32, #[case] value: i32) {
        let mut config = PlayerConfig::default();
        assert!(config.configure(mode, value).is_ok());
    }

    #[rstest]
    #[case(CONFIG_MODE_LOOP, 2)]
    #[case(CONFIG_MODE_LOOP, -1)]
    #[case(CONFIG_MODE_PIXEL_TYPE, 5)]
    #[case(CONFIG_MODE_PIXEL_TYPE, 999)]
    fn test_rejected_values(#[case] mode: i32, #[case] value: i32) {
        let mut config = PlayerConfig::default();
        let before = config;
        assert!(matches!(
            config.configure(mode, value),
            Err(PlayerError::InvalidConfigValue(v)) if v == value
        ));
        assert_eq!(config, before);
    }

    #[test]
    fn test_invalid_mode() {
        let mut config = PlayerConfig::default();
        assert!(matches!(config.configure(99, 0), Err(PlayerError::InvalidConfigMode(99))));
    }

    #[test]
    fn test_pixel_none_keeps_format() {
        let mut config = PlayerConfig::default();
        config.configure(CONFIG_MODE_PIXEL_TYPE, 1).unwrap();
        config.configure(CONFIG_MODE_PIXEL_TYPE, PIXEL_TYPE_NONE).unwrap();
        config.configure(CONFIG_MODE_PIXEL_TYPE, 4).unwrap();
        assert_eq!(config.pixel_format, PixelFormat::Abgr5551);
    }

    #[test]
    fn test_settings_defaults_from_partial_json() {
        let settings = EngineSettings::from_json_str(r#"{ "release_delay_us": 5000 }"#).unwrap();
        assert_eq!(settings.ringbuffer_packets, 581);
        assert_eq!(settings.set_source_delay_us, 100_000);
        assert_eq!(settings.release_delay_us, 5000);
        assert!(EngineSettings::from_json_str("not json").is_err());
    }
}
