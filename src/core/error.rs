use thiserror::Error;

/// 固件错误码（返回给模拟游戏的 32 位错误字）
pub mod codes {
    pub const ERROR_KERNEL_ERROR: u32 = 0x8002_0001;
    pub const ERROR_KERNEL_NO_MEMORY: u32 = 0x8002_0190;
    pub const ERROR_PSMFPLAYER_NOT_INITIALIZED: u32 = 0x8061_6001;
    pub const ERROR_PSMFPLAYER_INVALID_CONFIG_MODE: u32 = 0x8061_6006;
    pub const ERROR_PSMFPLAYER_INVALID_CONFIG_VALUE: u32 = 0x8061_6008;
    pub const ERROR_PSMFPLAYER_AUDIO_VIDEO_OUT_OF_SYNC: u32 = 0x8061_6015;
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("播放器未初始化或状态不符")]
    NotInitialized,

    #[error("无效的配置模式: {0}")]
    InvalidConfigMode(i32),

    #[error("无效的配置值: {0}")]
    InvalidConfigValue(i32),

    #[error("音视频不同步")]
    AudioVideoOutOfSync,

    /// 解码层返回的错误码，原样透传
    #[error("解码错误: 0x{0:08X}")]
    Decode(u32),

    #[error("内存分配失败: {name} (0x{size:X} 字节)")]
    AllocationFailed { name: String, size: u32 },

    #[error("未知的播放器句柄: 0x{0:X}")]
    UnknownHandle(u32),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析错误: {0}")]
    SettingsError(#[from] serde_json::Error),

    #[error("其他错误: {0}")]
    Other(String),
}

impl PlayerError {
    /// 映射为固件返回值
    pub fn code(&self) -> u32 {
        match self {
            PlayerError::NotInitialized | PlayerError::UnknownHandle(_) => {
                codes::ERROR_PSMFPLAYER_NOT_INITIALIZED
            }
            PlayerError::InvalidConfigMode(_) => codes::ERROR_PSMFPLAYER_INVALID_CONFIG_MODE,
            PlayerError::InvalidConfigValue(_) => codes::ERROR_PSMFPLAYER_INVALID_CONFIG_VALUE,
            PlayerError::AudioVideoOutOfSync => codes::ERROR_PSMFPLAYER_AUDIO_VIDEO_OUT_OF_SYNC,
            PlayerError::Decode(code) => *code,
            PlayerError::AllocationFailed { .. } => codes::ERROR_KERNEL_NO_MEMORY,
            PlayerError::IoError(_) | PlayerError::SettingsError(_) | PlayerError::Other(_) => {
                codes::ERROR_KERNEL_ERROR
            }
        }
    }

    /// 可在下一次调用时重试的错误（不影响会话状态）
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlayerError::AudioVideoOutOfSync | PlayerError::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

/// 把操作结果转换为固件返回字（成功为 0）
pub fn result_code<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PlayerError::NotInitialized.code(), 0x8061_6001);
        assert_eq!(PlayerError::InvalidConfigMode(99).code(), 0x8061_6006);
        assert_eq!(PlayerError::InvalidConfigValue(999).code(), 0x8061_6008);
        assert_eq!(PlayerError::AudioVideoOutOfSync.code(), 0x8061_6015);
        assert_eq!(PlayerError::Decode(0x806A_0001).code(), 0x806A_0001);
        assert_eq!(PlayerError::UnknownHandle(7).code(), codes::ERROR_PSMFPLAYER_NOT_INITIALIZED);
    }

    #[test]
    fn test_result_code() {
        let ok: Result<()> = Ok(());
        assert_eq!(result_code(&ok), 0);
        let err: Result<()> = Err(PlayerError::AudioVideoOutOfSync);
        assert_eq!(result_code(&err), codes::ERROR_PSMFPLAYER_AUDIO_VIDEO_OUT_OF_SYNC);
        assert!(PlayerError::AudioVideoOutOfSync.is_recoverable());
        assert!(!PlayerError::NotInitialized.is_recoverable());
    }
}
