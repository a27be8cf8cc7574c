use serde::{Deserialize, Serialize};

/// 默认帧宽（像素），同时也是允许的最大帧宽
pub const DEFAULT_FRAME_WIDTH: i32 = 512;
/// 屏幕高度（行）
pub const DISPLAY_HEIGHT: u32 = 272;
/// 每次 getAudioData 输出的采样数（ATRAC3+ 一帧）
pub const AUDIO_SAMPLES: u32 = 2048;
/// 每次 getAudioData 输出的字节数（16bit 立体声）
pub const AUDIO_SAMPLES_BYTES: u32 = AUDIO_SAMPLES * 4;

/// 播放状态
///
/// 数值与固件一致，状态比较（“至少 STANDBY”）按数值进行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    None,
    Init,
    Standby,
    Playing,
    Error,
    PlayingFinished,
}

impl PlaybackState {
    pub fn code(self) -> u32 {
        match self {
            PlaybackState::None => 0x0,
            PlaybackState::Init => 0x1,
            PlaybackState::Standby => 0x2,
            PlaybackState::Playing => 0x4,
            PlaybackState::Error => 0x100,
            PlaybackState::PlayingFinished => 0x200,
        }
    }

    /// 是否处于 PLAYING 族状态（PLAYING / PLAYING_FINISHED / ERROR）
    pub fn is_playing_family(self) -> bool {
        matches!(
            self,
            PlaybackState::Playing | PlaybackState::PlayingFinished | PlaybackState::Error
        )
    }

    pub fn is_initialized(self) -> bool {
        self != PlaybackState::None
    }

    /// 按固件数值比较
    pub fn at_least(self, other: PlaybackState) -> bool {
        self.code() >= other.code()
    }
}

/// 播放模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    Play,
    SlowMotion,
    StepFrame,
    Pause,
    Forward,
    Rewind,
    /// 游戏传入的未知值，原样保存
    Other(i32),
}

impl PlayMode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PlayMode::Play,
            1 => PlayMode::SlowMotion,
            2 => PlayMode::StepFrame,
            3 => PlayMode::Pause,
            4 => PlayMode::Forward,
            5 => PlayMode::Rewind,
            other => PlayMode::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            PlayMode::Play => 0,
            PlayMode::SlowMotion => 1,
            PlayMode::StepFrame => 2,
            PlayMode::Pause => 3,
            PlayMode::Forward => 4,
            PlayMode::Rewind => 5,
            PlayMode::Other(raw) => raw,
        }
    }
}

impl Default for PlayMode {
    fn default() -> Self {
        PlayMode::Play
    }
}

/// 播放速度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaySpeed {
    Slow,
    Normal,
    Fast,
    Other(i32),
}

impl PlaySpeed {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => PlaySpeed::Slow,
            2 => PlaySpeed::Normal,
            3 => PlaySpeed::Fast,
            other => PlaySpeed::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            PlaySpeed::Slow => 1,
            PlaySpeed::Normal => 2,
            PlaySpeed::Fast => 3,
            PlaySpeed::Other(raw) => raw,
        }
    }
}

impl Default for PlaySpeed {
    fn default() -> Self {
        PlaySpeed::Normal
    }
}

/// 像素格式（GE 纹理存储模式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgr5650,
    Abgr5551,
    Abgr4444,
    Abgr8888,
}

impl PixelFormat {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(PixelFormat::Bgr5650),
            1 => Some(PixelFormat::Abgr5551),
            2 => Some(PixelFormat::Abgr4444),
            3 => Some(PixelFormat::Abgr8888),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            PixelFormat::Bgr5650 => 0,
            PixelFormat::Abgr5551 => 1,
            PixelFormat::Abgr4444 => 2,
            PixelFormat::Abgr8888 => 3,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Abgr8888 => 4,
            _ => 2,
        }
    }
}

/// 循环播放设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Loop,
    NoLoop,
}

impl LoopStatus {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(LoopStatus::Loop),
            1 => Some(LoopStatus::NoLoop),
            _ => None,
        }
    }
}

/// 播放器固件版本（getPsmfInfo 返回）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerVersion {
    Full,
    Basic,
    Net,
}

impl PlayerVersion {
    pub fn raw(self) -> i32 {
        match self {
            PlayerVersion::Full => 0,
            PlayerVersion::Basic => 1,
            PlayerVersion::Net => 2,
        }
    }
}

/// create() 参数：游戏在调用前手动填好的三个字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateParams {
    pub display_buffer: u32,
    pub display_buffer_size: u32,
    /// "START" 线程优先级，仅记录
    pub playback_thread_priority: i32,
}

/// start() 的初始播放信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPlayInfo {
    pub video_codec: i32,
    pub video_stream_num: i32,
    pub audio_codec: i32,
    pub audio_stream_num: i32,
    pub play_mode: i32,
    pub play_speed: i32,
}

/// getVideoData 描述符（输入输出参数）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoData {
    pub frame_width: i32,
    pub display_buffer: u32,
    pub display_pts: i32,
}

/// getPsmfInfo 返回的媒体信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsmfInfo {
    pub last_timestamp: i64,
    pub avc_stream_num: i32,
    pub atrac_stream_num: i32,
    pub pcm_stream_num: i32,
    pub player_version: PlayerVersion,
}

/// 会话状态快照（用于日志和调试输出）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub play_mode: PlayMode,
    pub play_speed: PlaySpeed,
    pub video_timestamp: i64,
    pub audio_timestamp: i64,
    pub remaining_bytes: i64,
    pub source_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(PlaybackState::Playing.at_least(PlaybackState::Standby));
        assert!(PlaybackState::PlayingFinished.at_least(PlaybackState::Standby));
        assert!(!PlaybackState::Init.at_least(PlaybackState::Standby));
        assert!(PlaybackState::Error.is_playing_family());
        assert!(!PlaybackState::Standby.is_playing_family());
    }

    #[test]
    fn test_raw_conversions() {
        assert_eq!(PlayMode::from_raw(3), PlayMode::Pause);
        assert_eq!(PlayMode::from_raw(42).raw(), 42);
        assert_eq!(PlaySpeed::from_raw(2), PlaySpeed::Normal);
        assert_eq!(PixelFormat::from_raw(3), Some(PixelFormat::Abgr8888));
        assert_eq!(PixelFormat::from_raw(4), None);
        assert_eq!(PixelFormat::Bgr5650.bytes_per_pixel(), 2);
        assert_eq!(LoopStatus::from_raw(2), None);
    }
}
