use crate::core::InitPlayInfo;
use serde::{Deserialize, Serialize};

/// 当前选择的音视频流（编码 + 通道号）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelector {
    video_codec: i32,
    video_channel: i32,
    audio_codec: i32,
    audio_channel: i32,
}

impl StreamSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 start() 的初始播放信息加载
    pub fn load(&mut self, info: &InitPlayInfo) {
        self.video_codec = info.video_codec;
        self.video_channel = info.video_stream_num;
        self.audio_codec = info.audio_codec;
        self.audio_channel = info.audio_stream_num;
    }

    pub fn video(&self) -> (i32, i32) {
        (self.video_codec, self.video_channel)
    }

    pub fn audio(&self) -> (i32, i32) {
        (self.audio_codec, self.audio_channel)
    }

    pub fn select_specific_video(&mut self, codec: i32, channel: i32) {
        self.video_codec = codec;
        self.video_channel = channel;
    }

    pub fn select_specific_audio(&mut self, codec: i32, channel: i32) {
        self.audio_codec = codec;
        self.audio_channel = channel;
    }

    /// 切换到下一个视频通道（只增不减）
    pub fn select_next_video(&mut self) -> i32 {
        self.video_channel = self.video_channel.saturating_add(1);
        self.video_channel
    }

    /// 切换到下一个音频通道（只增不减）
    pub fn select_next_audio(&mut self) -> i32 {
        self.audio_channel = self.audio_channel.saturating_add(1);
        self.audio_channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_next_is_monotonic() {
        let mut selector = StreamSelector::new();
        selector.select_specific_video(0x0E, 0);
        let mut last = 0;
        for _ in 0..5 {
            let next = selector.select_next_video();
            assert_eq!(next, last + 1);
            last = next;
        }
        assert_eq!(selector.video(), (0x0E, 5));
        assert_eq!(selector.audio(), (0, 0));

        selector.select_specific_audio(0x0F, i32::MAX);
        assert_eq!(selector.select_next_audio(), i32::MAX);
    }

    #[test]
    fn test_load_from_play_info() {
        let mut selector = StreamSelector::new();
        selector.load(&InitPlayInfo {
            video_codec: 0x0E,
            video_stream_num: 1,
            audio_codec: 0x0F,
            audio_stream_num: 2,
            play_mode: 0,
            play_speed: 2,
        });
        assert_eq!(selector.video(), (0x0E, 1));
        assert_eq!(selector.audio(), (0x0F, 2));
    }
}
