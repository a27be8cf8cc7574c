/// 时间戳单位：每秒 90000 tick
pub const TIMESTAMP_PER_SECOND: i64 = 90_000;
/// 视频帧步长（29.97fps）
pub const VIDEO_TIMESTAMP_STEP: i64 = 3_003;
/// 音频帧步长（2048 采样 @ 44.1kHz）
pub const AUDIO_TIMESTAMP_STEP: i64 = 4_180;
/// 允许的最大音视频时间戳差（两个音频帧）
pub const MAX_TIMESTAMP_DIFFERENCE: i64 = AUDIO_TIMESTAMP_STEP * 2;
/// 启动宽限期长度（视频帧数）
const STARTUP_GRACE_FRAMES: i64 = 10;

/// 音画同步监视器 - 决定每次取数据时是否需要让某一路等待
///
/// 时间戳 <= 0 视为未知，未知时不做任何节流
#[derive(Debug, Clone)]
pub struct SyncMonitor {
    first_timestamp: i64,
    last_audio_fetch_ok: bool,
}

impl SyncMonitor {
    pub fn new() -> Self {
        Self {
            first_timestamp: 0,
            last_audio_fetch_ok: true,
        }
    }

    /// 设置码流首个时间戳（容器分析时确定）
    pub fn set_first_timestamp(&mut self, first_timestamp: i64) {
        self.first_timestamp = first_timestamp;
    }

    pub fn first_timestamp(&self) -> i64 {
        self.first_timestamp
    }

    /// start() 时重置“上次音频取包结果”为成功
    pub fn reset_audio_fetch(&mut self) {
        self.last_audio_fetch_ok = true;
    }

    pub fn record_audio_fetch(&mut self, ok: bool) {
        self.last_audio_fetch_ok = ok;
    }

    pub fn last_audio_fetch_ok(&self) -> bool {
        self.last_audio_fetch_ok
    }

    /// 当前允许的最大漂移
    ///
    /// 视频刚开始时（首个时间戳后 10 帧内）放宽一倍，避免缓冲未满时音频卡顿
    pub fn max_timestamp_difference(&self, video_timestamp: i64) -> i64 {
        let mut max_difference = MAX_TIMESTAMP_DIFFERENCE;
        if video_timestamp < self.first_timestamp + VIDEO_TIMESTAMP_STEP * STARTUP_GRACE_FRAMES {
            max_difference *= 2;
        }
        max_difference
    }

    /// 视频领先音频太多：跳过解码，重复上一帧
    pub fn should_repeat_video_frame(&self, video_timestamp: i64, audio_timestamp: i64) -> bool {
        audio_timestamp > 0
            && video_timestamp > 0
            && video_timestamp > audio_timestamp + self.max_timestamp_difference(video_timestamp)
            && self.last_audio_fetch_ok
    }

    /// 音频领先视频太多：本次不消费音频数据
    pub fn should_stall_audio(&self, video_timestamp: i64, audio_timestamp: i64) -> bool {
        audio_timestamp > 0
            && video_timestamp > 0
            && audio_timestamp > video_timestamp + self.max_timestamp_difference(video_timestamp)
            && self.last_audio_fetch_ok
    }
}

impl Default for SyncMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_grace_doubles_bound() {
        let mut monitor = SyncMonitor::new();
        monitor.set_first_timestamp(90_000);
        assert_eq!(monitor.max_timestamp_difference(90_000), MAX_TIMESTAMP_DIFFERENCE * 2);
        let after_grace = 90_000 + VIDEO_TIMESTAMP_STEP * 10;
        assert_eq!(monitor.max_timestamp_difference(after_grace), MAX_TIMESTAMP_DIFFERENCE);
    }

    #[test]
    fn test_video_repeat_decision() {
        let monitor = SyncMonitor::new();
        let video = 200_000;
        let bound = monitor.max_timestamp_difference(video);
        assert_eq!(bound, MAX_TIMESTAMP_DIFFERENCE);
        assert!(monitor.should_repeat_video_frame(video, video - bound - 1));
        assert!(!monitor.should_repeat_video_frame(video, video - bound));
        // 未知的音频时间戳不参与同步
        assert!(!monitor.should_repeat_video_frame(video, 0));
    }

    #[test]
    fn test_audio_stall_decision() {
        let mut monitor = SyncMonitor::new();
        let video = 200_000;
        let bound = monitor.max_timestamp_difference(video);
        assert!(monitor.should_stall_audio(video, video + bound + 1));
        assert!(!monitor.should_stall_audio(video, video + bound));

        // 上次音频取包失败时不再节流
        monitor.record_audio_fetch(false);
        assert!(!monitor.should_stall_audio(video, video + bound + 1));
        assert!(!monitor.should_repeat_video_frame(video + 2 * bound, video));
        monitor.reset_audio_fetch();
        assert!(monitor.last_audio_fetch_ok());
    }
}
