use crate::core::psmf;
use crate::core::{PixelFormat, PlayerError, PsmfHeader, Result};
use crate::core::{AUDIO_TIMESTAMP_STEP, DISPLAY_HEIGHT, VIDEO_TIMESTAMP_STEP};
use crate::player::host::{EmulatedMemory, MemBlock};
use crate::player::ringbuffer::RingBuffer;
use log::{debug, info, trace};
use std::sync::Arc;

/// 解码层：环形缓冲区中没有可用的 Au
pub const ERROR_MPEG_NO_DATA: u32 = 0x8061_8001;

/// 解码桥 - 视频/音频基本流解码能力（外部协作者）
///
/// 播放器只关心“取下一个 Au、解码到缓冲区”，解码算法本身不在本模块内
pub trait DecodeBridge: Send {
    /// 在给定的工作区上创建解码上下文
    fn create_context(&mut self, workspace: &MemBlock, frame_width: i32) -> Result<()>;

    /// 结束当前码流（releaseSource）
    fn finish(&mut self);

    /// 销毁解码上下文（delete）
    fn destroy_context(&mut self);

    /// 分析容器头部，得到首包偏移与时间戳
    fn analyse(&mut self, data: &[u8]) -> PsmfHeader;

    fn register_video_channel(&mut self, channel: i32);

    fn register_audio_channel(&mut self, channel: i32);

    /// 取下一个视频 Au
    fn get_avc_au(&mut self, ring: &mut RingBuffer) -> Result<()>;

    /// 解码已取出的视频 Au 到显示缓冲区
    fn avc_decode(&mut self, display_buffer: u32, frame_width: i32, pixel_format: PixelFormat) -> Result<()>;

    /// 把上一帧重新写到显示缓冲区
    fn write_last_frame(&mut self, display_buffer: u32, frame_width: i32, pixel_format: PixelFormat);

    /// 取下一个音频 Au
    fn get_atrac_au(&mut self, ring: &mut RingBuffer) -> Result<()>;

    /// 解码已取出的音频 Au 到输出缓冲区
    fn atrac_decode(&mut self, buffer: u32, size: u32) -> Result<()>;

    fn current_video_timestamp(&self) -> i64;

    fn current_audio_timestamp(&self) -> i64;

    /// 环形缓冲区有新数据
    fn notify_new_data(&mut self);
}

/// 模拟解码器
///
/// 每个 Au 消耗一个包；视频每帧前进 3003 tick，音频每帧前进 4180 tick。
/// 视频输出为纯色帧（颜色随帧号变化），音频输出为固定样本
pub struct SimulatedDecoder {
    memory: Arc<dyn EmulatedMemory>,
    first_timestamp: i64,
    video_timestamp: i64,
    audio_timestamp: i64,
    video_frames: u64,
    audio_frames: u64,
    pending_video: bool,
    pending_audio: bool,
    video_channel: i32,
    audio_channel: i32,
    context_ready: bool,
}

impl SimulatedDecoder {
    pub fn new(memory: Arc<dyn EmulatedMemory>) -> Self {
        Self {
            memory,
            first_timestamp: 0,
            video_timestamp: 0,
            audio_timestamp: 0,
            video_frames: 0,
            audio_frames: 0,
            pending_video: false,
            pending_audio: false,
            video_channel: 0,
            audio_channel: 0,
            context_ready: false,
        }
    }

    pub fn video_frames(&self) -> u64 {
        self.video_frames
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames
    }

    pub fn registered_channels(&self) -> (i32, i32) {
        (self.video_channel, self.audio_channel)
    }

    fn reset_stream(&mut self) {
        self.video_timestamp = 0;
        self.audio_timestamp = 0;
        self.video_frames = 0;
        self.audio_frames = 0;
        self.pending_video = false;
        self.pending_audio = false;
    }

    fn take_packet(ring: &mut RingBuffer) -> Result<()> {
        let available = ring.read_sequential_bytes();
        if available == 0 {
            return Err(PlayerError::Decode(ERROR_MPEG_NO_DATA));
        }
        let unit = available.min(ring.packet_size());
        ring.mark_read(unit);
        ring.notify_consumed();
        Ok(())
    }

    fn fill_frame(&self, display_buffer: u32, frame_width: i32, pixel_format: PixelFormat, shade: u8) -> Result<()> {
        let width = frame_width.max(0) as u32;
        let size = DISPLAY_HEIGHT * width * pixel_format.bytes_per_pixel();
        self.memory.fill(display_buffer, shade, size as usize)
    }
}

impl DecodeBridge for SimulatedDecoder {
    fn create_context(&mut self, workspace: &MemBlock, frame_width: i32) -> Result<()> {
        debug!(
            "创建解码上下文 0x{:08X}+0x{:X}, frameWidth={}",
            workspace.addr, workspace.size, frame_width
        );
        self.context_ready = true;
        self.reset_stream();
        Ok(())
    }

    fn finish(&mut self) {
        self.reset_stream();
    }

    fn destroy_context(&mut self) {
        self.context_ready = false;
        self.reset_stream();
    }

    fn analyse(&mut self, data: &[u8]) -> PsmfHeader {
        let header = psmf::analyse(data);
        info!(
            "🔍 容器分析: offset=0x{:X}, firstTimestamp={}, lastTimestamp={}",
            header.stream_offset, header.first_timestamp, header.last_timestamp
        );
        self.reset_stream();
        self.first_timestamp = header.first_timestamp;
        header
    }

    fn register_video_channel(&mut self, channel: i32) {
        self.video_channel = channel;
    }

    fn register_audio_channel(&mut self, channel: i32) {
        self.audio_channel = channel;
    }

    fn get_avc_au(&mut self, ring: &mut RingBuffer) -> Result<()> {
        Self::take_packet(ring)?;
        self.video_timestamp = self.first_timestamp + self.video_frames as i64 * VIDEO_TIMESTAMP_STEP;
        self.pending_video = true;
        Ok(())
    }

    fn avc_decode(&mut self, display_buffer: u32, frame_width: i32, pixel_format: PixelFormat) -> Result<()> {
        if !self.context_ready || !self.pending_video {
            return Err(PlayerError::Decode(ERROR_MPEG_NO_DATA));
        }
        self.pending_video = false;
        self.video_frames += 1;
        trace!("视频帧 #{} pts={}", self.video_frames, self.video_timestamp);
        self.fill_frame(display_buffer, frame_width, pixel_format, self.video_frames as u8)
            .map_err(|_| PlayerError::Decode(ERROR_MPEG_NO_DATA))
    }

    fn write_last_frame(&mut self, display_buffer: u32, frame_width: i32, pixel_format: PixelFormat) {
        if let Err(e) = self.fill_frame(display_buffer, frame_width, pixel_format, self.video_frames as u8) {
            debug!("重复上一帧失败: {}", e);
        }
    }

    fn get_atrac_au(&mut self, ring: &mut RingBuffer) -> Result<()> {
        Self::take_packet(ring)?;
        self.audio_timestamp = self.first_timestamp + self.audio_frames as i64 * AUDIO_TIMESTAMP_STEP;
        self.pending_audio = true;
        Ok(())
    }

    fn atrac_decode(&mut self, buffer: u32, size: u32) -> Result<()> {
        if !self.pending_audio {
            self.memory.fill(buffer, 0, size as usize)?;
            return Err(PlayerError::Decode(ERROR_MPEG_NO_DATA));
        }
        self.pending_audio = false;
        self.audio_frames += 1;
        self.memory.fill(buffer, 0x11, size as usize)
    }

    fn current_video_timestamp(&self) -> i64 {
        self.video_timestamp
    }

    fn current_audio_timestamp(&self) -> i64 {
        self.audio_timestamp
    }

    fn notify_new_data(&mut self) {
        trace!("环形缓冲区有新数据");
    }
}
