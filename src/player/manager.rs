use crate::core::{
    EngineSettings, InitPlayInfo, PixelFormat, PlayMode, PlaySpeed, PlaybackState, PlayerConfig, PlayerError,
    PlayerVersion, PsmfHeader, PsmfInfo, Result, SessionSnapshot, SyncMonitor, VideoData,
};
use crate::core::{AUDIO_SAMPLES_BYTES, DEFAULT_FRAME_WIDTH, DISPLAY_HEIGHT};
use crate::player::decoder::DecodeBridge;
use crate::player::host::{AllocPolicy, HostServices, MemBlock, PartitionId, ADDRESS_MASK};
use crate::player::ringbuffer::{RingBuffer, RINGBUFFER_PACKET_SIZE};
use crate::player::source_feed::SourceFeed;
use crate::player::stream_selector::StreamSelector;
use log::{debug, error, info, trace, warn};

/// 创建解码上下文时使用的屏幕宽度
const SCREEN_WIDTH: i32 = 480;

/// 播放会话 - 整体控制一个 PSMF 播放器实例
///
/// 会话由调用方单线程驱动；create() 分配解码工作区与环形缓冲区，delete() 释放，
/// 两者各执行一次。所有状态/配置错误都在产生副作用之前返回
pub struct PlayerSession {
    id: u32,
    host: HostServices,
    bridge: Box<dyn DecodeBridge>,
    settings: EngineSettings,
    state: PlaybackState,

    // create() 参数
    display_buffer: u32,
    display_buffer_size: u32,
    playback_thread_priority: i32,

    // 会话资源
    workspace_mem: Option<MemBlock>,
    ringbuffer_mem: Option<MemBlock>,
    ringbuffer: Option<RingBuffer>,

    // 数据源
    source: Option<SourceFeed>,
    header: PsmfHeader,

    // 播放参数
    streams: StreamSelector,
    play_mode: PlayMode,
    play_speed: PlaySpeed,
    init_pts: i32,
    config: PlayerConfig,

    // getVideoData 记住的显示目标
    video_frame_width: i32,
    video_display_buffer: u32,
    video_display_pts: i32,

    sync: SyncMonitor,
}

impl PlayerSession {
    pub fn new(id: u32, host: HostServices, bridge: Box<dyn DecodeBridge>, settings: EngineSettings) -> Self {
        Self {
            id,
            host,
            bridge,
            settings,
            state: PlaybackState::None,
            display_buffer: 0,
            display_buffer_size: 0,
            playback_thread_priority: 0,
            workspace_mem: None,
            ringbuffer_mem: None,
            ringbuffer: None,
            source: None,
            header: PsmfHeader::default(),
            streams: StreamSelector::new(),
            play_mode: PlayMode::Play,
            play_speed: PlaySpeed::Normal,
            init_pts: 0,
            config: PlayerConfig::default(),
            video_frame_width: DEFAULT_FRAME_WIDTH,
            video_display_buffer: 0,
            video_display_pts: 0,
            sync: SyncMonitor::new(),
        }
    }

    fn log_ctx(&self) -> String {
        format!("[psmf:0x{:X} {:?}]", self.id, self.state)
    }

    fn check_initialized(&self) -> Result<()> {
        if !self.state.is_initialized() {
            debug!("{} 播放器未初始化", self.log_ctx());
            return Err(PlayerError::NotInitialized);
        }
        Ok(())
    }

    fn check_playing(&self) -> Result<()> {
        self.check_initialized()?;
        if !self.state.is_playing_family() {
            debug!("{} 播放器不在播放状态", self.log_ctx());
            return Err(PlayerError::NotInitialized);
        }
        Ok(())
    }

    fn check_standby_or_later(&self) -> Result<()> {
        self.check_initialized()?;
        if !self.state.at_least(PlaybackState::Standby) {
            return Err(PlayerError::NotInitialized);
        }
        Ok(())
    }

    // ==================== 生命周期 ====================

    /// 创建播放器：NONE -> INIT
    ///
    /// 分配解码工作区与 581 包的环形缓冲区（音视频共用）
    pub fn create(&mut self, display_buffer: u32, display_buffer_size: u32, priority: i32) -> Result<()> {
        if self.state.is_initialized() {
            warn!("{} ⚠️  播放器已创建，拒绝重复创建", self.log_ctx());
            return Err(PlayerError::Other("播放器已创建".to_string()));
        }

        self.display_buffer = display_buffer & ADDRESS_MASK;
        self.display_buffer_size = display_buffer_size;
        self.playback_thread_priority = priority;
        info!(
            "{} 🎮 创建播放器: displayBuffer=0x{:08X}, displayBufferSize=0x{:X}, playbackThreadPriority={}",
            self.log_ctx(),
            self.display_buffer,
            display_buffer_size,
            priority
        );

        // 包数来自外部设置，须非零且总字节数不溢出
        let packets = self.settings.ringbuffer_packets;
        let ring_size = packets
            .checked_mul(RINGBUFFER_PACKET_SIZE)
            .filter(|_| packets > 0)
            .ok_or_else(|| {
                warn!("{} ⚠️  无效的环形缓冲区包数 {}", self.log_ctx(), packets);
                PlayerError::AllocationFailed {
                    name: "scePsmfPlayer-Ringbuffer".to_string(),
                    size: u32::MAX,
                }
            })?;

        let workspace_size = self.settings.decode_workspace_size;
        let workspace = self
            .host
            .allocator
            .malloc(PartitionId::Kernel, "scePsmfPlayer-Mpeg", AllocPolicy::Low, workspace_size)
            .ok_or_else(|| PlayerError::AllocationFailed {
                name: "scePsmfPlayer-Mpeg".to_string(),
                size: workspace_size,
            })?;
        if let Err(e) = self.bridge.create_context(&workspace, SCREEN_WIDTH) {
            error!("{} ❌ 创建解码上下文失败: {}", self.log_ctx(), e);
        }

        let Some(ring_mem) = self.host.allocator.malloc(
            PartitionId::Kernel,
            "scePsmfPlayer-Ringbuffer",
            AllocPolicy::Low,
            ring_size,
        ) else {
            self.bridge.destroy_context();
            self.host.allocator.free(&workspace);
            return Err(PlayerError::AllocationFailed {
                name: "scePsmfPlayer-Ringbuffer".to_string(),
                size: ring_size,
            });
        };

        let mut ringbuffer = RingBuffer::new(packets, ring_mem.addr);
        ringbuffer.set_has_audio(true);
        ringbuffer.set_has_video(true);

        self.workspace_mem = Some(workspace);
        self.ringbuffer_mem = Some(ring_mem);
        self.ringbuffer = Some(ringbuffer);
        self.source = None;
        self.header = PsmfHeader::default();
        self.streams = StreamSelector::new();
        self.play_mode = PlayMode::Play;
        self.play_speed = PlaySpeed::Normal;
        self.config = PlayerConfig::default();
        self.video_frame_width = DEFAULT_FRAME_WIDTH;
        self.video_display_buffer = 0;
        self.video_display_pts = 0;
        self.sync = SyncMonitor::new();

        self.state = PlaybackState::Init;
        info!("{} ✅ 播放器创建完成", self.log_ctx());
        Ok(())
    }

    /// 删除播放器：任意状态 -> NONE，释放全部资源
    pub fn delete(&mut self) -> Result<()> {
        self.check_initialized()?;
        self.host.textures.reset_video_textures();
        self.release_resources();
        self.state = PlaybackState::None;
        info!("{} 🗑️  播放器已删除", self.log_ctx());
        Ok(())
    }

    fn release_resources(&mut self) {
        self.ringbuffer = None;
        self.source = None;
        if let Some(block) = self.ringbuffer_mem.take() {
            self.host.allocator.free(&block);
        }
        if let Some(block) = self.workspace_mem.take() {
            self.bridge.destroy_context();
            self.host.allocator.free(&block);
        }
    }

    /// 加载数据源：INIT -> STANDBY
    ///
    /// 加载失败只记录日志，会话依然进入 STANDBY 但没有数据源，之后的取数据按码流结束处理
    pub fn set_source(&mut self, path: &str, offset: u32, use_header_length: bool, handle_callbacks: bool) -> Result<()> {
        self.check_initialized()?;
        if self.state != PlaybackState::Init {
            return Err(PlayerError::NotInitialized);
        }

        if offset != 0 {
            debug!("{} setSource offset=0x{:X}", self.log_ctx(), offset);
        }

        match SourceFeed::load(self.host.storage.as_ref(), path, offset, use_header_length) {
            Ok(mut feed) => {
                self.header = self.bridge.analyse(feed.data());
                feed.set_cursor(self.header.stream_offset as usize);
                self.sync.set_first_timestamp(self.header.first_timestamp);
                info!(
                    "{} 📂 数据源就绪: '{}' 长度=0x{:X}, 首包偏移=0x{:X}",
                    self.log_ctx(),
                    path,
                    feed.len(),
                    feed.cursor()
                );
                self.source = Some(feed);
            }
            Err(e) => {
                error!("{} ❌ 加载 PSMF 文件 '{}' 失败: {}", self.log_ctx(), path, e);
                self.source = None;
                self.header = PsmfHeader::default();
                self.sync.set_first_timestamp(0);
            }
        }

        self.state = PlaybackState::Standby;

        self.host
            .scheduler
            .delay_thread(self.settings.set_source_delay_us, handle_callbacks);
        Ok(())
    }

    /// scePsmfPlayerSetPsmf：使用文件自身长度
    pub fn set_psmf(&mut self, path: &str) -> Result<()> {
        self.set_source(path, 0, false, false)
    }

    pub fn set_psmf_cb(&mut self, path: &str) -> Result<()> {
        self.set_source(path, 0, false, true)
    }

    /// scePsmfPlayerSetPsmfOffset：采用头部记录的长度
    pub fn set_psmf_offset(&mut self, path: &str, offset: u32) -> Result<()> {
        self.set_source(path, offset, true, false)
    }

    pub fn set_psmf_offset_cb(&mut self, path: &str, offset: u32) -> Result<()> {
        self.set_source(path, offset, true, true)
    }

    /// 释放数据源：STANDBY -> INIT（之后可以再次 setSource）
    pub fn release_source(&mut self) -> Result<()> {
        self.check_initialized()?;
        if self.state != PlaybackState::Standby {
            return Err(PlayerError::NotInitialized);
        }

        self.bridge.finish();
        if let Some(ring) = self.ringbuffer.as_mut() {
            ring.consume_all_packets();
        }
        self.source = None;
        self.host.textures.reset_video_textures();

        self.state = PlaybackState::Init;
        info!("{} ⏏️  数据源已释放", self.log_ctx());

        self.host.scheduler.delay_thread(self.settings.release_delay_us, false);
        Ok(())
    }

    /// 开始播放：-> PLAYING
    pub fn start(&mut self, play_info: Option<&InitPlayInfo>, initial_pts: i32) -> Result<()> {
        self.check_initialized()?;

        if let Some(info) = play_info {
            self.streams.load(info);
            self.play_mode = PlayMode::from_raw(info.play_mode);
            self.play_speed = PlaySpeed::from_raw(info.play_speed);
            self.bridge.register_video_channel(info.video_stream_num);
            self.bridge.register_audio_channel(info.audio_stream_num);
            info!(
                "{} 播放参数: videoCodec=0x{:X}, videoStreamNum={}, audioCodec=0x{:X}, audioStreamNum={}, playMode={}, playSpeed={}",
                self.log_ctx(),
                info.video_codec,
                info.video_stream_num,
                info.audio_codec,
                info.audio_stream_num,
                info.play_mode,
                info.play_speed
            );
        }

        self.init_pts = initial_pts;
        self.state = PlaybackState::Playing;
        self.sync.reset_audio_fetch();
        info!("{} 🎬 开始播放 initPts={}", self.log_ctx(), initial_pts);
        Ok(())
    }

    /// 停止播放：-> STANDBY（之后仍可 start 继续）
    pub fn stop(&mut self) -> Result<()> {
        self.check_initialized()?;
        self.host.textures.reset_video_textures();
        self.state = PlaybackState::Standby;
        info!("{} ⏹️  停止播放", self.log_ctx());
        Ok(())
    }

    /// 检查播放是否结束
    ///
    /// 以剩余字节（数据源未读 + 环形缓冲区已排队）判断，不使用头部声明的结束时间戳
    pub fn update(&mut self) -> Result<()> {
        self.check_playing()?;

        let remaining = self.remaining_bytes();
        trace!("{} update remaining=0x{:X}", self.log_ctx(), remaining);
        if remaining <= 0 && self.state != PlaybackState::PlayingFinished {
            self.state = PlaybackState::PlayingFinished;
            info!("{} 🏁 数据已全部消费，播放结束", self.log_ctx());
        }
        Ok(())
    }

    /// 数据源未读字节 + 环形缓冲区中排队的字节
    pub fn remaining_bytes(&self) -> i64 {
        let unread = self.source.as_ref().map_or(0, |feed| feed.unread_bytes() as i64);
        let queued = self.ringbuffer.as_ref().map_or(0, |ring| {
            ring.packets_in_ringbuffer() as i64 * ring.packet_size() as i64
        });
        unread + queued
    }

    fn source_exhausted(&self) -> bool {
        self.source.as_ref().map_or(true, |feed| feed.is_exhausted())
    }

    /// 用数据源补充环形缓冲区，有新数据时通知解码端
    fn replenish(&mut self) -> Result<u32> {
        let Some(ring) = self.ringbuffer.as_mut() else {
            return Ok(0);
        };
        let Some(feed) = self.source.as_mut() else {
            ring.notify_consumed();
            return Ok(0);
        };

        let added = ring.fill_from(feed, self.host.memory.as_ref())?;
        if added > 0 {
            self.bridge.notify_new_data();
        }
        Ok(added)
    }

    // ==================== 取数据 ====================

    /// 取一帧视频
    ///
    /// 视频领先音频过多时不解码，只重复上一帧；无论是否解码都会重新登记显示区域
    pub fn get_video_data(&mut self, mut video_data: Option<&mut VideoData>) -> Result<()> {
        self.check_playing()?;
        if self.state != PlaybackState::Playing && self.state != PlaybackState::PlayingFinished {
            return Err(PlayerError::NotInitialized);
        }

        if self.play_mode == PlayMode::Pause {
            debug!("{} getVideoData 暂停中", self.log_ctx());
            return Ok(());
        }

        if let Some(data) = video_data.as_deref() {
            self.video_frame_width = data.frame_width;
            self.video_display_buffer = data.display_buffer & ADDRESS_MASK;
            self.video_display_pts = data.display_pts;
            debug!(
                "{} getVideoData frameWidth={}, displayBuffer=0x{:08X}, displayPts={}",
                self.log_ctx(),
                self.video_frame_width,
                self.video_display_buffer,
                self.video_display_pts
            );
        }

        // 调用方地址无效时回退到 create() 时的显示缓冲区
        if self.host.memory.is_address_good(self.video_display_buffer) {
            self.display_buffer = self.video_display_buffer;
        } else if let Some(data) = video_data.as_deref_mut() {
            data.display_buffer = self.display_buffer;
            if self.video_frame_width <= 0 || self.video_frame_width > DEFAULT_FRAME_WIDTH {
                self.video_frame_width = DEFAULT_FRAME_WIDTH;
                data.frame_width = DEFAULT_FRAME_WIDTH;
            }
        }

        let video_timestamp = self.bridge.current_video_timestamp();
        let audio_timestamp = self.bridge.current_audio_timestamp();
        let pixel_format = self.config.pixel_format;

        let result = if self.sync.should_repeat_video_frame(video_timestamp, audio_timestamp) {
            trace!(
                "{} 视频领先音频 (video={}, audio={})，重复上一帧",
                self.log_ctx(),
                video_timestamp,
                audio_timestamp
            );
            self.bridge
                .write_last_frame(self.display_buffer, self.video_frame_width, pixel_format);
            Ok(())
        } else {
            self.decode_next_frame(pixel_format)
        };

        // 不把视频图像缓存为纹理，保证画面流畅
        let frame_bytes = DISPLAY_HEIGHT
            .saturating_mul(self.video_frame_width.max(0) as u32)
            .saturating_mul(pixel_format.bytes_per_pixel());
        self.host
            .textures
            .add_video_texture(self.display_buffer, self.display_buffer.wrapping_add(frame_bytes));

        let current_timestamp = self.bridge.current_video_timestamp();
        if let Some(data) = video_data.as_deref_mut() {
            data.display_pts = current_timestamp as i32;
        }

        debug!(
            "{} getVideoData currentVideoTimestamp={}, result={:?}",
            self.log_ctx(),
            current_timestamp,
            result.as_ref().err()
        );
        result
    }

    /// 补充数据后取一个视频 Au 并解码到显示缓冲区
    fn decode_next_frame(&mut self, pixel_format: PixelFormat) -> Result<()> {
        self.replenish()?;
        let exhausted = self.source_exhausted();
        let Some(ring) = self.ringbuffer.as_mut() else {
            return Err(PlayerError::NotInitialized);
        };
        match self.bridge.get_avc_au(ring) {
            Ok(()) => self
                .bridge
                .avc_decode(self.display_buffer, self.video_frame_width, pixel_format),
            Err(e) => {
                // 文件数据已读完：丢弃残留包，让 update() 能够结束播放
                if exhausted {
                    ring.consume_all_packets();
                }
                Err(e)
            }
        }
    }

        /// 取一块音频（固定 8192 字节）
    pub fn get_audio_data(&mut self, buffer: u32) -> Result<()> {
        self.check_playing()?;

        if self.play_mode == PlayMode::Pause {
            debug!("{} getAudioData 暂停中，输出静音", self.log_ctx());
            self.host.memory.fill(buffer, 0, AUDIO_SAMPLES_BYTES as usize)?;
            return Ok(());
        }

        let video_timestamp = self.bridge.current_video_timestamp();
        let audio_timestamp = self.bridge.current_audio_timestamp();
        if self.sync.should_stall_audio(video_timestamp, audio_timestamp) {
            debug!(
                "{} 音频领先视频 (video={}, audio={})",
                self.log_ctx(),
                video_timestamp,
                audio_timestamp
            );
            return Err(PlayerError::AudioVideoOutOfSync);
        }

        self.replenish()?;
        let Some(ring) = self.ringbuffer.as_mut() else {
            return Err(PlayerError::NotInitialized);
        };
        let fetch = self.bridge.get_atrac_au(ring);
        self.sync.record_audio_fetch(fetch.is_ok());

        let result = self.bridge.atrac_decode(buffer, AUDIO_SAMPLES_BYTES);
        debug!(
            "{} getAudioData currentAudioTimestamp={}, result={:?}",
            self.log_ctx(),
            self.bridge.current_audio_timestamp(),
            result.as_ref().err()
        );
        result
    }

    // ==================== 查询与配置 ====================

    /// 当前状态（可在中断上下文调用）
    pub fn get_current_status(&self) -> Result<PlaybackState> {
        if !self.state.is_initialized() {
            return Err(PlayerError::NotInitialized);
        }
        Ok(self.state)
    }

    pub fn get_psmf_info(&self) -> Result<PsmfInfo> {
        self.check_standby_or_later()?;
        Ok(PsmfInfo {
            last_timestamp: self.header.last_timestamp,
            avc_stream_num: self.header.avc_streams,
            atrac_stream_num: self.header.atrac_streams,
            pcm_stream_num: self.header.pcm_streams,
            player_version: PlayerVersion::Full,
        })
    }

    pub fn get_audio_out_size(&self) -> Result<u32> {
        self.check_initialized()?;
        Ok(AUDIO_SAMPLES_BYTES)
    }

    pub fn configure(&mut self, mode: i32, value: i32) -> Result<()> {
        self.check_initialized()?;
        self.config.configure(mode, value)
    }

    pub fn change_play_mode(&mut self, mode: i32, speed: i32) -> Result<()> {
        self.check_initialized()?;
        self.play_mode = PlayMode::from_raw(mode);
        self.play_speed = PlaySpeed::from_raw(speed);
        debug!("{} 播放模式 {:?} / {:?}", self.log_ctx(), self.play_mode, self.play_speed);
        Ok(())
    }

    pub fn get_current_play_mode(&self) -> Result<(PlayMode, PlaySpeed)> {
        self.check_initialized()?;
        Ok((self.play_mode, self.play_speed))
    }

    /// 当前视频时间戳
    pub fn get_current_pts(&self) -> Result<i64> {
        self.check_standby_or_later()?;
        Ok(self.bridge.current_video_timestamp())
    }

    /// (codec, channel)
    pub fn get_current_video_stream(&self) -> Result<(i32, i32)> {
        self.check_standby_or_later()?;
        Ok(self.streams.video())
    }

    pub fn get_current_audio_stream(&self) -> Result<(i32, i32)> {
        self.check_standby_or_later()?;
        Ok(self.streams.audio())
    }

    pub fn select_specific_video(&mut self, codec: i32, channel: i32) -> Result<()> {
        self.check_initialized()?;
        self.streams.select_specific_video(codec, channel);
        Ok(())
    }

    pub fn select_specific_audio(&mut self, codec: i32, channel: i32) -> Result<()> {
        self.check_initialized()?;
        self.streams.select_specific_audio(codec, channel);
        Ok(())
    }

    pub fn select_video(&mut self) -> Result<()> {
        self.check_initialized()?;
        let channel = self.streams.select_next_video();
        debug!("{} 切换到视频通道 {}", self.log_ctx(), channel);
        Ok(())
    }

    pub fn select_audio(&mut self) -> Result<()> {
        self.check_initialized()?;
        let channel = self.streams.select_next_audio();
        debug!("{} 切换到音频通道 {}", self.log_ctx(), channel);
        Ok(())
    }

    pub fn break_player(&mut self) -> Result<()> {
        self.check_initialized()?;
        warn!("{} scePsmfPlayerBreak 未实现", self.log_ctx());
        Ok(())
    }

    pub fn set_temp_buf(&mut self, addr: u32, size: u32) -> Result<()> {
        warn!("{} scePsmfPlayerSetTempBuf 未实现 addr=0x{:08X}, size=0x{:X}", self.log_ctx(), addr, size);
        Ok(())
    }

    // ==================== 访问器 ====================

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn ringbuffer(&self) -> Option<&RingBuffer> {
        self.ringbuffer.as_ref()
    }

    pub fn source(&self) -> Option<&SourceFeed> {
        self.source.as_ref()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn display_buffer(&self) -> u32 {
        self.display_buffer
    }

    pub fn initial_pts(&self) -> i32 {
        self.init_pts
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            play_mode: self.play_mode,
            play_speed: self.play_speed,
            video_timestamp: self.bridge.current_video_timestamp(),
            audio_timestamp: self.bridge.current_audio_timestamp(),
            remaining_bytes: self.remaining_bytes(),
            source_path: self.source.as_ref().map(|feed| feed.path().to_string()),
        }
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        if self.workspace_mem.is_some() || self.ringbuffer_mem.is_some() {
            warn!("{} ⚠ PlayerSession 被 drop，但未调用 delete()，释放残留资源", self.log_ctx());
            self.release_resources();
        }
    }
}
