use crate::core::{
    result_code, EngineSettings, InitPlayInfo, PlayerError, PsmfInfo, Result, VideoData,
};
use crate::player::decoder::DecodeBridge;
use crate::player::host::{EmulatedMemory, HostServices};
use crate::player::manager::PlayerSession;
use bytemuck::{Pod, Zeroable};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type SharedSession = Arc<Mutex<PlayerSession>>;

/// 为每个新会话创建解码桥
pub type BridgeFactory = Box<dyn Fn() -> Box<dyn DecodeBridge> + Send + Sync>;

/// 句柄起始值（0 保留为无效句柄）
const FIRST_HANDLE: u32 = 0x1000;

// ============= 模拟内存中的 ABI 结构（小端） =============

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawCreateParams {
    pub display_buffer: u32,
    pub display_buffer_size: u32,
    pub playback_thread_priority: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawInitPlayInfo {
    pub video_codec: i32,
    pub video_stream_num: i32,
    pub audio_codec: i32,
    pub audio_stream_num: i32,
    pub play_mode: i32,
    pub play_speed: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawVideoData {
    pub frame_width: i32,
    pub display_buffer: u32,
    pub display_pts: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawPsmfInfo {
    pub last_timestamp: i32,
    pub avc_stream_num: i32,
    pub atrac_stream_num: i32,
    pub pcm_stream_num: i32,
    pub player_version: i32,
}

impl From<RawInitPlayInfo> for InitPlayInfo {
    fn from(raw: RawInitPlayInfo) -> Self {
        Self {
            video_codec: raw.video_codec,
            video_stream_num: raw.video_stream_num,
            audio_codec: raw.audio_codec,
            audio_stream_num: raw.audio_stream_num,
            play_mode: raw.play_mode,
            play_speed: raw.play_speed,
        }
    }
}

impl From<RawVideoData> for VideoData {
    fn from(raw: RawVideoData) -> Self {
        Self {
            frame_width: raw.frame_width,
            display_buffer: raw.display_buffer,
            display_pts: raw.display_pts,
        }
    }
}

impl From<VideoData> for RawVideoData {
    fn from(data: VideoData) -> Self {
        Self {
            frame_width: data.frame_width,
            display_buffer: data.display_buffer,
            display_pts: data.display_pts,
        }
    }
}

impl From<PsmfInfo> for RawPsmfInfo {
    fn from(info: PsmfInfo) -> Self {
        Self {
            last_timestamp: info.last_timestamp as i32,
            avc_stream_num: info.avc_stream_num,
            atrac_stream_num: info.atrac_stream_num,
            pcm_stream_num: info.pcm_stream_num,
            player_version: info.player_version.raw(),
        }
    }
}

pub fn read_struct<T: Pod>(memory: &dyn EmulatedMemory, addr: u32) -> Result<T> {
    let bytes = memory.read(addr, std::mem::size_of::<T>())?;
    Ok(bytemuck::pod_read_unaligned(&bytes))
}

pub fn write_struct<T: Pod>(memory: &dyn EmulatedMemory, addr: u32, value: &T) -> Result<()> {
    memory.write(addr, bytemuck::bytes_of(value))
}

/// 会话表 - 不透明句柄到会话实例的映射
///
/// 同一会话的调用由会话锁串行化；表本身只在创建/删除时写锁
pub struct SessionTable {
    sessions: RwLock<HashMap<u32, SharedSession>>,
    next_handle: AtomicU32,
    host: HostServices,
    settings: EngineSettings,
    bridge_factory: BridgeFactory,
}

impl SessionTable {
    pub fn new(host: HostServices, settings: EngineSettings, bridge_factory: BridgeFactory) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_handle: AtomicU32::new(FIRST_HANDLE),
            host,
            settings,
            bridge_factory,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn get(&self, handle: u32) -> Result<SharedSession> {
        self.sessions
            .read()
            .get(&handle)
            .cloned()
            .ok_or(PlayerError::UnknownHandle(handle))
    }

    /// 创建会话并执行 create()，成功后返回句柄
    pub fn create_session(&self, display_buffer: u32, display_buffer_size: u32, priority: i32) -> Result<u32> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let mut session = PlayerSession::new(handle, self.host.clone(), (self.bridge_factory)(), self.settings.clone());
        session.create(display_buffer, display_buffer_size, priority)?;

        self.sessions.write().insert(handle, Arc::new(Mutex::new(session)));
        info!("🆕 新会话 0x{:X}（共 {} 个）", handle, self.len());
        Ok(handle)
    }

    /// delete() 后把会话移出表
    pub fn delete_session(&self, handle: u32) -> Result<()> {
        self.with_session("deleteSession", handle, |session| session.delete())?;
        self.sessions.write().remove(&handle);
        Ok(())
    }

    /// 在会话锁内执行一次操作，失败时带上操作名记录日志
    pub fn with_session<T>(
        &self,
        op_name: &str,
        handle: u32,
        f: impl FnOnce(&mut PlayerSession) -> Result<T>,
    ) -> Result<T> {
        let session = self.get(handle).map_err(|e| {
            warn!("{} 未知句柄 0x{:X}", op_name, handle);
            e
        })?;
        let mut session = session.lock();
        let result = f(&mut session);
        if let Err(e) = &result {
            if e.is_recoverable() {
                debug!("{} 0x{:X} -> 0x{:08X} ({})", op_name, handle, e.code(), e);
            } else {
                warn!("{} 0x{:X} -> 0x{:08X} ({})", op_name, handle, e.code(), e);
            }
        }
        result
    }

    /// 固件返回值形式：成功为 0，失败为错误码
    pub fn dispatch<T>(&self, op_name: &str, handle: u32, f: impl FnOnce(&mut PlayerSession) -> Result<T>) -> u32 {
        result_code(&self.with_session(op_name, handle, f))
    }

    // ============= 以模拟内存为参数的入口 =============

    fn memory(&self) -> &dyn EmulatedMemory {
        self.host.memory.as_ref()
    }

    /// scePsmfPlayerCreate：读取创建参数，句柄写回 handle_addr
    pub fn abi_create(&self, handle_addr: u32, params_addr: u32) -> u32 {
        let result = read_struct::<RawCreateParams>(self.memory(), params_addr).and_then(|params| {
            let handle = self.create_session(
                params.display_buffer,
                params.display_buffer_size,
                params.playback_thread_priority,
            )?;
            self.memory().write32(handle_addr, handle)?;
            Ok(())
        });
        if let Err(e) = &result {
            warn!("createSession -> 0x{:08X} ({})", e.code(), e);
        }
        result_code(&result)
    }

    /// scePsmfPlayerStart：info_addr 为 0 时不修改播放参数
    pub fn abi_start(&self, handle: u32, info_addr: u32, initial_pts: i32) -> u32 {
        let info = if info_addr != 0 {
            match read_struct::<RawInitPlayInfo>(self.memory(), info_addr) {
                Ok(raw) => Some(InitPlayInfo::from(raw)),
                Err(e) => return e.code(),
            }
        } else {
            None
        };
        self.dispatch("start", handle, |session| session.start(info.as_ref(), initial_pts))
    }

    /// scePsmfPlayerGetVideoData：描述符地址无效时按无描述符处理
    pub fn abi_get_video_data(&self, handle: u32, descriptor_addr: u32) -> u32 {
        let memory = self.memory();
        let mut descriptor = if memory.is_address_good(descriptor_addr) {
            read_struct::<RawVideoData>(memory, descriptor_addr)
                .ok()
                .map(VideoData::from)
        } else {
            None
        };

        let code = self.dispatch("getVideoData", handle, |session| {
            session.get_video_data(descriptor.as_mut())
        });

        if let Some(data) = descriptor {
            if let Err(e) = write_struct(memory, descriptor_addr, &RawVideoData::from(data)) {
                warn!("getVideoData 写回描述符失败: {}", e);
            }
        }
        code
    }

    pub fn abi_get_audio_data(&self, handle: u32, buffer_addr: u32) -> u32 {
        self.dispatch("getAudioData", handle, |session| session.get_audio_data(buffer_addr))
    }

    /// scePsmfPlayerGetCurrentStatus：成功时返回状态值本身
    pub fn abi_get_current_status(&self, handle: u32) -> u32 {
        match self.with_session("getCurrentStatus", handle, |session| session.get_current_status()) {
            Ok(state) => state.code(),
            Err(e) => e.code(),
        }
    }

    pub fn abi_get_psmf_info(&self, handle: u32, info_addr: u32) -> u32 {
        self.dispatch("getPsmfInfo", handle, |session| {
            let info = session.get_psmf_info()?;
            write_struct(self.memory(), info_addr, &RawPsmfInfo::from(info))
        })
    }

    pub fn abi_get_current_video_stream(&self, handle: u32, codec_addr: u32, channel_addr: u32) -> u32 {
        self.dispatch("getCurrentVideoStream", handle, |session| {
            let (codec, channel) = session.get_current_video_stream()?;
            self.write_pair(codec_addr, codec, channel_addr, channel)
        })
    }

    pub fn abi_get_current_audio_stream(&self, handle: u32, codec_addr: u32, channel_addr: u32) -> u32 {
        self.dispatch("getCurrentAudioStream", handle, |session| {
            let (codec, channel) = session.get_current_audio_stream()?;
            self.write_pair(codec_addr, codec, channel_addr, channel)
        })
    }

    pub fn abi_get_current_play_mode(&self, handle: u32, mode_addr: u32, speed_addr: u32) -> u32 {
        self.dispatch("getCurrentPlayMode", handle, |session| {
            let (mode, speed) = session.get_current_play_mode()?;
            self.write_pair(mode_addr, mode.raw(), speed_addr, speed.raw())
        })
    }

    pub fn abi_get_current_pts(&self, handle: u32, pts_addr: u32) -> u32 {
        self.dispatch("getCurrentPts", handle, |session| {
            let pts = session.get_current_pts()?;
            self.memory().write32(pts_addr, pts as u32)
        })
    }

    /// 地址为 0 的输出参数跳过
    fn write_pair(&self, first_addr: u32, first: i32, second_addr: u32, second: i32) -> Result<()> {
        let memory = self.memory();
        if first_addr != 0 {
            memory.write32(first_addr, first as u32)?;
        }
        if second_addr != 0 {
            memory.write32(second_addr, second as u32)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::codes;
    use crate::core::psmf;
    use crate::player::decoder::SimulatedDecoder;
    use crate::player::host::{ChannelScheduler, FlatMemory, LinearAllocator, TextureRegistry};
    use crate::player::storage::MemoryStorage;

    const RAM_BASE: u32 = 0x0800_0000;
    const DISPLAY: u32 = 0x0804_0000;
    const ARGS: u32 = 0x0800_1000;

    fn table() -> (SessionTable, Arc<FlatMemory>, Arc<MemoryStorage>, Arc<LinearAllocator>) {
        let memory = Arc::new(FlatMemory::new(RAM_BASE, 0x0040_0000));
        let allocator = Arc::new(LinearAllocator::new(0x0810_0000, 0x0030_0000));
        let storage = Arc::new(MemoryStorage::new());
        let (scheduler, _yields) = ChannelScheduler::new();
        let host = HostServices {
            memory: memory.clone(),
            allocator: allocator.clone(),
            textures: Arc::new(TextureRegistry::new()),
            scheduler: Arc::new(scheduler),
            storage: storage.clone(),
        };
        let decoder_memory = memory.clone();
        let factory: BridgeFactory = Box::new(move || Box::new(SimulatedDecoder::new(decoder_memory.clone())));
        (
            SessionTable::new(host, EngineSettings::default(), factory),
            memory,
            storage,
            allocator,
        )
    }

    #[test]
    fn test_unknown_handle_is_not_initialized() {
        let (table, _, _, _) = table();
        assert_eq!(
            table.dispatch("update", 0xDEAD, |session| session.update()),
            codes::ERROR_PSMFPLAYER_NOT_INITIALIZED
        );
        assert_eq!(table.abi_get_current_status(0xDEAD), codes::ERROR_PSMFPLAYER_NOT_INITIALIZED);
    }

    #[test]
    fn test_abi_create_and_delete() {
        let (table, memory, _, allocator) = table();
        write_struct(
            memory.as_ref(),
            ARGS,
            &RawCreateParams {
                display_buffer: DISPLAY,
                display_buffer_size: 0x88000,
                playback_thread_priority: 0x17,
            },
        )
        .unwrap();
        assert_eq!(table.abi_create(ARGS + 0x100, ARGS), 0);
        let handle = memory.read32(ARGS + 0x100).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.abi_get_current_status(handle), 1);

        table.delete_session(handle).unwrap();
        assert!(table.is_empty());
        assert!(allocator.allocated().is_empty());
        assert!(matches!(table.delete_session(handle), Err(PlayerError::UnknownHandle(_))));
    }

    #[test]
    fn test_sessions_are_independent() {
        let (table, _, storage, _) = table();
        storage.insert("ms0:/a.pmf", {
            let mut data = psmf::build_header(0x800, 0x800, 90_000, 180_000);
            data.resize(0x1000, 0);
            data
        });
        let first = table.create_session(DISPLAY, 0x88000, 0x20).unwrap();
        let second = table.create_session(DISPLAY, 0x88000, 0x20).unwrap();
        assert_ne!(first, second);

        assert_eq!(table.dispatch("setPsmf", first, |s| s.set_psmf("ms0:/a.pmf")), 0);
        assert_eq!(table.abi_get_current_status(first), 2);
        assert_eq!(table.abi_get_current_status(second), 1);
    }

    #[test]
    fn test_abi_video_descriptor_round_trip() {
        let (table, memory, storage, _) = table();
        let mut data = psmf::build_header(0x800, 0x2000, 90_000, 180_000);
        data.resize(0x2800, 0x47);
        storage.insert("ms0:/a.pmf", data);

        let handle = table.create_session(DISPLAY, 0x88000, 0x20).unwrap();
        table.dispatch("setPsmf", handle, |s| s.set_psmf("ms0:/a.pmf"));
        write_struct(
            memory.as_ref(),
            ARGS,
            &RawInitPlayInfo {
                video_codec: 0x0E,
                video_stream_num: 0,
                audio_codec: 0x0F,
                audio_stream_num: 0,
                play_mode: 0,
                play_speed: 2,
            },
        )
        .unwrap();
        assert_eq!(table.abi_start(handle, ARGS, 0), 0);

        write_struct(
            memory.as_ref(),
            ARGS + 0x40,
            &RawVideoData {
                frame_width: 0,
                display_buffer: 0,
                display_pts: 0,
            },
        )
        .unwrap();
        assert_eq!(table.abi_get_video_data(handle, ARGS + 0x40), 0);
        let descriptor: RawVideoData = read_struct(memory.as_ref(), ARGS + 0x40).unwrap();
        assert_eq!(descriptor.display_buffer, DISPLAY);
        assert_eq!(descriptor.frame_width, 512);
        assert_eq!(descriptor.display_pts, 90_000);

        assert_eq!(table.abi_get_current_video_stream(handle, ARGS + 0x80, ARGS + 0x84), 0);
        assert_eq!(memory.read32(ARGS + 0x80).unwrap(), 0x0E);

        assert_eq!(table.abi_get_psmf_info(handle, ARGS + 0xC0), 0);
        let info: RawPsmfInfo = read_struct(memory.as_ref(), ARGS + 0xC0).unwrap();
        assert_eq!(info.last_timestamp, 180_000);
        assert_eq!(info.avc_stream_num, 1);
        assert_eq!(info.atrac_stream_num, 1);
    }
}
