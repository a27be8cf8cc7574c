use anyhow::{Context, Result};
use log::{info, warn};
use psmf_player::core::{EngineSettings, InitPlayInfo, PlaybackState, VideoData};
use psmf_player::player::{
    ChannelScheduler, FlatMemory, HostServices, LinearAllocator, LocalStorage, PlayerSession, SimulatedDecoder,
    TextureRegistry,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const RAM_BASE: u32 = 0x0800_0000;
const RAM_SIZE: usize = 0x0200_0000;
const HEAP_BASE: u32 = 0x0880_0000;
const HEAP_SIZE: u32 = 0x0180_0000;
const DISPLAY_BUFFER: u32 = 0x0840_0000;
const AUDIO_BUFFER: u32 = 0x0850_0000;

/// 一次演示播放的描述（JSON）
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RunDescription {
    /// 本地目录，作为 "ms0:" 的根
    root: String,
    path: String,
    offset: u32,
    use_header_length: bool,
    /// 最多驱动的 tick 数
    max_ticks: u32,
    /// 为 true 时按 getAudioData 的节奏真正睡眠
    realtime: bool,
    settings: EngineSettings,
}

impl Default for RunDescription {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            path: "ms0:/movie.pmf".to_string(),
            offset: 0,
            use_header_length: false,
            max_ticks: 10_000,
            realtime: false,
            settings: EngineSettings::default(),
        }
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("🎬 PSMF Player 演示启动");

    let run: RunDescription = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("读取运行描述 {} 失败", path))?;
            serde_json::from_str(&text).context("解析运行描述失败")?
        }
        None => RunDescription::default(),
    };
    info!("运行描述: {:?}", run);

    let memory = Arc::new(FlatMemory::new(RAM_BASE, RAM_SIZE));
    let (scheduler, yields) = ChannelScheduler::new();
    let host = HostServices {
        memory: memory.clone(),
        allocator: Arc::new(LinearAllocator::new(HEAP_BASE, HEAP_SIZE)),
        textures: Arc::new(TextureRegistry::new()),
        scheduler: Arc::new(scheduler),
        storage: Arc::new(LocalStorage::new(&run.root)),
    };

    let mut session = PlayerSession::new(
        1,
        host,
        Box::new(SimulatedDecoder::new(memory.clone())),
        run.settings.clone(),
    );

    session.create(DISPLAY_BUFFER, 0x88000, 0x20)?;
    session.set_source(&run.path, run.offset, run.use_header_length, false)?;

    // 宿主调度循环：消化让出请求
    for request in yields.try_iter() {
        info!("⏸️  让出 {}us (handleCallbacks={})", request.micros, request.handle_callbacks);
        if run.realtime {
            std::thread::sleep(Duration::from_micros(request.micros as u64));
        }
    }

    let info = serde_json::from_value::<InitPlayInfo>(serde_json::json!({
        "video_codec": 0x0E,
        "video_stream_num": 0,
        "audio_codec": 0x0F,
        "audio_stream_num": 0,
        "play_mode": 0,
        "play_speed": 2,
    }))?;
    session.start(Some(&info), 0)?;

    let mut video = VideoData {
        frame_width: 512,
        display_buffer: DISPLAY_BUFFER,
        display_pts: 0,
    };
    let mut ticks = 0;
    while ticks < run.max_ticks {
        if let Err(e) = session.get_video_data(Some(&mut video)) {
            if !e.is_recoverable() {
                warn!("getVideoData: {}", e);
            }
        }
        if let Err(e) = session.get_audio_data(AUDIO_BUFFER) {
            if !e.is_recoverable() {
                warn!("getAudioData: {}", e);
            }
        }
        session.update()?;
        ticks += 1;

        if session.state() == PlaybackState::PlayingFinished {
            break;
        }
        if run.realtime {
            // 2048 个样本 @ 44.1kHz
            std::thread::sleep(Duration::from_micros(46_440));
        }
    }

    info!("🏁 {} 个 tick 后结束，最后 pts={}", ticks, video.display_pts);
    println!("{}", serde_json::to_string_pretty(&session.snapshot())?);

    session.stop()?;
    session.release_source()?;
    session.delete()?;
    for request in yields.try_iter() {
        info!("⏸️  让出 {}us", request.micros);
    }
    Ok(())
}
