// 播放器核心模块

pub mod host;
pub mod storage;
pub mod source_feed;
pub mod ringbuffer;
pub mod decoder;
pub mod stream_selector;
pub mod manager;
pub mod registry;

pub use decoder::{DecodeBridge, SimulatedDecoder};
pub use host::{
    ChannelScheduler, EmulatedMemory, FlatMemory, HostServices, LinearAllocator, TextureRegistry, YieldRequest,
};
pub use manager::PlayerSession;
pub use registry::{BridgeFactory, SessionTable};
pub use ringbuffer::RingBuffer;
pub use source_feed::SourceFeed;
pub use storage::{LocalStorage, MediaStorage, MemoryStorage};
pub use stream_selector::StreamSelector;
