//! PSMF 播放器控制服务
//!
//! 会话状态机、环形缓冲区补充、音视频同步与流选择；
//! 解码、存储、内存与调度由宿主通过 trait 提供

pub mod core;
pub mod player;
