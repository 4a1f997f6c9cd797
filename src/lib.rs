// MYY Engine - 音视频播放调度引擎
//
// core: 被动数据结构、时钟、配置、错误与日志
// player: 数据源、解码渲染单元、命令队列与播放状态机

pub mod core;
pub mod player;

pub use crate::core::{
    ErrorCode, Format, MediaItem, PlaybackState, PlayerConfig, PlayerError, PlayerState, Result,
};
pub use crate::player::{EventListener, PlaybackManager, PlayerBuilder};
