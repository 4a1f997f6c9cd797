use crate::core::{ErrorCode, Format, PlaybackState};

/// 播放器事件监听器
///
/// 所有回调都在控制线程上执行
pub trait EventListener: Send {
    fn on_player_error(&mut self, _error_code: ErrorCode) {}

    fn on_playback_state_changed(&mut self, _state: PlaybackState) {}

    fn on_video_surface_attach(&mut self) {}

    fn on_video_surface_detach(&mut self) {}

    /// 视频轨道的宽高、旋转角度、帧率等信息
    fn on_video_metadata_changed(&mut self, _format: &Format) {}
}

/// `add_event_listener` 返回的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// 视频帧送显/丢弃计数（工作线程回调）
pub trait VideoFrameListener: Send + Sync {
    fn on_frame_release(&self);

    fn on_frame_lose(&self);
}

/// 视频轨道绑定时的元数据通知（工作线程回调）
pub trait VideoMetadataListener: Send + Sync {
    fn on_video_metadata_changed(&self, format: &Format);
}
