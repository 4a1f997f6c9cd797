use crate::core::{ClockState, Format, MediaClock, PlaybackTuning, PlayerLog, TrackType, VideoClock};
use crate::player::codec::{
    same_surface, BufferInfo, CodecError, Decoder, DecoderConfiguration, DecoderFactory, VideoSurface,
};
use crate::player::listener::{VideoFrameListener, VideoMetadataListener};
use crate::player::media_source::MediaSource;
use crate::player::renderer::{CodecCore, CodecHooks, CodecRenderer};
use crate::plog;
use std::sync::Arc;

pub type VideoRenderer = CodecRenderer<VideoHooks>;

/// 对一个视频帧的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// 立即送显
    Present,
    /// 太早，下一轮再看
    Hold,
    /// 太晚，丢弃并计为丢帧
    Drop,
}

/// 视频帧的同步策略
///
/// 播放位置落在帧时间戳前后 `sync_limit_us` 内即送显；
/// 帧超前但不超过 `leading_limit_us` 时保留；其余丢弃
pub fn decide_frame_action(
    position_us: i64,
    presentation_time_us: i64,
    sync_limit_us: i64,
    leading_limit_us: i64,
) -> FrameAction {
    let sync_limit = if sync_limit_us > 0 { sync_limit_us } else { 1 };
    let sync_range = (presentation_time_us - sync_limit)..=(presentation_time_us + sync_limit);
    if sync_range.contains(&position_us) {
        FrameAction::Present
    } else if (position_us..=position_us + leading_limit_us).contains(&presentation_time_us) {
        FrameAction::Hold
    } else {
        FrameAction::Drop
    }
}

/// 视频渲染器的差异部分
///
/// 只有存在输出平面时才绑定视频轨道，没有平面时数据源会跳过视频样本，
/// 音频可以继续播放
pub struct VideoHooks {
    surface: Option<Arc<dyn VideoSurface>>,
    video_format: Option<Format>,
    sync_limit_us: i64,
    leading_limit_us: i64,
    metadata_listener: Option<Arc<dyn VideoMetadataListener>>,
    frame_listener: Option<Arc<dyn VideoFrameListener>>,
    log: PlayerLog,
}

impl VideoHooks {
    pub fn new(
        sync_limit_us: i64,
        leading_limit_us: i64,
        metadata_listener: Option<Arc<dyn VideoMetadataListener>>,
        frame_listener: Option<Arc<dyn VideoFrameListener>>,
        log: PlayerLog,
    ) -> Self {
        Self {
            surface: None,
            video_format: None,
            sync_limit_us,
            leading_limit_us,
            metadata_listener,
            frame_listener,
            log,
        }
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// 切换输出平面：能原地替换就替换，否则释放会话等待重建
    fn set_output(&mut self, core: &mut CodecCore, output: Option<Arc<dyn VideoSurface>>) {
        match (&self.surface, &output) {
            (Some(current), Some(next)) if same_surface(current, next) => return,
            (None, None) => return,
            _ => {}
        }

        let swapped = match (core.decoder_mut(), &self.surface, &output) {
            (Some(decoder), Some(_), Some(next)) => match decoder.set_output_surface(next.clone()) {
                Ok(()) => true,
                Err(e) => {
                    plog!(self.log, Warn, "⚠️ 无法原地替换输出平面: {}", e);
                    false
                }
            },
            _ => false,
        };
        if !swapped {
            core.release_decoder();
        }

        plog!(
            self.log,
            Info,
            "🖼️ 输出平面{}",
            if output.is_some() { "已连接" } else { "已断开" }
        );
        self.surface = output;
    }
}

impl VideoRenderer {
    pub fn create(
        tuning: &PlaybackTuning,
        decoder_factory: Arc<dyn DecoderFactory>,
        metadata_listener: Option<Arc<dyn VideoMetadataListener>>,
        frame_listener: Option<Arc<dyn VideoFrameListener>>,
        log: PlayerLog,
    ) -> Self {
        let hooks = VideoHooks::new(
            tuning.video_sync_limit_us,
            tuning.video_leading_limit_us,
            metadata_listener,
            frame_listener,
            log.clone(),
        );
        CodecRenderer::new(hooks, decoder_factory, tuning.video_render_time_limit_ms, log)
    }
}

impl CodecHooks for VideoHooks {
    fn track_type(&self) -> TrackType {
        TrackType::Video
    }

    fn create_clock(&mut self, state: Arc<ClockState>) -> Arc<dyn MediaClock> {
        Arc::new(VideoClock::new(state))
    }

    fn format(&self) -> Option<&Format> {
        self.video_format.as_ref()
    }

    fn decoder_configuration(&self) -> Option<DecoderConfiguration> {
        let (Some(surface), Some(format)) = (&self.surface, &self.video_format) else {
            return None;
        };
        let mime = format.sample_mime_type.clone()?;
        Some(DecoderConfiguration {
            mime,
            format: format.media_format.clone(),
            surface: Some(surface.clone()),
        })
    }

    fn on_source_changed(
        &mut self,
        core: &mut CodecCore,
        formats: &[Format],
        source: &mut dyn MediaSource,
    ) {
        let next = formats.iter().find(|format| format.is_video()).cloned();
        let keep_decoder = matches!(
            (&self.video_format, &next),
            (Some(previous), Some(next)) if previous.is_compatible_with(next)
        );
        if !keep_decoder {
            core.release_decoder();
        }
        self.video_format = None;

        match next {
            Some(format) => {
                core.clock_state().set_duration_us(format.duration_us);
                if self.surface.is_some() {
                    source.bind_track(&format, TrackType::Video);
                }
                plog!(
                    self.log,
                    Info,
                    "🎬 视频轨道 #{}: {}{}",
                    format.track_index,
                    format,
                    if keep_decoder { "（沿用解码会话）" } else { "" }
                );
                if let Some(listener) = &self.metadata_listener {
                    listener.on_video_metadata_changed(&format);
                }
                self.video_format = Some(format);
            }
            None => {
                core.clock_state().set_duration_us(-1);
                if !formats.is_empty() {
                    // 位置无效
                    core.clock_state().set_last_position_us(-1);
                    plog!(self.log, Warn, "⚠️ 媒体中没有视频渲染器支持的轨道");
                }
            }
        }
    }

    fn process_output_buffer(
        &mut self,
        decoder: &mut dyn Decoder,
        index: usize,
        info: &mut BufferInfo,
        position_us: i64,
        _now_ms: i64,
    ) -> Result<bool, CodecError> {
        if self.surface.is_none() || info.size == 0 {
            decoder.release_output_buffer(index, false)?;
            return Ok(true);
        }

        match decide_frame_action(
            position_us,
            info.presentation_time_us,
            self.sync_limit_us,
            self.leading_limit_us,
        ) {
            FrameAction::Present => {
                match decoder.release_output_buffer(index, true) {
                    Ok(()) => {
                        if let Some(listener) = &self.frame_listener {
                            listener.on_frame_release();
                        }
                    }
                    // 可能送显了一个不完整的帧
                    Err(CodecError::Codec(msg)) => {
                        plog!(self.log, Error, "❌ 送显失败: {}", msg);
                    }
                    Err(e) => return Err(e),
                }
                Ok(true)
            }
            FrameAction::Hold => Ok(false),
            FrameAction::Drop => {
                if let Some(listener) = &self.frame_listener {
                    listener.on_frame_lose();
                }
                decoder.release_output_buffer(index, false)?;
                Ok(true)
            }
        }
    }

    fn on_video_surface_changed(
        &mut self,
        core: &mut CodecCore,
        surface: Option<Arc<dyn VideoSurface>>,
        source: Option<&mut dyn MediaSource>,
    ) {
        self.set_output(core, surface);
        // 没有输出平面时解绑视频轨道
        if let (Some(source), Some(format)) = (source, &self.video_format) {
            if self.surface.is_some() {
                source.bind_track(format, TrackType::Video);
            } else {
                source.unbind_track(format, TrackType::Video);
            }
        }
    }
}
