use crate::core::{AudioClock, ClockState, Format, MediaClock, PlaybackTuning, PlayerError, PlayerLog, Result, TrackType};
use crate::player::codec::{BufferInfo, CodecError, Decoder, DecoderConfiguration, DecoderFactory};
use crate::player::media_source::MediaSource;
use crate::player::renderer::{CodecCore, CodecHooks, CodecRenderer};
use crate::plog;
use std::sync::Arc;

pub type AudioRenderer = CodecRenderer<AudioHooks>;

/// 音频输出设备
pub trait AudioSink: Send {
    /// 非阻塞写入 PCM 数据，返回实际接受的字节数
    fn write_non_blocking(&mut self, data: &[u8]) -> Result<usize>;

    fn play(&mut self);

    fn pause(&mut self);

    /// 丢弃尚未播放的数据
    fn flush(&mut self);

    /// 停止并清空播放头计数
    fn stop(&mut self);

    /// 设备当前的输出延迟（微秒）
    fn latency_us(&self) -> i64;

    fn release(&mut self);
}

/// 按音频轨道参数创建输出设备
pub trait AudioSinkFactory: Send + Sync {
    fn create_sink(&self, format: &Format) -> Result<Box<dyn AudioSink>>;
}

/// 音频渲染器的差异部分
///
/// 音频时钟是主时钟：最后写入设备的时间戳减去设备延迟
pub struct AudioHooks {
    sink_factory: Arc<dyn AudioSinkFactory>,
    sink: Option<Box<dyn AudioSink>>,
    audio_format: Option<Format>,
    clock_state: Arc<ClockState>,
    log: PlayerLog,
}

impl AudioHooks {
    pub fn new(sink_factory: Arc<dyn AudioSinkFactory>, log: PlayerLog) -> Self {
        Self {
            sink_factory,
            sink: None,
            audio_format: None,
            clock_state: ClockState::new(),
            log,
        }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    fn create_sink(&mut self, format: &Format) {
        if self.sink.is_some() {
            return;
        }
        match self.sink_factory.create_sink(format) {
            Ok(sink) => {
                plog!(
                    self.log,
                    Info,
                    "🔊 音频输出已创建: {}Hz, {} 声道",
                    format.sample_rate,
                    format.channel_count
                );
                self.sink = Some(sink);
                self.clock_state.set_has_output(true);
            }
            Err(e) => {
                plog!(self.log, Error, "❌ 创建音频输出失败: {}", e);
            }
        }
    }

    fn release_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.release();
        }
        self.clock_state.set_has_output(false);
        self.clock_state.set_output_latency_us(0);
    }
}

impl AudioRenderer {
    pub fn create(
        tuning: &PlaybackTuning,
        decoder_factory: Arc<dyn DecoderFactory>,
        sink_factory: Arc<dyn AudioSinkFactory>,
        log: PlayerLog,
    ) -> Self {
        let hooks = AudioHooks::new(sink_factory, log.clone());
        CodecRenderer::new(hooks, decoder_factory, tuning.audio_render_time_limit_ms, log)
    }
}

impl CodecHooks for AudioHooks {
    fn track_type(&self) -> TrackType {
        TrackType::Audio
    }

    fn create_clock(&mut self, state: Arc<ClockState>) -> Arc<dyn MediaClock> {
        self.clock_state = state.clone();
        Arc::new(AudioClock::new(state))
    }

    fn format(&self) -> Option<&Format> {
        self.audio_format.as_ref()
    }

    fn decoder_configuration(&self) -> Option<DecoderConfiguration> {
        let format = self.audio_format.as_ref()?;
        Some(DecoderConfiguration {
            mime: format.sample_mime_type.clone()?,
            format: format.media_format.clone(),
            surface: None,
        })
    }

    fn on_source_changed(
        &mut self,
        core: &mut CodecCore,
        formats: &[Format],
        source: &mut dyn MediaSource,
    ) {
        if let Some(cached) = self.audio_format.take() {
            let compatible = formats
                .iter()
                .find(|format| format.is_audio() && cached.is_compatible_with(format))
                .cloned();
            match compatible {
                // 参数一致，沿用解码会话和输出设备
                Some(format) => {
                    core.clock_state().set_duration_us(format.duration_us);
                    source.bind_track(&format, TrackType::Audio);
                    plog!(self.log, Info, "🔊 沿用音频会话，轨道 #{}", format.track_index);
                    self.audio_format = Some(format);
                    return;
                }
                None => {
                    core.release_decoder();
                    self.release_sink();
                }
            }
        }

        match formats.iter().find(|format| format.is_audio()).cloned() {
            Some(format) => {
                core.clock_state().set_duration_us(format.duration_us);
                source.bind_track(&format, TrackType::Audio);
                plog!(self.log, Info, "🎵 音频轨道 #{}: {}", format.track_index, format);
                self.create_sink(&format);
                self.audio_format = Some(format);
            }
            None => {
                core.clock_state().set_duration_us(-1);
                if !formats.is_empty() {
                    core.clock_state().set_last_position_us(-1);
                    plog!(self.log, Warn, "⚠️ 媒体中没有音频渲染器支持的轨道");
                }
            }
        }
    }

    fn process_output_buffer(
        &mut self,
        decoder: &mut dyn Decoder,
        index: usize,
        info: &mut BufferInfo,
        _position_us: i64,
        _now_ms: i64,
    ) -> std::result::Result<bool, CodecError> {
        let sink = match self.sink.as_mut() {
            Some(sink) if info.size > 0 => sink,
            _ => {
                decoder.release_output_buffer(index, false)?;
                return Ok(true);
            }
        };

        let written = {
            let data = decoder.output_buffer(index)?;
            match data.get(info.offset..info.offset + info.size) {
                Some(chunk) => sink.write_non_blocking(chunk),
                None => Err(PlayerError::AudioError(format!(
                    "输出缓冲区越界: offset {}, size {}, len {}",
                    info.offset,
                    info.size,
                    data.len()
                ))),
            }
        };

        match written {
            Ok(written) => {
                sink.play();
                self.clock_state.set_output_latency_us(sink.latency_us());
                if written < info.size {
                    // 设备缓冲已满，剩余部分留到下一轮
                    info.offset += written;
                    info.size -= written;
                    Ok(false)
                } else {
                    decoder.release_output_buffer(index, false)?;
                    Ok(true)
                }
            }
            Err(e) => {
                plog!(self.log, Error, "❌ 写入音频数据失败: {}", e);
                decoder.release_output_buffer(index, false)?;
                Ok(true)
            }
        }
    }

    fn on_seek_to(&mut self, _position_us: i64) {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush();
            sink.stop();
        }
    }

    fn on_pause(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.pause();
        }
    }

    fn on_disabled(&mut self, _core: &mut CodecCore) {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush();
        }
    }

    fn release(&mut self) {
        self.release_sink();
    }
}
