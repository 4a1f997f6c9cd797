use crate::core::{
    ClockState, Format, MediaClock, PlaybackTuning, PlayerError, PlayerLog, Result, TrackType,
    BUFFER_FLAG_END_OF_STREAM, END_OF_RENDER,
};
use crate::player::audio_renderer::{AudioRenderer, AudioSinkFactory};
use crate::player::codec::{
    BufferInfo, CodecError, Decoder, DecoderConfiguration, DecoderFactory, OutputStatus, VideoSurface,
};
use crate::player::listener::{VideoFrameListener, VideoMetadataListener};
use crate::player::media_source::{MediaSource, ReceiverSet, Sample, SampleReceiver};
use crate::player::video_renderer::VideoRenderer;
use crate::plog;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单次渲染中允许连续出现的格式变化次数
const MAX_FORMAT_CHANGES: u32 = 4;

/// 渲染器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Disabled,
    Enabled,
}

/// 解码渲染单元
///
/// 只在工作线程上被调用。`enable` 要求处于 `Disabled`，`render` 要求处于 `Enabled`
pub trait Renderer: Send {
    /// 处理的轨道类型
    fn track_type(&self) -> TrackType;

    /// 与渲染器关联的时钟
    fn media_clock(&self) -> Arc<dyn MediaClock>;

    fn state(&self) -> RendererState;

    /// 绑定数据源中与自身类型匹配的轨道，进入 `Enabled`
    fn enable(&mut self, formats: &[Format], source: &mut dyn MediaSource, position_us: i64);

    /// 按当前播放位置尽可能多地处理已解码的输出
    ///
    /// - `position_us`: 当前播放位置
    /// - `now_ms`: 本轮渲染开始的基准时间
    fn render(&mut self, position_us: i64, now_ms: i64) -> Result<()>;

    /// 尽力渲染一帧
    fn render_once(&mut self, position_us: i64, now_ms: i64) -> Result<()>;

    /// 发生 seek 后回调，清空解码管线
    fn on_seek_to(&mut self, position_us: i64);

    fn on_pause(&mut self);

    /// 输出平面变化（仅视频渲染器关心）
    fn on_video_surface_changed(
        &mut self,
        _surface: Option<Arc<dyn VideoSurface>>,
        _source: &mut dyn MediaSource,
    ) {
    }

    /// 解绑数据源，进入 `Disabled`
    fn disable(&mut self, source: &mut dyn MediaSource);

    /// 不再需要时释放全部资源
    fn release(&mut self);

    fn as_receiver_mut(&mut self) -> &mut dyn SampleReceiver;
}

impl ReceiverSet for Vec<Box<dyn Renderer>> {
    fn receiver(&mut self, track_type: TrackType) -> Option<&mut dyn SampleReceiver> {
        self.iter_mut()
            .find(|renderer| renderer.track_type() == track_type)
            .map(|renderer| renderer.as_receiver_mut())
    }
}

/// 渲染器工厂
pub trait RendererFactory: Send {
    fn create_renderers(
        &self,
        tuning: &PlaybackTuning,
        metadata_listener: Arc<dyn VideoMetadataListener>,
        frame_listener: Arc<dyn VideoFrameListener>,
        log: &PlayerLog,
    ) -> Vec<Box<dyn Renderer>>;
}

/// 基于解码会话的默认工厂：一个音频渲染器 + 一个视频渲染器
pub struct CodecRendererFactory {
    decoder_factory: Arc<dyn DecoderFactory>,
    audio_sink_factory: Arc<dyn AudioSinkFactory>,
}

impl CodecRendererFactory {
    pub fn new(
        decoder_factory: Arc<dyn DecoderFactory>,
        audio_sink_factory: Arc<dyn AudioSinkFactory>,
    ) -> Self {
        Self {
            decoder_factory,
            audio_sink_factory,
        }
    }
}

impl RendererFactory for CodecRendererFactory {
    fn create_renderers(
        &self,
        tuning: &PlaybackTuning,
        metadata_listener: Arc<dyn VideoMetadataListener>,
        frame_listener: Arc<dyn VideoFrameListener>,
        log: &PlayerLog,
    ) -> Vec<Box<dyn Renderer>> {
        vec![
            Box::new(AudioRenderer::create(
                tuning,
                self.decoder_factory.clone(),
                self.audio_sink_factory.clone(),
                log.clone(),
            )),
            Box::new(VideoRenderer::create(
                tuning,
                self.decoder_factory.clone(),
                Some(metadata_listener),
                Some(frame_listener),
                log.clone(),
            )),
        ]
    }
}

/// 等待送显的输出缓冲区，按显示时间戳排序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingBuffer {
    index: usize,
    info: BufferInfo,
}

impl Ord for PendingBuffer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.info
            .presentation_time_us
            .cmp(&other.info.presentation_time_us)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for PendingBuffer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 一次取输出的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainResult {
    Consumed,
    EndOfStream,
    Held,
    Empty,
    FormatChanged,
}

/// 解码会话与输出队列
pub struct CodecCore {
    decoder: Option<Box<dyn Decoder>>,
    decoder_factory: Arc<dyn DecoderFactory>,
    /// 最小堆，同一个缓冲区索引最多出现一次
    pending: BinaryHeap<Reverse<PendingBuffer>>,
    clock_state: Arc<ClockState>,
    input_eos_queued: bool,
    log: PlayerLog,
}

impl CodecCore {
    fn new(decoder_factory: Arc<dyn DecoderFactory>, log: PlayerLog) -> Self {
        Self {
            decoder: None,
            decoder_factory,
            pending: BinaryHeap::new(),
            clock_state: ClockState::new(),
            input_eos_queued: false,
            log,
        }
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn decoder_mut(&mut self) -> Option<&mut (dyn Decoder + 'static)> {
        self.decoder.as_deref_mut()
    }

    pub fn clock_state(&self) -> &Arc<ClockState> {
        &self.clock_state
    }

    pub fn log(&self) -> &PlayerLog {
        &self.log
    }

    fn init_decoder(&mut self, config: Option<DecoderConfiguration>) -> std::result::Result<(), CodecError> {
        let Some(config) = config else {
            return Ok(());
        };
        match self.decoder_factory.create_decoder(&config) {
            Ok(decoder) => {
                plog!(self.log, Info, "🎞️ 创建解码器: {}", config.mime);
                self.decoder = Some(decoder);
                Ok(())
            }
            Err(e) => {
                plog!(self.log, Error, "❌ 无法创建解码器 {}: {}", config.mime, e);
                Err(e)
            }
        }
    }

    /// 丢弃在途的输入输出，会话异常时直接释放
    pub fn flush_decoder(&mut self) {
        self.pending.clear();
        self.input_eos_queued = false;
        let failed = match self.decoder.as_mut() {
            Some(decoder) => decoder.flush().err(),
            None => None,
        };
        if let Some(e) = failed {
            plog!(self.log, Warn, "⚠️ 解码器 flush 失败，释放会话: {}", e);
            self.release_decoder();
        }
    }

    pub fn release_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.release();
            plog!(self.log, Debug, "🗑️ 解码器已释放");
        }
        self.pending.clear();
        self.input_eos_queued = false;
    }
}

fn offer_pending(pending: &mut BinaryHeap<Reverse<PendingBuffer>>, index: usize, info: BufferInfo) {
    if pending.iter().all(|Reverse(buffer)| buffer.index != index) {
        pending.push(Reverse(PendingBuffer { index, info }));
    }
}

/// 解码渲染单元的差异部分
///
/// 模板 [`CodecRenderer`] 负责会话生命周期、输入投喂与输出排序，
/// 具体类型只决定绑定哪条轨道、怎样配置会话、怎样处理一个输出缓冲区
pub trait CodecHooks: Send {
    fn track_type(&self) -> TrackType;

    /// 基于共享状态创建时钟，只调用一次
    fn create_clock(&mut self, state: Arc<ClockState>) -> Arc<dyn MediaClock>;

    /// 当前绑定的轨道
    fn format(&self) -> Option<&Format>;

    /// 创建会话的参数，None 表示暂时无法工作
    fn decoder_configuration(&self) -> Option<DecoderConfiguration>;

    /// 启用时选择并绑定轨道，决定是否沿用已有会话
    fn on_source_changed(
        &mut self,
        core: &mut CodecCore,
        formats: &[Format],
        source: &mut dyn MediaSource,
    );

    /// 处理一个输出缓冲区
    ///
    /// 返回 true 表示已经归还了该缓冲区；返回 false 表示保留到下一轮
    fn process_output_buffer(
        &mut self,
        decoder: &mut dyn Decoder,
        index: usize,
        info: &mut BufferInfo,
        position_us: i64,
        now_ms: i64,
    ) -> std::result::Result<bool, CodecError>;

    fn on_seek_to(&mut self, _position_us: i64) {}

    fn on_pause(&mut self) {}

    fn on_disabled(&mut self, _core: &mut CodecCore) {}

    /// `source` 仅在渲染器启用时存在
    fn on_video_surface_changed(
        &mut self,
        _core: &mut CodecCore,
        _surface: Option<Arc<dyn VideoSurface>>,
        _source: Option<&mut dyn MediaSource>,
    ) {
    }

    fn release(&mut self) {}
}

/// 基于解码会话的渲染器模板
pub struct CodecRenderer<H: CodecHooks> {
    hooks: H,
    core: CodecCore,
    clock: Arc<dyn MediaClock>,
    state: RendererState,
    /// 单次渲染的时间预算，None 表示不限制
    render_time_limit_ms: Option<u64>,
}

impl<H: CodecHooks> CodecRenderer<H> {
    pub fn new(
        mut hooks: H,
        decoder_factory: Arc<dyn DecoderFactory>,
        render_time_limit_ms: Option<u64>,
        log: PlayerLog,
    ) -> Self {
        let core = CodecCore::new(decoder_factory, log);
        let clock = hooks.create_clock(core.clock_state.clone());
        Self {
            hooks,
            core,
            clock,
            state: RendererState::Disabled,
            render_time_limit_ms,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn has_decoder(&self) -> bool {
        self.core.has_decoder()
    }

    fn may_init_decoder(&mut self) -> std::result::Result<(), CodecError> {
        if self.core.decoder.is_none() {
            let config = self.hooks.decoder_configuration();
            self.core.init_decoder(config)?;
        }
        Ok(())
    }

    fn should_continue_rendering(&self, render_start: Instant) -> bool {
        match self.render_time_limit_ms {
            None => true,
            Some(limit) => render_start.elapsed() < Duration::from_millis(limit),
        }
    }

    fn run_drain(&mut self, position_us: i64, now_ms: i64, single_frame: bool) -> Result<()> {
        match self.drain_loop(position_us, now_ms, single_frame) {
            Ok(()) => Ok(()),
            Err(CodecError::IllegalState(msg)) => {
                plog!(self.core.log, Warn, "⚠️ 解码会话失效，稍后重建: {}", msg);
                self.core.release_decoder();
                Ok(())
            }
            Err(e) => Err(PlayerError::Codec(e)),
        }
    }

    fn drain_loop(
        &mut self,
        position_us: i64,
        now_ms: i64,
        single_frame: bool,
    ) -> std::result::Result<(), CodecError> {
        self.may_init_decoder()?;
        let render_start = Instant::now();
        let mut format_changes = 0;
        loop {
            let keep_going = match self.drain_output_buffer(position_us, now_ms)? {
                DrainResult::Consumed => !single_frame && self.should_continue_rendering(render_start),
                DrainResult::FormatChanged => {
                    format_changes += 1;
                    format_changes <= MAX_FORMAT_CHANGES
                        && (single_frame || self.should_continue_rendering(render_start))
                }
                DrainResult::EndOfStream | DrainResult::Held | DrainResult::Empty => false,
            };
            if !keep_going {
                return Ok(());
            }
        }
    }

    /// 取一个输出放入最小堆，再把时间戳最小的交给 hooks 处理
    fn drain_output_buffer(
        &mut self,
        position_us: i64,
        now_ms: i64,
    ) -> std::result::Result<DrainResult, CodecError> {
        let core = &mut self.core;
        let Some(decoder) = core.decoder.as_mut() else {
            return Ok(DrainResult::Empty);
        };

        let status = decoder.dequeue_output_buffer()?;
        if let OutputStatus::Buffer { index, info } = status {
            offer_pending(&mut core.pending, index, info);
        }

        let Some(Reverse(mut pending)) = core.pending.pop() else {
            return Ok(if status == OutputStatus::FormatChanged {
                DrainResult::FormatChanged
            } else {
                DrainResult::Empty
            });
        };

        let consumed = self.hooks.process_output_buffer(
            decoder.as_mut(),
            pending.index,
            &mut pending.info,
            position_us,
            now_ms,
        )?;

        if !consumed {
            core.pending.push(Reverse(pending));
            return Ok(DrainResult::Held);
        }

        core.clock_state
            .set_last_position_us(pending.info.presentation_time_us);
        if pending.info.is_end_of_stream() {
            core.clock_state.set_last_position_us(END_OF_RENDER);
            Ok(DrainResult::EndOfStream)
        } else {
            Ok(DrainResult::Consumed)
        }
    }

    fn feed_input_buffer(&mut self, sample: &mut dyn Sample) -> Result<bool> {
        self.may_init_decoder()?;

        let core = &mut self.core;
        let (Some(decoder), Some(format)) = (core.decoder.as_mut(), self.hooks.format()) else {
            return Ok(false);
        };
        if core.input_eos_queued {
            return Ok(false);
        }
        let Some(index) = decoder.dequeue_input_buffer()? else {
            return Ok(false);
        };

        let data = sample.read_data(format, decoder.input_buffer(index)?)?;
        if data.end_of_stream && data.size < 0 {
            decoder.queue_input_buffer(index, 0, data.sample_time_us, BUFFER_FLAG_END_OF_STREAM)?;
            core.input_eos_queued = true;
        } else {
            decoder.queue_input_buffer(index, data.size.max(0) as usize, data.sample_time_us, 0)?;
        }
        Ok(true)
    }
}

impl<H: CodecHooks> SampleReceiver for CodecRenderer<H> {
    fn receive_data(&mut self, sample: &mut dyn Sample) -> Result<bool> {
        match self.feed_input_buffer(sample) {
            Err(PlayerError::Codec(CodecError::IllegalState(msg))) => {
                plog!(self.core.log, Warn, "⚠️ 投喂数据时解码会话失效: {}", msg);
                self.core.release_decoder();
                Ok(false)
            }
            other => other,
        }
    }
}

impl<H: CodecHooks> Renderer for CodecRenderer<H> {
    fn track_type(&self) -> TrackType {
        self.hooks.track_type()
    }

    fn media_clock(&self) -> Arc<dyn MediaClock> {
        self.clock.clone()
    }

    fn state(&self) -> RendererState {
        self.state
    }

    fn enable(&mut self, formats: &[Format], source: &mut dyn MediaSource, position_us: i64) {
        assert_eq!(
            self.state,
            RendererState::Disabled,
            "{:?} 渲染器只能在 Disabled 状态下启用",
            self.hooks.track_type()
        );
        self.state = RendererState::Enabled;
        self.core.clock_state.set_last_position_us(position_us);
        self.core.flush_decoder();
        self.hooks.on_source_changed(&mut self.core, formats, source);
    }

    fn render(&mut self, position_us: i64, now_ms: i64) -> Result<()> {
        assert_eq!(
            self.state,
            RendererState::Enabled,
            "{:?} 渲染器未启用",
            self.hooks.track_type()
        );
        self.run_drain(position_us, now_ms, false)
    }

    fn render_once(&mut self, position_us: i64, now_ms: i64) -> Result<()> {
        assert_eq!(
            self.state,
            RendererState::Enabled,
            "{:?} 渲染器未启用",
            self.hooks.track_type()
        );
        self.run_drain(position_us, now_ms, true)
    }

    fn on_seek_to(&mut self, position_us: i64) {
        self.core.flush_decoder();
        self.core.clock_state.set_last_position_us(position_us);
        self.hooks.on_seek_to(position_us);
    }

    fn on_pause(&mut self) {
        self.hooks.on_pause();
    }

    fn on_video_surface_changed(
        &mut self,
        surface: Option<Arc<dyn VideoSurface>>,
        source: &mut dyn MediaSource,
    ) {
        let source = match self.state {
            RendererState::Enabled => Some(source),
            RendererState::Disabled => None,
        };
        self.hooks.on_video_surface_changed(&mut self.core, surface, source);
    }

    fn disable(&mut self, source: &mut dyn MediaSource) {
        self.state = RendererState::Disabled;
        if let Some(format) = self.hooks.format() {
            source.unbind_track(format, self.hooks.track_type());
        }
        self.core.flush_decoder();
        self.hooks.on_disabled(&mut self.core);
    }

    fn release(&mut self) {
        self.core.release_decoder();
        self.hooks.release();
    }

    fn as_receiver_mut(&mut self) -> &mut dyn SampleReceiver {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MediaFormat, MediaItem, SampleData, VideoClock};
    use crate::player::media_source::SeekMode;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// 按脚本输出的解码器
    struct ScriptedDecoder {
        outputs: VecDeque<std::result::Result<OutputStatus, CodecError>>,
        input: Vec<u8>,
        queued_inputs: Arc<Mutex<Vec<(usize, i64, u32)>>>,
    }

    impl Decoder for ScriptedDecoder {
        fn dequeue_input_buffer(&mut self) -> std::result::Result<Option<usize>, CodecError> {
            Ok(Some(0))
        }

        fn input_buffer(&mut self, _index: usize) -> std::result::Result<&mut [u8], CodecError> {
            Ok(self.input.as_mut_slice())
        }

        fn queue_input_buffer(
            &mut self,
            _index: usize,
            size: usize,
            presentation_time_us: i64,
            flags: u32,
        ) -> std::result::Result<(), CodecError> {
            self.queued_inputs.lock().push((size, presentation_time_us, flags));
            Ok(())
        }

        fn dequeue_output_buffer(&mut self) -> std::result::Result<OutputStatus, CodecError> {
            self.outputs.pop_front().unwrap_or(Ok(OutputStatus::TryAgainLater))
        }

        fn output_buffer(&self, _index: usize) -> std::result::Result<&[u8], CodecError> {
            Ok(&self.input[..0])
        }

        fn release_output_buffer(&mut self, _index: usize, _render: bool) -> std::result::Result<(), CodecError> {
            Ok(())
        }

        fn set_output_surface(&mut self, _surface: Arc<dyn VideoSurface>) -> std::result::Result<(), CodecError> {
            Ok(())
        }

        fn flush(&mut self) -> std::result::Result<(), CodecError> {
            Ok(())
        }

        fn release(&mut self) {}
    }

    struct ScriptedFactory {
        script: Mutex<Vec<std::result::Result<OutputStatus, CodecError>>>,
        created: AtomicUsize,
        queued_inputs: Arc<Mutex<Vec<(usize, i64, u32)>>>,
    }

    impl ScriptedFactory {
        fn new(script: Vec<std::result::Result<OutputStatus, CodecError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                created: AtomicUsize::new(0),
                queued_inputs: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    impl DecoderFactory for ScriptedFactory {
        fn create_decoder(
            &self,
            _config: &DecoderConfiguration,
        ) -> std::result::Result<Box<dyn Decoder>, CodecError> {
            self.created.fetch_add(1, AtomicOrdering::SeqCst);
            let outputs = std::mem::take(&mut *self.script.lock()).into_iter().collect();
            Ok(Box::new(ScriptedDecoder {
                outputs,
                input: vec![0; 16],
                queued_inputs: self.queued_inputs.clone(),
            }))
        }
    }

    /// 时间戳不超过播放位置即消费，否则保留
    struct RecordingHooks {
        format: Option<Format>,
        presented: Arc<Mutex<Vec<i64>>>,
    }

    impl CodecHooks for RecordingHooks {
        fn track_type(&self) -> TrackType {
            TrackType::Video
        }

        fn create_clock(&mut self, state: Arc<ClockState>) -> Arc<dyn MediaClock> {
            Arc::new(VideoClock::new(state))
        }

        fn format(&self) -> Option<&Format> {
            self.format.as_ref()
        }

        fn decoder_configuration(&self) -> Option<DecoderConfiguration> {
            Some(DecoderConfiguration {
                mime: "video/test".into(),
                format: MediaFormat::new(),
                surface: None,
            })
        }

        fn on_source_changed(&mut self, _core: &mut CodecCore, formats: &[Format], _source: &mut dyn MediaSource) {
            self.format = formats.first().cloned();
        }

        fn process_output_buffer(
            &mut self,
            decoder: &mut dyn Decoder,
            index: usize,
            info: &mut BufferInfo,
            position_us: i64,
            _now_ms: i64,
        ) -> std::result::Result<bool, CodecError> {
            if info.presentation_time_us > position_us {
                return Ok(false);
            }
            decoder.release_output_buffer(index, false)?;
            self.presented.lock().push(info.presentation_time_us);
            Ok(true)
        }
    }

    struct NullSource;

    impl MediaSource for NullSource {
        fn set_data_source(&mut self, _item: &MediaItem, _headers: Option<&HashMap<String, String>>) -> Result<()> {
            Ok(())
        }
        fn formats(&self) -> &[Format] {
            &[]
        }
        fn bind_track(&mut self, _format: &Format, _receiver: TrackType) {}
        fn unbind_track(&mut self, _format: &Format, _receiver: TrackType) {}
        fn send_data(&mut self, _receivers: &mut dyn ReceiverSet) -> Result<bool> {
            Ok(false)
        }
        fn seek_to(&mut self, position_us: i64, _mode: SeekMode) -> i64 {
            position_us
        }
        fn has_cache_reached_end_of_stream(&self) -> bool {
            true
        }
        fn duration_us(&self) -> i64 {
            -1
        }
        fn cache_duration_us(&self) -> i64 {
            -1
        }
        fn release(&mut self) {}
    }

    struct EndOfStreamSample;

    impl Sample for EndOfStreamSample {
        fn read_data(&mut self, _format: &Format, _buffer: &mut [u8]) -> Result<SampleData> {
            Ok(SampleData::end_of_stream(1_000_000))
        }
    }

    fn buffer(index: usize, pts: i64) -> std::result::Result<OutputStatus, CodecError> {
        Ok(OutputStatus::Buffer {
            index,
            info: BufferInfo {
                offset: 0,
                size: 8,
                presentation_time_us: pts,
                flags: 0,
            },
        })
    }

    fn video_format() -> Format {
        let mut raw = MediaFormat::new();
        raw.insert(crate::core::KEY_MIME.into(), "video/test".into());
        Format::parse(0, &raw)
    }

    fn renderer(
        factory: Arc<ScriptedFactory>,
    ) -> (CodecRenderer<RecordingHooks>, Arc<Mutex<Vec<i64>>>) {
        let presented = Arc::new(Mutex::new(Vec::new()));
        let hooks = RecordingHooks {
            format: None,
            presented: presented.clone(),
        };
        let mut renderer = CodecRenderer::new(hooks, factory, None, PlayerLog::silent());
        renderer.enable(&[video_format()], &mut NullSource, 0);
        (renderer, presented)
    }

    #[test]
    fn test_out_of_order_outputs_are_presented_in_pts_order() {
        let factory = ScriptedFactory::new(vec![buffer(0, 300), buffer(1, 100), buffer(2, 200)]);
        let (mut renderer, presented) = renderer(factory);

        // 位置为 0 时全部保留在堆中
        for _ in 0..3 {
            renderer.render(0, 0).unwrap();
        }
        assert!(presented.lock().is_empty());

        renderer.render(1_000, 0).unwrap();
        assert_eq!(*presented.lock(), vec![100, 200, 300]);
        assert_eq!(renderer.media_clock().position_us(-1), 300);
    }

    #[test]
    fn test_render_once_consumes_single_buffer() {
        let factory = ScriptedFactory::new(vec![
            Ok(OutputStatus::FormatChanged),
            buffer(0, 0),
            buffer(1, 10),
        ]);
        let (mut renderer, presented) = renderer(factory);
        renderer.render_once(1_000, 0).unwrap();
        assert_eq!(*presented.lock(), vec![0]);
    }

    #[test]
    fn test_illegal_state_releases_and_recreates_decoder() {
        let factory = ScriptedFactory::new(vec![Err(CodecError::IllegalState("dead".into()))]);
        let (mut renderer, _) = renderer(factory.clone());

        renderer.render(0, 0).unwrap();
        assert!(!renderer.has_decoder());
        assert_eq!(factory.created.load(AtomicOrdering::SeqCst), 1);

        renderer.render(0, 0).unwrap();
        assert!(renderer.has_decoder());
        assert_eq!(factory.created.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn test_transient_codec_error_is_propagated() {
        let factory = ScriptedFactory::new(vec![Err(CodecError::Codec("partial".into()))]);
        let (mut renderer, _) = renderer(factory);
        assert!(matches!(renderer.render(0, 0), Err(PlayerError::Codec(CodecError::Codec(_)))));
        assert!(renderer.has_decoder());
    }

    #[test]
    fn test_end_of_stream_input_is_queued_once() {
        let factory = ScriptedFactory::new(vec![]);
        let (mut renderer, _) = renderer(factory.clone());
        assert!(renderer.receive_data(&mut EndOfStreamSample).unwrap());
        assert!(!renderer.receive_data(&mut EndOfStreamSample).unwrap());
        let inputs = factory.queued_inputs.lock();
        assert_eq!(*inputs, vec![(0, 1_000_000, BUFFER_FLAG_END_OF_STREAM)]);
    }

    #[test]
    fn test_end_of_stream_output_marks_clock() {
        let factory = ScriptedFactory::new(vec![Ok(OutputStatus::Buffer {
            index: 0,
            info: BufferInfo {
                offset: 0,
                size: 0,
                presentation_time_us: 500,
                flags: BUFFER_FLAG_END_OF_STREAM,
            },
        })]);
        let (mut renderer, _) = renderer(factory);
        renderer.render(1_000, 0).unwrap();
        assert_eq!(renderer.media_clock().position_us(-1), END_OF_RENDER);

        renderer.on_seek_to(200);
        assert_eq!(renderer.media_clock().position_us(-1), 200);
    }

    #[test]
    #[should_panic]
    fn test_enable_twice_panics() {
        let factory = ScriptedFactory::new(vec![]);
        let (mut renderer, _) = renderer(factory);
        renderer.enable(&[video_format()], &mut NullSource, 0);
    }

    #[test]
    fn test_receiver_set_finds_by_track_type() {
        let factory = ScriptedFactory::new(vec![]);
        let (renderer, _) = renderer(factory);
        let mut renderers: Vec<Box<dyn Renderer>> = vec![Box::new(renderer)];
        assert!(renderers.receiver(TrackType::Video).is_some());
        assert!(renderers.receiver(TrackType::Audio).is_none());
    }
}
