use crate::core::{
    sync_position_us, ErrorCode, Format, FrameStats, MediaClock, MediaItem, PlaybackClock,
    PlaybackState, PlaybackTuning, PlayerConfig, PlayerLog, TrackType,
};
use crate::player::buffering::CachePolicy;
use crate::player::codec::VideoSurface;
use crate::player::command_queue::{Command, CommandKind, CommandQueue};
use crate::player::listener::{VideoFrameListener, VideoMetadataListener};
use crate::player::media_source::{MediaSource, SeekMode};
use crate::player::renderer::{Renderer, RendererFactory, RendererState};
use crate::plog;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 工作线程发往控制线程的事件
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    Error(ErrorCode),
    VideoMetadataChanged(Format),
}

/// 工作线程写、控制线程读的播放信息
#[derive(Debug)]
pub struct SharedStatus {
    position_us: AtomicI64,
    duration_us: AtomicI64,
    cache_duration_us: AtomicI64,
    play_after_loading: AtomicBool,
    released: AtomicBool,
}

impl SharedStatus {
    pub fn new(play_after_loading: bool) -> Self {
        Self {
            position_us: AtomicI64::new(0),
            duration_us: AtomicI64::new(-1),
            cache_duration_us: AtomicI64::new(-1),
            play_after_loading: AtomicBool::new(play_after_loading),
            released: AtomicBool::new(false),
        }
    }

    pub fn position_us(&self) -> i64 {
        self.position_us.load(Ordering::Acquire)
    }

    fn set_position_us(&self, position_us: i64) {
        self.position_us.store(position_us, Ordering::Release);
    }

    pub fn duration_us(&self) -> i64 {
        self.duration_us.load(Ordering::Acquire)
    }

    fn set_duration_us(&self, duration_us: i64) {
        self.duration_us.store(duration_us, Ordering::Release);
    }

    pub fn cache_duration_us(&self) -> i64 {
        self.cache_duration_us.load(Ordering::Acquire)
    }

    fn set_cache_duration_us(&self, cache_us: i64) {
        self.cache_duration_us.store(cache_us, Ordering::Release);
    }

    pub fn play_after_loading(&self) -> bool {
        self.play_after_loading.load(Ordering::Acquire)
    }

    pub fn set_play_after_loading(&self, play: bool) {
        self.play_after_loading.store(play, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// 渲染器的帧统计与元数据回调
pub struct ComponentListener {
    released_frames: AtomicU64,
    lost_frames: AtomicU64,
    events: Sender<PlayerEvent>,
}

impl ComponentListener {
    pub fn new(events: Sender<PlayerEvent>) -> Self {
        Self {
            released_frames: AtomicU64::new(0),
            lost_frames: AtomicU64::new(0),
            events,
        }
    }

    pub fn frame_stats(&self) -> FrameStats {
        FrameStats {
            released: self.released_frames.load(Ordering::Relaxed),
            lost: self.lost_frames.load(Ordering::Relaxed),
        }
    }

    pub fn reset_frame_count(&self) {
        self.released_frames.store(0, Ordering::Relaxed);
        self.lost_frames.store(0, Ordering::Relaxed);
    }
}

impl VideoFrameListener for ComponentListener {
    fn on_frame_release(&self) {
        self.released_frames.fetch_add(1, Ordering::Relaxed);
    }

    fn on_frame_lose(&self) {
        self.lost_frames.fetch_add(1, Ordering::Relaxed);
    }
}

impl VideoMetadataListener for ComponentListener {
    fn on_video_metadata_changed(&self, format: &Format) {
        let _ = self.events.send(PlayerEvent::VideoMetadataChanged(format.clone()));
    }
}

/// 播放状态机，运行在工作线程上
///
/// 独占数据源和全部渲染器；命令按到达顺序逐个执行，
/// 状态变化和错误通过 channel 交给控制线程
pub struct PlaybackEngine {
    queue: Arc<CommandQueue>,
    events: Sender<PlayerEvent>,
    status: Arc<SharedStatus>,
    components: Arc<ComponentListener>,

    source: Box<dyn MediaSource>,
    renderers: Vec<Box<dyn Renderer>>,
    /// 音频时钟（主时钟），没有音频渲染器时为 None
    sync_clock: Option<Arc<dyn MediaClock>>,

    render_first_frame: bool,
    infinite_loop: bool,
    request_headers: Option<HashMap<String, String>>,
    tuning: PlaybackTuning,
    cache_policy: CachePolicy,
    clock: PlaybackClock,

    /// 内部状态，可能领先外部状态
    state: PlaybackState,
    /// 进入 Buffering 之前的状态，结束缓冲后据此恢复
    last_state: PlaybackState,
    position_us: i64,
    log: PlayerLog,
}

impl PlaybackEngine {
    pub fn new(
        config: &PlayerConfig,
        source: Box<dyn MediaSource>,
        renderer_factory: &dyn RendererFactory,
        queue: Arc<CommandQueue>,
        status: Arc<SharedStatus>,
        components: Arc<ComponentListener>,
        events: Sender<PlayerEvent>,
    ) -> Self {
        let log = PlayerLog::new(&config.log);
        let renderers = renderer_factory.create_renderers(
            &config.tuning,
            components.clone(),
            components.clone(),
            &log,
        );
        let sync_clock = renderers
            .iter()
            .find(|r| r.track_type() == TrackType::Audio)
            .map(|r| r.media_clock());
        plog!(
            log,
            Info,
            "🎮 创建播放引擎: {} 个渲染器, 主时钟: {}",
            renderers.len(),
            if sync_clock.is_some() { "音频" } else { "墙上时钟" }
        );

        Self {
            queue,
            events,
            status,
            components,
            source,
            renderers,
            sync_clock,
            render_first_frame: config.render_first_frame,
            infinite_loop: config.infinite_loop,
            request_headers: config.request_headers.clone(),
            tuning: config.tuning.clone(),
            cache_policy: CachePolicy::new(&config.tuning),
            clock: PlaybackClock::new(),
            state: PlaybackState::Init,
            last_state: PlaybackState::Init,
            position_us: 0,
            log,
        }
    }

    /// 命令循环，队列停止后释放全部资源
    pub fn run(mut self) {
        plog!(self.log, Info, "🚀 播放线程启动");
        while let Some(command) = self.queue.next() {
            self.handle(command);
        }
        self.shutdown();
        plog!(self.log, Info, "🛑 播放线程退出");
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position_us(&self) -> i64 {
        self.position_us
    }

    pub(crate) fn handle(&mut self, command: Command) {
        if self.status.is_released() {
            return;
        }
        match command {
            Command::Prepare(item) => self.prepare_internal(item),
            Command::Play => self.play_internal(),
            Command::Pause => self.pause_internal(),
            Command::SeekTo(position_ms) => self.seek_to_internal(position_ms),
            Command::RenderTick => self.render_internal(),
            Command::WaitForCache(delay_ms) => self.wait_for_cache_internal(delay_ms),
            Command::RenderFirstFrame { next_state, position_us } => {
                self.render_first_frame_internal(next_state, position_us)
            }
            Command::SetVideoSurface(surface) => self.set_video_surface_internal(surface),
        }
    }

    fn prepare_internal(&mut self, item: MediaItem) {
        // 存在更新的 prepare，本次作废
        if self.queue.has(CommandKind::Prepare) {
            return;
        }
        // pause 保留，其余的全部取消
        self.queue.remove(CommandKind::RenderTick);
        self.queue.remove(CommandKind::Play);
        self.queue.remove(CommandKind::WaitForCache);
        self.queue.remove(CommandKind::SeekTo);
        self.queue.remove(CommandKind::RenderFirstFrame);

        self.set_state(PlaybackState::Loading);
        let kind = match &item {
            MediaItem::NetworkStream { protocol, .. } => protocol.as_str(),
            MediaItem::LocalFile(_) => "本地文件",
        };
        plog!(self.log, Info, "📂 加载媒体 [{}]: {}", kind, item.location());

        for renderer in self.renderers.iter_mut() {
            if renderer.state() == RendererState::Enabled {
                renderer.disable(self.source.as_mut());
            }
        }
        self.update_position(0);

        if let Err(e) = self
            .source
            .set_data_source(&item, self.request_headers.as_ref())
        {
            plog!(self.log, Error, "❌ 打开媒体失败: {}", e);
            // 数据源已重置，旧媒体的时长和缓存不再有效
            self.status.set_duration_us(self.source.duration_us());
            self.status.set_cache_duration_us(self.source.cache_duration_us());
            self.notify_error(e.error_code());
            self.set_state(PlaybackState::Init);
            return;
        }

        if self.queue.has(CommandKind::Prepare) {
            return;
        }
        self.status.set_duration_us(self.source.duration_us());
        let formats = self.source.formats().to_vec();
        for renderer in self.renderers.iter_mut() {
            renderer.enable(&formats, self.source.as_mut(), 0);
        }

        self.loop_send_data(true);

        if self.queue.has(CommandKind::Prepare) {
            return;
        }
        // 加载期间收到的 pause 会把状态直接转为 Pause
        if self.queue.has(CommandKind::Pause) {
            plog!(self.log, Debug, "⏸ 加载期间收到暂停");
            return;
        }

        if self.status.play_after_loading() {
            self.queue.send_pending_play(self.tuning.decode_delay_ms);
        } else if self.render_first_frame {
            self.queue.send_delayed(
                Command::RenderFirstFrame {
                    next_state: PlaybackState::Ready,
                    position_us: 0,
                },
                self.tuning.decode_delay_ms,
            );
        } else {
            self.set_state(PlaybackState::Ready);
        }
    }

    fn render_internal(&mut self) {
        let loop_start = Instant::now();
        self.loop_send_data(false);

        let now_ms = self.clock.elapsed_realtime_ms();
        let mut io_failed = false;
        for renderer in self.renderers.iter_mut() {
            if renderer.state() != RendererState::Enabled {
                continue;
            }
            if let Err(e) = renderer.render(self.position_us, now_ms) {
                plog!(self.log, Error, "❌ {:?} 渲染失败: {}", renderer.track_type(), e);
                io_failed |= e.is_io();
            }
        }
        if io_failed {
            self.notify_error(ErrorCode::IoError);
        }

        let duration_us = self.source.duration_us();
        if duration_us > 0 && self.position_us / 1000 >= duration_us / 1000 {
            self.on_reach_end();
            return;
        }

        let delay_ms = PlaybackClock::next_tick_delay_ms(loop_start, self.tuning.render_interval_ms);
        let position_us = self.current_position_us(delay_ms as i64).max(self.position_us);
        self.update_position(position_us);

        if self.should_wait_for_cache() {
            plog!(
                self.log,
                Info,
                "⏳ 缓存不足 ({}us)，等待缓冲",
                self.source.cache_duration_us()
            );
            self.last_state = PlaybackState::Playing;
            self.queue
                .send(Command::WaitForCache(self.cache_policy.wait_start_ms()));
            self.set_state(PlaybackState::Buffering);
            return;
        }

        self.queue.send_delayed(Command::RenderTick, delay_ms);
    }

    fn on_reach_end(&mut self) {
        let stats = self.components.frame_stats();
        plog!(
            self.log,
            Info,
            "🏁 播放结束 - 总帧数: {}, 丢帧: {}, 丢帧率: {:.3}",
            stats.total(),
            stats.lost,
            stats.loss_ratio()
        );
        self.components.reset_frame_count();

        if self.infinite_loop {
            self.queue.send(Command::SeekTo(0));
        } else {
            self.set_state(PlaybackState::Stop);
        }
    }

    fn seek_to_internal(&mut self, position_ms: i64) {
        // 只执行最新的一次 seek
        if self.queue.has(CommandKind::SeekTo) {
            return;
        }
        self.queue.remove(CommandKind::WaitForCache);
        self.queue.remove(CommandKind::RenderTick);
        self.queue.remove(CommandKind::RenderFirstFrame);
        self.queue.remove_pending_plays();

        let position_us = position_ms * 1000;
        plog!(self.log, Info, "⏩ Seek: {}ms", position_ms);

        let mut old_state = self.state;
        if old_state != PlaybackState::Buffering {
            self.last_state = old_state;
            self.set_state(PlaybackState::Buffering);
        }

        for renderer in self.renderers.iter_mut() {
            renderer.on_seek_to(position_us);
        }
        let sync_time_us = self.source.seek_to(position_us, SeekMode::ClosestSync);
        self.loop_send_data(false);
        self.update_position(position_us);

        // 还有 seek 在排队，推迟状态恢复
        if self.queue.has(CommandKind::SeekTo) {
            return;
        }
        if old_state == PlaybackState::Buffering {
            old_state = self.last_state;
        }

        match old_state {
            PlaybackState::Loading if !self.status.play_after_loading() => {
                self.set_state(PlaybackState::Ready);
            }
            PlaybackState::Playing | PlaybackState::Stop | PlaybackState::Loading => {
                if self.should_wait_for_cache() {
                    self.last_state = PlaybackState::Playing;
                    self.queue
                        .send(Command::WaitForCache(self.cache_policy.wait_start_ms()));
                } else {
                    self.queue.send_pending_play(self.tuning.decode_delay_ms);
                }
            }
            PlaybackState::Pause => {
                self.queue.send_delayed(
                    Command::RenderFirstFrame {
                        next_state: PlaybackState::Pause,
                        position_us: sync_time_us,
                    },
                    self.tuning.decode_delay_ms,
                );
            }
            other => self.set_state(other),
        }
    }

    fn play_internal(&mut self) {
        self.queue.remove(CommandKind::RenderTick);
        self.queue.remove(CommandKind::Play);
        self.queue.remove(CommandKind::WaitForCache);
        self.queue.remove(CommandKind::RenderFirstFrame);

        if self.state == PlaybackState::Init {
            plog!(self.log, Warn, "⚠️ 尚未加载媒体，忽略播放");
            return;
        }
        self.clock.start_at(self.position_us);
        self.queue.send(Command::RenderTick);
        self.set_state(PlaybackState::Playing);
    }

    fn pause_internal(&mut self) {
        self.queue.remove(CommandKind::RenderTick);
        self.queue.remove_pending_plays();
        self.queue.remove(CommandKind::RenderFirstFrame);
        self.queue.remove(CommandKind::WaitForCache);

        // Ready 状态下只取消延迟的播放
        if matches!(self.state, PlaybackState::Ready | PlaybackState::Init) {
            return;
        }
        for renderer in self.renderers.iter_mut() {
            renderer.on_pause();
        }
        self.set_state(PlaybackState::Pause);
    }

    fn wait_for_cache_internal(&mut self, delay_ms: u64) {
        self.queue.remove(CommandKind::RenderTick);
        self.queue.remove(CommandKind::WaitForCache);

        let cache_us = self.source.cache_duration_us();
        self.status.set_cache_duration_us(cache_us);
        if self
            .cache_policy
            .should_stop_wait(self.source.has_cache_reached_end_of_stream(), cache_us)
        {
            plog!(self.log, Info, "✅ 缓冲完成 ({}us)，恢复播放", cache_us);
            self.queue.send(Command::Play);
        } else {
            plog!(
                self.log,
                Debug,
                "⏳ 缓冲进度 {:.0}%，{}ms 后重试",
                self.cache_policy.buffer_progress(cache_us) * 100.0,
                delay_ms
            );
            self.queue.send_delayed(
                Command::WaitForCache(self.cache_policy.next_wait_delay_ms(delay_ms)),
                delay_ms,
            );
        }
    }

    fn render_first_frame_internal(&mut self, next_state: PlaybackState, position_us: i64) {
        let now_ms = self.clock.elapsed_realtime_ms();
        for renderer in self.renderers.iter_mut() {
            if renderer.track_type() != TrackType::Video || renderer.state() != RendererState::Enabled {
                continue;
            }
            if let Err(e) = renderer.render_once(position_us, now_ms) {
                plog!(self.log, Debug, "🖼️ 首帧渲染失败: {}", e);
            }
        }
        self.set_state(next_state);
    }

    fn set_video_surface_internal(&mut self, surface: Option<Arc<dyn VideoSurface>>) {
        plog!(
            self.log,
            Debug,
            "🖥️ 输出平面{}",
            if surface.is_some() { "已连接" } else { "已断开" }
        );
        for renderer in self.renderers.iter_mut() {
            renderer.on_video_surface_changed(surface.clone(), self.source.as_mut());
        }
    }

    /// 反复拉取数据直到数据源没有进展
    ///
    /// `stop_on_prepare` 为 true 时，一旦有新的 prepare 排队就停止
    fn loop_send_data(&mut self, stop_on_prepare: bool) {
        loop {
            if self.queue.is_quit() || (stop_on_prepare && self.queue.has(CommandKind::Prepare)) {
                break;
            }
            match self.source.send_data(&mut self.renderers) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    plog!(self.log, Error, "❌ 拉取数据失败: {}", e);
                    if e.is_io() {
                        self.notify_error(e.error_code());
                    }
                    break;
                }
            }
        }
        self.status.set_cache_duration_us(self.source.cache_duration_us());
    }

    fn should_wait_for_cache(&self) -> bool {
        let cache_us = self.source.cache_duration_us();
        self.status.set_cache_duration_us(cache_us);
        self.cache_policy
            .should_wait_for_cache(self.source.has_cache_reached_end_of_stream(), cache_us)
    }

    /// 墙上时钟外推位置，有主时钟时取两者中较小者
    fn current_position_us(&self, delay_ms: i64) -> i64 {
        let duration_us = self.source.duration_us();
        let wall_position_us = self.clock.wall_position_us(delay_ms, duration_us);
        let master_position_us = self
            .sync_clock
            .as_ref()
            .map(|clock| clock.position_us(duration_us));
        sync_position_us(wall_position_us, master_position_us)
    }

    fn update_position(&mut self, position_us: i64) {
        self.position_us = position_us;
        self.status.set_position_us(position_us);
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == PlaybackState::Release || self.status.is_released() || self.state == state {
            return;
        }
        plog!(self.log, Info, "🔄 状态: {:?} -> {:?}", self.state, state);
        self.state = state;
        let _ = self.events.send(PlayerEvent::StateChanged(state));
    }

    fn notify_error(&self, code: ErrorCode) {
        if !self.status.is_released() {
            let _ = self.events.send(PlayerEvent::Error(code));
        }
    }

    fn shutdown(&mut self) {
        plog!(self.log, Info, "🧹 释放渲染器与数据源");
        self.state = PlaybackState::Release;
        for renderer in self.renderers.iter_mut() {
            if renderer.state() == RendererState::Enabled {
                renderer.disable(self.source.as_mut());
            }
            renderer.release();
        }
        self.source.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::loopback::{ClockedAudioSinkFactory, PassthroughDecoderFactory};
    use crate::player::memory_source::{MemoryMedia, MemoryMediaSource, SourceControl};
    use crate::player::renderer::CodecRendererFactory;
    use crossbeam_channel::{unbounded, Receiver};

    const URL: &str = "/media/demo.mp4";

    struct Harness {
        engine: PlaybackEngine,
        queue: Arc<CommandQueue>,
        events: Receiver<PlayerEvent>,
        control: Arc<SourceControl>,
        status: Arc<SharedStatus>,
    }

    impl Harness {
        fn new(config: PlayerConfig) -> Self {
            let source = MemoryMediaSource::new().with_media(URL, MemoryMedia::synthetic(10_000_000));
            let control = source.control();
            let factory = CodecRendererFactory::new(
                Arc::new(PassthroughDecoderFactory::new(8)),
                Arc::new(ClockedAudioSinkFactory::new(200)),
            );
            let queue = Arc::new(CommandQueue::new());
            let status = Arc::new(SharedStatus::new(config.play_after_loading));
            let (tx, rx) = unbounded();
            let components = Arc::new(ComponentListener::new(tx.clone()));
            let engine = PlaybackEngine::new(
                &config,
                Box::new(source),
                &factory,
                queue.clone(),
                status.clone(),
                components,
                tx,
            );
            Self {
                engine,
                queue,
                events: rx,
                control,
                status,
            }
        }

        fn send(&self, command: Command) {
            self.queue.send(command);
        }

        /// 不等待到期，执行队首命令
        fn step(&mut self) -> CommandKind {
            let command = self.queue.pop_front().expect("queue is empty");
            let kind = command.kind();
            self.engine.handle(command);
            kind
        }

        fn states(&self) -> Vec<PlaybackState> {
            self.events
                .try_iter()
                .filter_map(|event| match event {
                    PlayerEvent::StateChanged(state) => Some(state),
                    _ => None,
                })
                .collect()
        }

        fn prepare(&mut self) {
            self.send(Command::Prepare(MediaItem::from_url(URL)));
            self.step();
        }

        /// 加载完成并开始播放
        fn start_playing(&mut self) {
            self.prepare();
            self.send(Command::Play);
            self.step();
            assert_eq!(self.engine.state(), PlaybackState::Playing);
        }
    }

    #[test]
    fn test_prepare_without_auto_play_is_ready() {
        let mut h = Harness::new(PlayerConfig::default());
        h.prepare();
        assert_eq!(h.states(), vec![PlaybackState::Loading, PlaybackState::Ready]);
        assert!(h.queue.is_empty());
        assert_eq!(h.status.duration_us(), 10_000_000);
    }

    #[test]
    fn test_auto_play_skips_ready() {
        let mut h = Harness::new(PlayerConfig {
            play_after_loading: true,
            ..PlayerConfig::default()
        });
        h.prepare();
        assert_eq!(h.queue.kinds(), vec![CommandKind::Play]);
        h.step();
        assert_eq!(h.states(), vec![PlaybackState::Loading, PlaybackState::Playing]);
        assert_eq!(h.queue.kinds(), vec![CommandKind::RenderTick]);
    }

    #[test]
    fn test_pause_during_loading_ends_in_pause() {
        let mut h = Harness::new(PlayerConfig {
            play_after_loading: true,
            ..PlayerConfig::default()
        });
        h.send(Command::Prepare(MediaItem::from_url(URL)));
        h.send(Command::Pause);
        assert_eq!(h.step(), CommandKind::Prepare);
        assert_eq!(h.queue.kinds(), vec![CommandKind::Pause]);
        h.step();
        assert_eq!(h.states(), vec![PlaybackState::Loading, PlaybackState::Pause]);
        assert!(h.queue.is_empty());
    }

    #[test]
    fn test_pause_cancels_pending_play_after_loading() {
        let mut h = Harness::new(PlayerConfig {
            play_after_loading: true,
            ..PlayerConfig::default()
        });
        h.prepare();
        h.send(Command::Pause);
        // Pause 在延迟播放之前到期
        assert_eq!(h.queue.kinds(), vec![CommandKind::Pause, CommandKind::Play]);
        h.step();
        assert!(h.queue.is_empty());
        assert_eq!(h.states(), vec![PlaybackState::Loading, PlaybackState::Pause]);
    }

    #[test]
    fn test_newer_prepare_supersedes() {
        let mut h = Harness::new(PlayerConfig::default());
        h.send(Command::Prepare(MediaItem::from_url("/other.mp4")));
        h.send(Command::Prepare(MediaItem::from_url(URL)));
        h.step();
        assert!(h.states().is_empty());
        h.step();
        assert_eq!(h.states(), vec![PlaybackState::Loading, PlaybackState::Ready]);
    }

    #[test]
    fn test_source_error_returns_to_init() {
        let mut h = Harness::new(PlayerConfig::default());
        h.send(Command::Prepare(MediaItem::from_url("/missing.mp4")));
        h.step();
        let events: Vec<PlayerEvent> = h.events.try_iter().collect();
        assert!(matches!(events[0], PlayerEvent::StateChanged(PlaybackState::Loading)));
        assert!(matches!(events[1], PlayerEvent::Error(ErrorCode::SourceError)));
        assert!(matches!(events[2], PlayerEvent::StateChanged(PlaybackState::Init)));
        assert_eq!(h.engine.state(), PlaybackState::Init);
    }

    #[test]
    fn test_failed_prepare_clears_previous_duration() {
        let mut h = Harness::new(PlayerConfig::default());
        h.prepare();
        assert_eq!(h.status.duration_us(), 10_000_000);

        h.send(Command::Prepare(MediaItem::from_url("/missing.mp4")));
        h.step();
        assert_eq!(h.engine.state(), PlaybackState::Init);
        assert_eq!(h.status.duration_us(), -1);
        assert_eq!(h.status.cache_duration_us(), -1);
    }

    #[test]
    fn test_cache_duration_published_after_loading() {
        let mut h = Harness::new(PlayerConfig::default());
        h.control.set_cache_duration_us(Some(1_500_000));
        h.prepare();
        assert_eq!(h.engine.state(), PlaybackState::Ready);
        assert_eq!(h.status.cache_duration_us(), 1_500_000);
    }

    #[test]
    fn test_network_unreachable() {
        let mut h = Harness::new(PlayerConfig::default());
        h.control.set_network_available(false);
        h.send(Command::Prepare(MediaItem::from_url("https://cdn.example.com/live.m3u8")));
        h.step();
        let errors: Vec<ErrorCode> = h
            .events
            .try_iter()
            .filter_map(|event| match event {
                PlayerEvent::Error(code) => Some(code),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![ErrorCode::NetworkUnreachable]);
        assert_eq!(h.engine.state(), PlaybackState::Init);
    }

    #[test]
    fn test_consecutive_seeks_collapse() {
        let mut h = Harness::new(PlayerConfig::default());
        h.start_playing();
        h.queue.remove(CommandKind::RenderTick);
        h.states();

        h.send(Command::SeekTo(1_000));
        h.send(Command::SeekTo(3_000));
        h.step();
        assert!(h.control.seeks().is_empty());
        h.step();
        assert_eq!(h.control.seeks(), vec![3_000_000]);
        assert_eq!(h.engine.position_us(), 3_000_000);
        assert_eq!(h.states(), vec![PlaybackState::Buffering]);

        // 恢复播放的延迟 play
        assert_eq!(h.queue.kinds(), vec![CommandKind::Play]);
        h.step();
        assert_eq!(h.states(), vec![PlaybackState::Playing]);
    }

    #[test]
    fn test_seek_while_paused_renders_one_frame() {
        let mut h = Harness::new(PlayerConfig::default());
        h.start_playing();
        h.send(Command::Pause);
        h.queue.remove(CommandKind::RenderTick);
        h.step();
        h.states();

        h.send(Command::SeekTo(2_000));
        h.step();
        assert_eq!(h.queue.kinds(), vec![CommandKind::RenderFirstFrame]);
        h.step();
        assert_eq!(h.states(), vec![PlaybackState::Buffering, PlaybackState::Pause]);
    }

    #[test]
    fn test_read_failure_during_tick_keeps_playing() {
        let mut h = Harness::new(PlayerConfig::default());
        h.start_playing();
        h.events.try_iter().for_each(drop);

        h.control.set_fail_reads(true);
        assert_eq!(h.step(), CommandKind::RenderTick);
        let events: Vec<PlayerEvent> = h.events.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PlayerEvent::Error(ErrorCode::IoError)));
        assert_eq!(h.engine.state(), PlaybackState::Playing);
        // 下一轮照常调度
        assert_eq!(h.queue.kinds(), vec![CommandKind::RenderTick]);
    }

    #[test]
    fn test_position_never_decreases_while_playing() {
        let mut h = Harness::new(PlayerConfig::default());
        h.start_playing();

        let mut last_us = h.status.position_us();
        for _ in 0..50 {
            std::thread::sleep(std::time::Duration::from_millis(2));
            assert_eq!(h.step(), CommandKind::RenderTick);
            let position_us = h.status.position_us();
            assert!(position_us >= last_us, "{} < {}", position_us, last_us);
            last_us = position_us;
        }
        assert_eq!(h.engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_cache_starvation_backoff() {
        let mut h = Harness::new(PlayerConfig::default());
        h.start_playing();
        h.states();
        h.control.set_end_of_stream(false);
        h.control.set_cache_duration_us(Some(0));

        assert_eq!(h.step(), CommandKind::RenderTick);
        assert_eq!(h.states(), vec![PlaybackState::Buffering]);

        let mut delays = Vec::new();
        for _ in 0..5 {
            match h.queue.pop_front() {
                Some(Command::WaitForCache(delay)) => {
                    delays.push(delay);
                    h.engine.handle(Command::WaitForCache(delay));
                }
                other => panic!("unexpected command: {:?}", other),
            }
        }
        assert_eq!(delays, vec![100, 200, 400, 800, 800]);

        h.control.set_cache_duration_us(Some(4_000_000));
        h.step();
        assert_eq!(h.queue.kinds(), vec![CommandKind::Play]);
        h.step();
        assert_eq!(h.states(), vec![PlaybackState::Playing]);
    }

    #[test]
    fn test_released_engine_is_silent() {
        let mut h = Harness::new(PlayerConfig::default());
        h.status.mark_released();
        h.prepare();
        assert!(h.states().is_empty());
        assert_eq!(h.engine.state(), PlaybackState::Init);
    }
}
