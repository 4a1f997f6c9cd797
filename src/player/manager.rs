use crate::core::{ErrorCode, Format, FrameStats, MediaItem, PlaybackState, PlayerLog, PlayerState};
use crate::player::codec::{same_surface, VideoSurface};
use crate::player::command_queue::{Command, CommandQueue};
use crate::player::engine::{ComponentListener, PlayerEvent, SharedStatus};
use crate::player::listener::{EventListener, ListenerId};
use crate::plog;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// 播放管理器 - 控制线程一侧的播放器
///
/// 所有公开操作只做简单的状态检查，然后把命令投递给工作线程。
/// 工作线程的状态变化和错误通过 [`poll_events`](Self::poll_events) 在控制线程上分发给监听器
pub struct PlaybackManager {
    control_thread: ThreadId,
    /// 对外可见的状态，只在控制线程上修改
    state: PlaybackState,
    queue: Arc<CommandQueue>,
    status: Arc<SharedStatus>,
    components: Arc<ComponentListener>,
    events: Receiver<PlayerEvent>,
    worker: Option<JoinHandle<()>>,

    listeners: Vec<(ListenerId, Box<dyn EventListener>)>,
    next_listener_id: u64,
    media_item: Option<MediaItem>,
    video_surface: Option<Arc<dyn VideoSurface>>,
    /// 最近一次的视频元数据，重放给后加入的监听器
    video_format: Option<Format>,
    log: PlayerLog,
}

impl PlaybackManager {
    pub(crate) fn new(
        queue: Arc<CommandQueue>,
        status: Arc<SharedStatus>,
        components: Arc<ComponentListener>,
        events: Receiver<PlayerEvent>,
        worker: JoinHandle<()>,
        log: PlayerLog,
    ) -> Self {
        Self {
            control_thread: thread::current().id(),
            state: PlaybackState::Init,
            queue,
            status,
            components,
            events,
            worker: Some(worker),
            listeners: Vec::new(),
            next_listener_id: 0,
            media_item: None,
            video_surface: None,
            video_format: None,
            log,
        }
    }

    fn verify_control_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.control_thread,
            "播放器只能在创建它的线程上访问"
        );
    }

    /// 设置下一次 [`prepare`](Self::prepare) 加载的媒体
    pub fn set_media_item(&mut self, item: MediaItem) {
        self.media_item = Some(item);
    }

    pub fn media_item(&self) -> Option<&MediaItem> {
        self.media_item.as_ref()
    }

    /// 加载媒体项，完成后按配置自动播放、渲染首帧或进入 Ready
    pub fn prepare(&mut self) {
        self.verify_control_thread();
        if self.state == PlaybackState::Release {
            return;
        }
        match &self.media_item {
            Some(item) => {
                plog!(self.log, Info, "📂 准备加载: {}", item.location());
                self.queue.send(Command::Prepare(item.clone()));
            }
            None => plog!(self.log, Warn, "⚠️ 没有设置媒体项"),
        }
    }

    /// 开始播放，`delay_ms > 0` 时延迟执行，可以被 pause / seek / prepare 撤销
    pub fn play(&mut self, delay_ms: u64) {
        self.verify_control_thread();
        match self.state {
            PlaybackState::Stop => {
                self.queue.send(Command::SeekTo(0));
            }
            PlaybackState::Buffering | PlaybackState::Pause | PlaybackState::Ready => {
                if delay_ms > 0 {
                    self.queue.send_pending_play(delay_ms);
                } else {
                    self.queue.send(Command::Play);
                }
            }
            _ => {}
        }
    }

    pub fn pause(&mut self) {
        self.verify_control_thread();
        // Ready 状态下只用来取消延迟的播放
        if Self::can_pause(self.state) || self.state == PlaybackState::Ready {
            self.queue.send(Command::Pause);
        }
    }

    /// 跳转到 `position_ms`，排队中的旧 seek 会被新的覆盖
    pub fn seek_to(&mut self, position_ms: i64) {
        self.verify_control_thread();
        if position_ms < 0
            || position_ms > self.duration_ms()
            || position_ms == self.current_position_ms()
        {
            return;
        }
        if Self::can_seek_to(self.state) {
            self.queue.send(Command::SeekTo(position_ms));
        }
    }

    /// 释放播放器，之后所有操作都不再生效
    pub fn release(&mut self) {
        self.verify_control_thread();
        self.release_internal();
    }

    fn release_internal(&mut self) {
        if self.state == PlaybackState::Release {
            return;
        }
        plog!(self.log, Info, "🧹 释放播放器");
        self.state = PlaybackState::Release;
        self.status.mark_released();
        self.queue.quit();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                plog!(self.log, Error, "❌ 播放线程异常退出");
            }
        }
        self.video_surface = None;
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_playback_state_changed(PlaybackState::Release);
        }
        self.listeners.clear();
    }

    /// 设置视频输出平面，替换已有的平面
    pub fn set_video_surface(&mut self, surface: Arc<dyn VideoSurface>) {
        self.verify_control_thread();
        if self.state == PlaybackState::Release {
            return;
        }
        if let Some(current) = &self.video_surface {
            if same_surface(current, &surface) {
                return;
            }
            self.clear_video_surface();
        }
        self.video_surface = Some(surface.clone());
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_video_surface_attach();
        }
        self.queue.send(Command::SetVideoSurface(Some(surface)));
    }

    pub fn clear_video_surface(&mut self) {
        self.verify_control_thread();
        if self.video_surface.take().is_some() {
            for (_, listener) in self.listeners.iter_mut() {
                listener.on_video_surface_detach();
            }
            self.queue.send(Command::SetVideoSurface(None));
        }
    }

    pub fn has_video_surface(&self) -> bool {
        self.video_surface.is_some()
    }

    /// 添加监听器，立即回放一次当前状态
    pub fn add_event_listener(&mut self, mut listener: Box<dyn EventListener>) -> ListenerId {
        self.verify_control_thread();
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        listener.on_playback_state_changed(self.state);
        if let Some(format) = &self.video_format {
            listener.on_video_metadata_changed(format);
        }
        if self.state != PlaybackState::Release {
            self.listeners.push((id, listener));
        }
        id
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.verify_control_thread();
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// 分发工作线程产生的全部事件，返回处理的事件数
    pub fn poll_events(&mut self) -> usize {
        self.verify_control_thread();
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// 分发事件直到进入 `target` 状态或超时
    pub fn wait_for_state(&mut self, target: PlaybackState, timeout: Duration) -> bool {
        self.verify_control_thread();
        let deadline = Instant::now() + timeout;
        loop {
            if self.state == target {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return self.state == target;
                }
            }
        }
    }

    fn dispatch(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::StateChanged(state) => self.change_state_unchecked(state),
            PlayerEvent::Error(code) => self.notify_error(code),
            PlayerEvent::VideoMetadataChanged(format) => {
                if self.state != PlaybackState::Release {
                    for (_, listener) in self.listeners.iter_mut() {
                        listener.on_video_metadata_changed(&format);
                    }
                }
                self.video_format = Some(format);
            }
        }
    }

    fn change_state_unchecked(&mut self, state: PlaybackState) {
        if self.state != PlaybackState::Release && self.state != state {
            self.state = state;
            for (_, listener) in self.listeners.iter_mut() {
                listener.on_playback_state_changed(state);
            }
        }
    }

    fn notify_error(&mut self, code: ErrorCode) {
        if self.state != PlaybackState::Release {
            plog!(self.log, Warn, "⚠️ 播放器错误: {:?}", code);
            for (_, listener) in self.listeners.iter_mut() {
                listener.on_player_error(code);
            }
        }
    }

    pub fn can_pause(state: PlaybackState) -> bool {
        matches!(
            state,
            PlaybackState::Playing | PlaybackState::Buffering | PlaybackState::Loading
        )
    }

    pub fn can_seek_to(state: PlaybackState) -> bool {
        matches!(
            state,
            PlaybackState::Playing
                | PlaybackState::Pause
                | PlaybackState::Stop
                | PlaybackState::Buffering
        )
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// 媒体总时长，未知为 -1
    pub fn duration_ms(&self) -> i64 {
        let duration_us = self.status.duration_us();
        if duration_us > 0 {
            duration_us / 1000
        } else {
            -1
        }
    }

    pub fn current_position_ms(&self) -> i64 {
        self.status.position_us() / 1000
    }

    /// 已缓存时长，不可用为 -1
    pub fn cache_duration_ms(&self) -> i64 {
        let cache_us = self.status.cache_duration_us();
        if cache_us > 0 {
            cache_us / 1000
        } else {
            -1
        }
    }

    pub fn play_after_loading(&self) -> bool {
        self.status.play_after_loading()
    }

    /// 运行时修改加载完成后是否自动播放
    pub fn set_play_after_loading(&mut self, play: bool) {
        self.status.set_play_after_loading(play);
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.components.frame_stats()
    }

    /// 当前状态快照
    pub fn get_state(&self) -> PlayerState {
        PlayerState {
            state: self.state,
            position: self.current_position_ms(),
            duration: self.duration_ms(),
            cache_duration: self.cache_duration_ms(),
        }
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        if self.state != PlaybackState::Release {
            plog!(self.log, Debug, "🗑️ PlaybackManager 被 drop，自动释放");
            self.release_internal();
        }
    }
}
