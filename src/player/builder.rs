use crate::core::{LogConfig, PlaybackTuning, PlayerConfig, PlayerError, PlayerLog, Result};
use crate::player::command_queue::CommandQueue;
use crate::player::engine::{ComponentListener, PlaybackEngine, SharedStatus};
use crate::player::manager::PlaybackManager;
use crate::player::media_source::MediaSource;
use crate::player::renderer::RendererFactory;
use crate::plog;
use crossbeam_channel::unbounded;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

/// 播放器构建器
///
/// ```ignore
/// let mut player = PlayerBuilder::new(source, renderer_factory)
///     .play_after_loading(true)
///     .build()?;
/// player.set_media_item(MediaItem::from_url(url));
/// player.prepare();
/// ```
pub struct PlayerBuilder {
    source: Box<dyn MediaSource>,
    renderer_factory: Box<dyn RendererFactory>,
    config: PlayerConfig,
}

impl PlayerBuilder {
    pub fn new(
        source: impl MediaSource + 'static,
        renderer_factory: impl RendererFactory + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            renderer_factory: Box::new(renderer_factory),
            config: PlayerConfig::default(),
        }
    }

    /// 整体替换配置
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn play_after_loading(mut self, play: bool) -> Self {
        self.config.play_after_loading = play;
        self
    }

    pub fn render_first_frame(mut self, render: bool) -> Self {
        self.config.render_first_frame = render;
        self
    }

    pub fn infinite_loop(mut self, infinite: bool) -> Self {
        self.config.infinite_loop = infinite;
        self
    }

    pub fn request_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.request_headers = Some(headers);
        self
    }

    pub fn tuning(mut self, tuning: PlaybackTuning) -> Self {
        self.config.tuning = tuning;
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.config.log = log;
        self
    }

    /// 创建渲染器并启动工作线程
    pub fn build(self) -> Result<PlaybackManager> {
        let log = PlayerLog::new(&self.config.log);
        let queue = Arc::new(CommandQueue::new());
        let status = Arc::new(SharedStatus::new(self.config.play_after_loading));
        let (event_tx, event_rx) = unbounded();
        let components = Arc::new(ComponentListener::new(event_tx.clone()));

        let engine = PlaybackEngine::new(
            &self.config,
            self.source,
            self.renderer_factory.as_ref(),
            queue.clone(),
            status.clone(),
            components.clone(),
            event_tx,
        );

        let worker = thread::Builder::new()
            .name("playback-engine".to_string())
            .spawn(move || engine.run())
            .map_err(|e| PlayerError::ThreadError(format!("无法启动播放线程: {}", e)))?;

        plog!(
            log,
            Info,
            "✅ 播放器创建完成 (自动播放: {}, 首帧: {}, 循环: {})",
            self.config.play_after_loading,
            self.config.render_first_frame,
            self.config.infinite_loop
        );
        Ok(PlaybackManager::new(queue, status, components, event_rx, worker, log))
    }
}
