use anyhow::Result;
use log::info;
use myy_engine::core::{log_ctx, PlaybackState, PlayerConfig};
use myy_engine::player::{
    ClockedAudioSinkFactory, CodecRendererFactory, CountingSurface, EventListener, MemoryMedia,
    MemoryMediaSource, PassthroughDecoderFactory, PlayerBuilder,
};
use myy_engine::{ErrorCode, Format, MediaItem};
use std::sync::Arc;
use std::time::Duration;

const DEMO_URL: &str = "memory://demo.mp4";
const DEMO_DURATION_US: i64 = 5_000_000;

/// 把播放器事件打印到日志
struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_player_error(&mut self, error_code: ErrorCode) {
        info!("{} ❌ 播放器错误: {:?}", log_ctx(), error_code);
    }

    fn on_playback_state_changed(&mut self, state: PlaybackState) {
        info!("{} 🔔 状态变化: {:?}", log_ctx(), state);
    }

    fn on_video_metadata_changed(&mut self, format: &Format) {
        info!(
            "{} 📐 视频信息: {}x{} @ {}fps",
            log_ctx(),
            format.width,
            format.height,
            format.frame_rate
        );
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("🎬 MYY Engine - 合成媒体演示启动");

    // 可选：第一个参数为 JSON 配置文件
    let mut config = match std::env::args().nth(1) {
        Some(path) => PlayerConfig::from_json_file(&path)
            .map_err(|e| anyhow::anyhow!("读取配置失败 {}: {}", path, e))?,
        None => PlayerConfig::default(),
    };
    config.play_after_loading = true;

    let source = MemoryMediaSource::new().with_media(DEMO_URL, MemoryMedia::synthetic(DEMO_DURATION_US));
    let renderer_factory = CodecRendererFactory::new(
        Arc::new(PassthroughDecoderFactory::new(8)),
        Arc::new(ClockedAudioSinkFactory::new(200)),
    );
    let mut player = PlayerBuilder::new(source, renderer_factory)
        .config(config)
        .build()
        .map_err(|e| anyhow::anyhow!("播放器创建失败: {}", e))?;

    let surface = Arc::new(CountingSurface::new());
    player.add_event_listener(Box::new(LoggingListener));
    player.set_video_surface(surface.clone());
    player.set_media_item(MediaItem::from_url(DEMO_URL));
    player.prepare();

    if !player.wait_for_state(PlaybackState::Playing, Duration::from_secs(5)) {
        anyhow::bail!("播放未能开始: {:?}", player.playback_state());
    }

    let timeout = Duration::from_micros(DEMO_DURATION_US as u64) + Duration::from_secs(5);
    let finished = player.wait_for_state(PlaybackState::Stop, timeout);

    info!(
        "📊 播放{}: 位置 {}ms / {}ms, 送显 {} 帧 (最后一帧 {}us)",
        if finished { "结束" } else { "超时" },
        player.current_position_ms(),
        player.duration_ms(),
        surface.frames(),
        surface.last_presentation_time_us()
    );
    // 正常结束时引擎已在结束日志中输出并清零帧统计
    if !finished {
        let stats = player.frame_stats();
        info!("📊 当前统计: 送显 {}, 丢帧 {}", stats.released, stats.lost);
    }

    player.release();
    info!("👋 演示结束");
    Ok(())
}
