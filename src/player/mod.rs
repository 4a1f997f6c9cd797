// 播放器核心模块

pub mod media_source;
pub mod memory_source;   // 内存数据源（预先解复用的样本）
pub mod codec;           // 解码会话接口
pub mod renderer;        // 解码渲染单元模板
pub mod video_renderer;
pub mod audio_renderer;
pub mod buffering;       // 缓存等待策略
pub mod command_queue;   // 工作线程命令队列
pub mod engine;          // 播放状态机（工作线程）
pub mod listener;
pub mod manager;         // 控制线程一侧的播放器
pub mod builder;
pub mod loopback;        // 直通解码器 / 实时音频设备 / 计数输出平面

#[cfg(test)]
pub(crate) mod testing;

pub use media_source::{MediaSource, ReceiverSet, Sample, SampleReceiver, SeekMode};
pub use memory_source::{EncodedSample, MemoryMedia, MemoryMediaSource, SourceControl};
pub use codec::{CodecError, Decoder, DecoderConfiguration, DecoderFactory, VideoSurface};
pub use renderer::{CodecRendererFactory, Renderer, RendererFactory, RendererState};
pub use video_renderer::VideoRenderer;
pub use audio_renderer::{AudioRenderer, AudioSink, AudioSinkFactory};
pub use buffering::CachePolicy;
pub use engine::{PlaybackEngine, PlayerEvent};
pub use listener::{EventListener, ListenerId, VideoFrameListener, VideoMetadataListener};
pub use manager::PlaybackManager;
pub use builder::PlayerBuilder;
pub use loopback::{ClockedAudioSinkFactory, CountingSurface, PassthroughDecoderFactory};
