use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 格式字段缺失时的占位值
pub const NO_VALUE: i32 = -1;

/// 样本标志：关键帧（同步点）
pub const SAMPLE_FLAG_SYNC: u32 = 1;

/// 缓冲区标志：流结束
pub const BUFFER_FLAG_END_OF_STREAM: u32 = 4;

/// 媒体项 - 播放器要加载的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    /// 本地文件路径
    LocalFile(PathBuf),

    /// 网络流 URL
    NetworkStream {
        url: String,
        protocol: StreamProtocol,
    },
}

impl MediaItem {
    /// 从 URL 字符串解析媒体项
    pub fn from_url(url: &str) -> Self {
        let protocol = if url.starts_with("rtsp://") {
            Some(StreamProtocol::RTSP)
        } else if url.starts_with("rtmp://") {
            Some(StreamProtocol::RTMP)
        } else if url.ends_with(".m3u8") || url.contains("/hls/") {
            Some(StreamProtocol::HLS)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Some(StreamProtocol::HTTP)
        } else {
            None
        };

        match protocol {
            Some(protocol) => MediaItem::NetworkStream {
                url: url.to_string(),
                protocol,
            },
            // 默认当作本地文件（包括 file:// 前缀）
            None => MediaItem::LocalFile(PathBuf::from(url.trim_start_matches("file://"))),
        }
    }

    /// 是否为本地资源（本地资源不做网络连通性检查）
    pub fn is_local(&self) -> bool {
        matches!(self, MediaItem::LocalFile(_))
    }

    /// 数据源用来定位内容的键
    pub fn location(&self) -> String {
        match self {
            MediaItem::LocalFile(path) => path.to_string_lossy().to_string(),
            MediaItem::NetworkStream { url, .. } => url.clone(),
        }
    }
}

/// 流媒体协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// RTSP - 实时流协议（监控摄像头）
    RTSP,
    /// RTMP - 实时消息协议（直播流）
    RTMP,
    /// HLS - HTTP Live Streaming
    HLS,
    /// HTTP - 普通 HTTP 流
    HTTP,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::RTSP => "RTSP",
            StreamProtocol::RTMP => "RTMP",
            StreamProtocol::HLS => "HLS",
            StreamProtocol::HTTP => "HTTP",
        }
    }
}

/// 播放状态
///
/// `Release` 是终态，进入后不再发生任何状态转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Init,
    Loading,
    Ready,
    Playing,
    Pause,
    Buffering,
    Stop,
    Release,
}

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Video,
    Audio,
    None,
}

/// 通知给监听器的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 提供的媒体数据无法成功加载
    SourceError = 11,
    /// 拉取/渲染过程中的 I/O 错误
    IoError = 12,
    /// 无网络连接
    NetworkUnreachable = 13,
}

/// 数据源给出的原始轨道描述（键值对）
pub type MediaFormat = BTreeMap<String, String>;

pub const KEY_MIME: &str = "mime";
pub const KEY_DURATION: &str = "durationUs";
pub const KEY_WIDTH: &str = "width";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_FRAME_RATE: &str = "frame-rate";
pub const KEY_ROTATION: &str = "rotation-degrees";
pub const KEY_CHANNEL_COUNT: &str = "channel-count";
pub const KEY_SAMPLE_RATE: &str = "sample-rate";

/// 轨道格式（只读）
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub track_index: usize,
    pub sample_mime_type: Option<String>,
    pub duration_us: i64,

    // 仅视频
    pub width: i32,
    pub height: i32,
    pub frame_rate: f32,
    pub rotation: i32,

    // 仅音频
    pub channel_count: i32,
    pub sample_rate: i32,

    /// 原始描述，解码器配置时原样交给解码器
    pub media_format: MediaFormat,
}

impl Format {
    /// 解析轨道描述，缺失或格式错误的字段回退到默认值
    pub fn parse(track_index: usize, media_format: &MediaFormat) -> Self {
        Self {
            track_index,
            sample_mime_type: media_format.get(KEY_MIME).cloned(),
            duration_us: parse_or(media_format, KEY_DURATION, -1i64),
            width: parse_or(media_format, KEY_WIDTH, NO_VALUE),
            height: parse_or(media_format, KEY_HEIGHT, NO_VALUE),
            frame_rate: parse_or(media_format, KEY_FRAME_RATE, -1.0f32),
            rotation: parse_or(media_format, KEY_ROTATION, 0),
            channel_count: parse_or(media_format, KEY_CHANNEL_COUNT, NO_VALUE),
            sample_rate: parse_or(media_format, KEY_SAMPLE_RATE, NO_VALUE),
            media_format: media_format.clone(),
        }
    }

    pub fn is_video(&self) -> bool {
        self.sample_mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("video/"))
    }

    pub fn is_audio(&self) -> bool {
        self.sample_mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("audio/"))
    }

    /// 新轨道能否沿用按 `self` 配置好的解码会话
    pub fn is_compatible_with(&self, other: &Format) -> bool {
        if self.sample_mime_type != other.sample_mime_type {
            return false;
        }
        if self.is_audio() {
            self.channel_count == other.channel_count && self.sample_rate == other.sample_rate
        } else if self.is_video() {
            self.width == other.width && self.height == other.height
        } else {
            false
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[sampleType: {}, duration: {}, width: {}, height: {}, frameRate: {}, channelCount: {}, sampleRate: {}]",
            self.sample_mime_type.as_deref().unwrap_or("none"),
            self.duration_us,
            self.width,
            self.height,
            self.frame_rate,
            self.channel_count,
            self.sample_rate
        )
    }
}

fn parse_or<T: std::str::FromStr>(media_format: &MediaFormat, key: &str, default: T) -> T {
    media_format
        .get(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// 单次读取样本的描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleData {
    /// 字节数，没有数据时为 -1
    pub size: i32,
    /// 显示时间戳（微秒）
    pub sample_time_us: i64,
    pub flags: u32,
    pub end_of_stream: bool,
}

impl SampleData {
    /// 流结束样本
    pub fn end_of_stream(duration_us: i64) -> Self {
        Self {
            size: -1,
            sample_time_us: duration_us,
            flags: 0,
            end_of_stream: true,
        }
    }
}

/// 播放器状态快照（供外部读取）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub state: PlaybackState,
    pub position: i64,          // 当前位置（毫秒）
    pub duration: i64,          // 总时长（毫秒），未知为 -1
    pub cache_duration: i64,    // 已缓存时长（毫秒），未知为 -1
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            state: PlaybackState::Init,
            position: 0,
            duration: -1,
            cache_duration: -1,
        }
    }
}

/// 视频帧统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub released: u64,
    pub lost: u64,
}

impl FrameStats {
    pub fn total(&self) -> u64 {
        self.released + self.lost
    }

    /// 丢帧率，没有帧时为 0
    pub fn loss_ratio(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.lost as f64 / self.total() as f64
        }
    }
}
