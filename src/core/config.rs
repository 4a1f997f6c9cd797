use crate::core::{LogConfig, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 播放器配置（构造时确定）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 首次加载完成后是否自动播放
    pub play_after_loading: bool,
    /// 不自动播放时，是否尽力渲染首帧
    pub render_first_frame: bool,
    /// 播放结束后是否从头循环
    pub infinite_loop: bool,
    /// 请求网络媒体时附带的请求头
    pub request_headers: Option<HashMap<String, String>>,
    /// 调度参数
    pub tuning: PlaybackTuning,
    /// 日志配置
    pub log: LogConfig,
}

impl PlayerConfig {
    /// 从 JSON 字符串加载配置，缺省字段使用默认值
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 从 JSON 文件加载配置
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// 调度相关的常量
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTuning {
    /// 渲染循环的目标间隔（毫秒）
    pub render_interval_ms: u64,
    /// 等待解码器产出首批数据的延迟（毫秒）
    pub decode_delay_ms: u64,
    /// 缓存低于此值应进入等待（微秒）
    pub min_cache_duration_us: i64,
    /// 缓存高于此值应离开等待（微秒）
    pub max_cache_duration_us: i64,
    /// 缓存轮询的初始间隔（毫秒）
    pub wait_start_ms: u64,
    /// 缓存轮询的最大间隔（毫秒）
    pub max_wait_ms: u64,
    /// 视频帧可同步的范围（微秒）
    pub video_sync_limit_us: i64,
    /// 视频帧允许超前的最大限度（微秒）
    pub video_leading_limit_us: i64,
    /// 视频单次渲染的时间预算，None 表示不限制
    pub video_render_time_limit_ms: Option<u64>,
    /// 音频单次渲染的时间预算，0 表示每次只处理一个输出缓冲
    pub audio_render_time_limit_ms: Option<u64>,
}

impl Default for PlaybackTuning {
    fn default() -> Self {
        Self {
            render_interval_ms: 10,
            decode_delay_ms: 100,
            min_cache_duration_us: 1_000_000,
            max_cache_duration_us: 3_500_000,
            wait_start_ms: 100,
            max_wait_ms: 800,
            video_sync_limit_us: 50_000,
            video_leading_limit_us: 1_000_000,
            video_render_time_limit_ms: None,
            audio_render_time_limit_ms: Some(0),
        }
    }
}
