use log::{Level, LevelFilter};
use serde::{Deserialize, Serialize};
use std::process;
use std::sync::Arc;
use std::thread;

/// 日志上下文：进程号 + 线程号
pub fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 是否输出播放器日志
    pub enabled: bool,
    /// 日志 target
    pub target: String,
    /// 最高输出级别
    pub level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: "myy_engine".to_string(),
            level: LevelFilter::Info,
        }
    }
}

/// 注入到引擎和渲染器中的日志能力（替代全局开关）
#[derive(Debug, Clone)]
pub struct PlayerLog {
    target: Arc<str>,
    max_level: LevelFilter,
}

impl PlayerLog {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            target: Arc::from(config.target.as_str()),
            max_level: if config.enabled { config.level } else { LevelFilter::Off },
        }
    }

    /// 完全静默
    pub fn silent() -> Self {
        Self {
            target: Arc::from("myy_engine"),
            max_level: LevelFilter::Off,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }
}

impl Default for PlayerLog {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

/// 通过注入的 [`PlayerLog`] 输出日志
///
/// ```ignore
/// plog!(self.log, Info, "🎬 播放: {}us", position_us);
/// ```
#[macro_export]
macro_rules! plog {
    ($log:expr, $lvl:ident, $($arg:tt)+) => {{
        let log: &$crate::core::PlayerLog = &$log;
        if log.enabled(::log::Level::$lvl) {
            ::log::log!(
                target: log.target(),
                ::log::Level::$lvl,
                "{} {}",
                $crate::core::log_ctx(),
                format_args!($($arg)+)
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_log_is_silent() {
        let log = PlayerLog::new(&LogConfig {
            enabled: false,
            ..LogConfig::default()
        });
        assert!(!log.enabled(Level::Error));
        assert!(!PlayerLog::silent().enabled(Level::Error));
    }

    #[test]
    fn test_level_filter() {
        let log = PlayerLog::new(&LogConfig {
            level: LevelFilter::Warn,
            ..LogConfig::default()
        });
        assert!(log.enabled(Level::Error));
        assert!(log.enabled(Level::Warn));
        assert!(!log.enabled(Level::Info));
        assert_eq!(log.target(), "myy_engine");
    }
}
