use crate::core::ErrorCode;
use crate::player::codec::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开媒体源: {0}")]
    OpenError(String),

    #[error("网络不可达: {0}")]
    NetworkUnreachable(String),

    #[error("解码器错误: {0}")]
    Codec(#[from] CodecError),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("配置错误: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("线程错误: {0}")]
    ThreadError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl PlayerError {
    /// 映射为监听器可见的错误码
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PlayerError::NetworkUnreachable(_) => ErrorCode::NetworkUnreachable,
            PlayerError::IoError(_) => ErrorCode::IoError,
            _ => ErrorCode::SourceError,
        }
    }

    /// 是否为需要通知外部的 I/O 错误
    pub fn is_io(&self) -> bool {
        matches!(self, PlayerError::IoError(_))
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
