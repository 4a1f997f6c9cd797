use crate::core::{MediaFormat, BUFFER_FLAG_END_OF_STREAM};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// 解码会话错误
#[derive(Error, Debug)]
pub enum CodecError {
    /// 会话已处于不可用状态，需要释放后重新创建
    #[error("解码会话状态异常: {0}")]
    IllegalState(String),

    /// 单次操作失败（例如释放了一个不完整的帧），会话本身仍可用
    #[error("解码失败: {0}")]
    Codec(String),
}

/// 解码器输出的渲染目标
pub trait VideoSurface: Send + Sync + Debug {
    /// 将时间戳为 `presentation_time_us` 的帧送显
    fn render_frame(&self, presentation_time_us: i64);
}

/// 两个渲染目标是否为同一个对象
pub fn same_surface(a: &Arc<dyn VideoSurface>, b: &Arc<dyn VideoSurface>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// 输出缓冲区信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: u32,
}

impl BufferInfo {
    pub fn is_end_of_stream(&self) -> bool {
        self.flags & BUFFER_FLAG_END_OF_STREAM != 0
    }
}

/// 一次取输出的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// 取到一个输出缓冲区
    Buffer { index: usize, info: BufferInfo },
    /// 输出格式发生变化，没有数据
    FormatChanged,
    /// 暂时没有可用输出
    TryAgainLater,
}

/// 创建解码会话所需的参数
#[derive(Debug, Clone)]
pub struct DecoderConfiguration {
    pub mime: String,
    pub format: MediaFormat,
    /// 视频解码器的输出平面，音频为 None
    pub surface: Option<Arc<dyn VideoSurface>>,
}

/// 硬件解码会话
///
/// 输入与输出缓冲区都由会话持有，数量有限；
/// 所有操作都是非阻塞的，缓冲区耗尽时返回 `None` / `TryAgainLater`
pub trait Decoder: Send {
    /// 申请一个空闲的输入缓冲区
    fn dequeue_input_buffer(&mut self) -> Result<Option<usize>, CodecError>;

    /// 访问输入缓冲区的内容
    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8], CodecError>;

    /// 提交已填充的输入缓冲区
    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: u32,
    ) -> Result<(), CodecError>;

    /// 取一个已解码的输出
    fn dequeue_output_buffer(&mut self) -> Result<OutputStatus, CodecError>;

    /// 访问输出缓冲区的内容（输出到平面时可能为空）
    fn output_buffer(&self, index: usize) -> Result<&[u8], CodecError>;

    /// 归还输出缓冲区，`render` 为 true 时先送显到输出平面
    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<(), CodecError>;

    /// 原地替换输出平面
    fn set_output_surface(&mut self, surface: Arc<dyn VideoSurface>) -> Result<(), CodecError>;

    /// 丢弃所有在途的输入输出
    fn flush(&mut self) -> Result<(), CodecError>;

    /// 释放会话，此后任何调用都返回 `IllegalState`
    fn release(&mut self);
}

/// 解码会话工厂
pub trait DecoderFactory: Send + Sync {
    fn create_decoder(&self, config: &DecoderConfiguration) -> Result<Box<dyn Decoder>, CodecError>;
}
