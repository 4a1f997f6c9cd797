use crate::core::{Format, MediaItem, Result, SampleData, TrackType};
use std::collections::HashMap;

/// Seek 模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// 目标位置之前（含）最近的同步点
    PreviousSync,
    /// 目标位置之后（含）最近的同步点
    NextSync,
    /// 距离目标位置最近的同步点
    ClosestSync,
}

/// 一次拉取中交给接收者的样本，只能读取一次
pub trait Sample {
    /// 将样本数据写入 `buffer`，返回样本描述
    fn read_data(&mut self, format: &Format, buffer: &mut [u8]) -> Result<SampleData>;
}

/// 样本接收者（解码渲染单元）
pub trait SampleReceiver {
    /// 接收一个样本，返回 true 表示样本已被消费，数据源可以前进
    fn receive_data(&mut self, sample: &mut dyn Sample) -> Result<bool>;
}

/// 按轨道类型查找接收者
pub trait ReceiverSet {
    fn receiver(&mut self, track_type: TrackType) -> Option<&mut dyn SampleReceiver>;
}

/// 解复用数据源
///
/// 只在工作线程上被调用
pub trait MediaSource: Send {
    /// 打开媒体项，可能阻塞
    fn set_data_source(
        &mut self,
        item: &MediaItem,
        request_headers: Option<&HashMap<String, String>>,
    ) -> Result<()>;

    /// 当前媒体的全部轨道
    fn formats(&self) -> &[Format];

    /// 开始向 `receiver` 投递该轨道的样本
    fn bind_track(&mut self, format: &Format, receiver: TrackType);

    /// 停止投递该轨道的样本
    fn unbind_track(&mut self, format: &Format, receiver: TrackType);

    /// 拉取一个样本交给对应的接收者，返回是否有进展
    fn send_data(&mut self, receivers: &mut dyn ReceiverSet) -> Result<bool>;

    /// 跳转并清空读取游标，返回实际落点（微秒）
    fn seek_to(&mut self, position_us: i64, mode: SeekMode) -> i64;

    /// 是否已经缓存到媒体流的末尾
    fn has_cache_reached_end_of_stream(&self) -> bool;

    /// 媒体总时长，未知为 -1
    fn duration_us(&self) -> i64;

    /// 已缓存时长，不可用为 -1
    fn cache_duration_us(&self) -> i64;

    fn release(&mut self);
}
