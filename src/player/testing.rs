// 单元测试共用的数据源与样本

use crate::core::{Format, MediaItem, Result, SampleData, TrackType, SAMPLE_FLAG_SYNC};
use crate::player::media_source::{MediaSource, ReceiverSet, Sample, SeekMode};
use std::collections::HashMap;

/// 只记录轨道绑定关系的数据源
#[derive(Default)]
pub(crate) struct RecordingSource {
    bindings: HashMap<usize, TrackType>,
}

impl RecordingSource {
    pub(crate) fn is_bound(&self, track_index: usize) -> bool {
        self.bindings.contains_key(&track_index)
    }
}

impl MediaSource for RecordingSource {
    fn set_data_source(&mut self, _item: &MediaItem, _headers: Option<&HashMap<String, String>>) -> Result<()> {
        Ok(())
    }

    fn formats(&self) -> &[Format] {
        &[]
    }

    fn bind_track(&mut self, format: &Format, receiver: TrackType) {
        self.bindings.insert(format.track_index, receiver);
    }

    fn unbind_track(&mut self, format: &Format, _receiver: TrackType) {
        self.bindings.remove(&format.track_index);
    }

    fn send_data(&mut self, _receivers: &mut dyn ReceiverSet) -> Result<bool> {
        Ok(false)
    }

    fn seek_to(&mut self, position_us: i64, _mode: SeekMode) -> i64 {
        position_us
    }

    fn has_cache_reached_end_of_stream(&self) -> bool {
        true
    }

    fn duration_us(&self) -> i64 {
        -1
    }

    fn cache_duration_us(&self) -> i64 {
        -1
    }

    fn release(&mut self) {}
}

/// 固定内容的样本
pub(crate) struct TestSample {
    time_us: i64,
    data: Vec<u8>,
}

impl TestSample {
    pub(crate) fn new(time_us: i64, size: usize) -> Self {
        Self {
            time_us,
            data: vec![0x5a; size],
        }
    }
}

impl Sample for TestSample {
    fn read_data(&mut self, _format: &Format, buffer: &mut [u8]) -> Result<SampleData> {
        buffer[..self.data.len()].copy_from_slice(&self.data);
        Ok(SampleData {
            size: self.data.len() as i32,
            sample_time_us: self.time_us,
            flags: SAMPLE_FLAG_SYNC,
            end_of_stream: false,
        })
    }
}
