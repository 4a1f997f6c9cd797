use crate::core::{
    log_ctx, Format, MediaFormat, MediaItem, PlayerError, Result, SampleData, TrackType,
    KEY_CHANNEL_COUNT, KEY_DURATION, KEY_FRAME_RATE, KEY_HEIGHT, KEY_MIME, KEY_SAMPLE_RATE,
    KEY_WIDTH, SAMPLE_FLAG_SYNC,
};
use crate::player::media_source::{MediaSource, ReceiverSet, Sample, SeekMode};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// seek 之后期望的最少缓存（微秒）
const SEEK_SETTLE_CACHE_US: i64 = 500_000;
/// seek 之后等待缓存的最多次数
const SEEK_SETTLE_RETRIES: u32 = 10;
const SEEK_SETTLE_INTERVAL: Duration = Duration::from_millis(10);

/// 未设置缓存时长覆盖值
const NO_CACHE_OVERRIDE: i64 = i64::MIN;

/// 已解复用的一个样本
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub track_index: usize,
    pub time_us: i64,
    pub flags: u32,
    pub data: Vec<u8>,
}

impl EncodedSample {
    pub fn is_sync(&self) -> bool {
        self.flags & SAMPLE_FLAG_SYNC != 0
    }
}

/// 一个完整的内存媒体：轨道描述 + 按时间交错排列的样本
#[derive(Debug, Clone, Default)]
pub struct MemoryMedia {
    pub formats: Vec<MediaFormat>,
    pub samples: Vec<EncodedSample>,
}

impl MemoryMedia {
    pub fn new(formats: Vec<MediaFormat>, mut samples: Vec<EncodedSample>) -> Self {
        samples.sort_by_key(|s| (s.time_us, s.track_index));
        Self { formats, samples }
    }

    /// 合成音视频媒体：640x360@30fps 视频（每秒一个关键帧）+ 48kHz 立体声音频（20ms 一帧）
    pub fn synthetic(duration_us: i64) -> Self {
        Self::generate(duration_us, true, true)
    }

    pub fn synthetic_video_only(duration_us: i64) -> Self {
        Self::generate(duration_us, true, false)
    }

    pub fn synthetic_audio_only(duration_us: i64) -> Self {
        Self::generate(duration_us, false, true)
    }

    fn generate(duration_us: i64, video: bool, audio: bool) -> Self {
        let mut formats = Vec::new();
        let mut samples = Vec::new();

        if video {
            let track_index = formats.len();
            formats.push(track_format(&[
                (KEY_MIME, "video/avc".to_string()),
                (KEY_WIDTH, "640".to_string()),
                (KEY_HEIGHT, "360".to_string()),
                (KEY_FRAME_RATE, "30".to_string()),
                (KEY_DURATION, duration_us.to_string()),
            ]));
            let frame_time = |frame: i64| frame * 1_000_000 / 30;
            let mut frame = 0i64;
            while frame_time(frame) < duration_us {
                let keyframe = frame % 30 == 0;
                samples.push(EncodedSample {
                    track_index,
                    time_us: frame_time(frame),
                    flags: if keyframe { SAMPLE_FLAG_SYNC } else { 0 },
                    data: vec![(frame % 251) as u8; if keyframe { 8192 } else { 2048 }],
                });
                frame += 1;
            }
        }

        if audio {
            let track_index = formats.len();
            formats.push(track_format(&[
                (KEY_MIME, "audio/mp4a-latm".to_string()),
                (KEY_SAMPLE_RATE, "48000".to_string()),
                (KEY_CHANNEL_COUNT, "2".to_string()),
                (KEY_DURATION, duration_us.to_string()),
            ]));
            // 20ms * 48000Hz * 2 声道 * 2 字节
            let frame_us = 20_000;
            let mut frame = 0i64;
            while frame * frame_us < duration_us {
                samples.push(EncodedSample {
                    track_index,
                    time_us: frame * frame_us,
                    flags: SAMPLE_FLAG_SYNC,
                    data: vec![0; 3840],
                });
                frame += 1;
            }
        }

        Self::new(formats, samples)
    }
}

fn track_format(entries: &[(&str, String)]) -> MediaFormat {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// 从外部模拟网络与缓存状况
#[derive(Debug)]
pub struct SourceControl {
    network_available: AtomicBool,
    end_of_stream: AtomicBool,
    cache_override_us: AtomicI64,
    fail_reads: AtomicBool,
    seeks: Mutex<Vec<i64>>,
    request_headers: Mutex<Option<HashMap<String, String>>>,
}

impl SourceControl {
    fn new() -> Self {
        Self {
            network_available: AtomicBool::new(true),
            end_of_stream: AtomicBool::new(true),
            cache_override_us: AtomicI64::new(NO_CACHE_OVERRIDE),
            fail_reads: AtomicBool::new(false),
            seeks: Mutex::new(Vec::new()),
            request_headers: Mutex::new(None),
        }
    }

    pub fn set_network_available(&self, available: bool) {
        self.network_available.store(available, Ordering::SeqCst);
    }

    pub fn network_available(&self) -> bool {
        self.network_available.load(Ordering::SeqCst)
    }

    /// 内存媒体默认已经全部缓存
    pub fn set_end_of_stream(&self, reached: bool) {
        self.end_of_stream.store(reached, Ordering::SeqCst);
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::SeqCst)
    }

    /// 固定报告的缓存时长，None 表示按读取游标计算
    pub fn set_cache_duration_us(&self, cache_us: Option<i64>) {
        self.cache_override_us
            .store(cache_us.unwrap_or(NO_CACHE_OVERRIDE), Ordering::SeqCst);
    }

    pub fn cache_duration_override_us(&self) -> Option<i64> {
        match self.cache_override_us.load(Ordering::SeqCst) {
            NO_CACHE_OVERRIDE => None,
            cache_us => Some(cache_us),
        }
    }

    /// 让后续读取返回 I/O 错误
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) -> bool {
        self.fail_reads.load(Ordering::SeqCst)
    }

    /// 收到过的 seek 请求（微秒）
    pub fn seeks(&self) -> Vec<i64> {
        self.seeks.lock().clone()
    }

    /// 最近一次打开时附带的请求头
    pub fn request_headers(&self) -> Option<HashMap<String, String>> {
        self.request_headers.lock().clone()
    }
}

struct MemorySample<'a> {
    sample: &'a EncodedSample,
}

impl Sample for MemorySample<'_> {
    fn read_data(&mut self, format: &Format, buffer: &mut [u8]) -> Result<SampleData> {
        let size = self.sample.data.len();
        if size > buffer.len() {
            return Err(PlayerError::Other(format!(
                "样本过大: {} > {} ({})",
                size,
                buffer.len(),
                format
            )));
        }
        buffer[..size].copy_from_slice(&self.sample.data);
        Ok(SampleData {
            size: size as i32,
            sample_time_us: self.sample.time_us,
            flags: self.sample.flags,
            end_of_stream: false,
        })
    }
}

struct EndOfStreamSample {
    duration_us: i64,
}

impl Sample for EndOfStreamSample {
    fn read_data(&mut self, _format: &Format, _buffer: &mut [u8]) -> Result<SampleData> {
        Ok(SampleData::end_of_stream(self.duration_us))
    }
}

/// 内存数据源：按 URL 注册预先解复用好的媒体
pub struct MemoryMediaSource {
    library: HashMap<String, Arc<MemoryMedia>>,
    media: Option<Arc<MemoryMedia>>,
    formats: Vec<Format>,
    bindings: HashMap<usize, TrackType>,
    cursor: usize,
    duration_us: i64,
    control: Arc<SourceControl>,
}

impl MemoryMediaSource {
    pub fn new() -> Self {
        Self {
            library: HashMap::new(),
            media: None,
            formats: Vec::new(),
            bindings: HashMap::new(),
            cursor: 0,
            duration_us: -1,
            control: Arc::new(SourceControl::new()),
        }
    }

    pub fn with_media(mut self, url: &str, media: MemoryMedia) -> Self {
        self.insert_media(url, media);
        self
    }

    pub fn insert_media(&mut self, url: &str, media: MemoryMedia) {
        self.library.insert(url.to_string(), Arc::new(media));
    }

    pub fn control(&self) -> Arc<SourceControl> {
        self.control.clone()
    }

    fn reset(&mut self) {
        self.media = None;
        self.formats.clear();
        self.bindings.clear();
        self.cursor = 0;
        self.duration_us = -1;
    }

    /// 按轨道类型去重后的已绑定接收者
    fn bound_receivers(&self) -> Vec<TrackType> {
        let mut receivers: Vec<TrackType> = Vec::new();
        for receiver in self.bindings.values() {
            if !receivers.contains(receiver) {
                receivers.push(*receiver);
            }
        }
        receivers
    }

    fn send_end_of_stream(&mut self, receivers: &mut dyn ReceiverSet) -> Result<()> {
        for track_type in self.bound_receivers() {
            if let Some(receiver) = receivers.receiver(track_type) {
                receiver.receive_data(&mut EndOfStreamSample {
                    duration_us: self.duration_us,
                })?;
            }
        }
        Ok(())
    }

    /// 选择 seek 参考的同步点：优先使用已绑定的视频轨道
    fn sync_times(&self, media: &MemoryMedia) -> Vec<i64> {
        let video_track = self
            .bindings
            .iter()
            .find(|(_, receiver)| **receiver == TrackType::Video)
            .map(|(track, _)| *track);
        let reference = video_track.or_else(|| self.bindings.keys().min().copied());
        media
            .samples
            .iter()
            .filter(|s| s.is_sync() && reference.map_or(true, |track| s.track_index == track))
            .map(|s| s.time_us)
            .collect()
    }

    fn settle_after_seek(&self) {
        for _ in 0..SEEK_SETTLE_RETRIES {
            if self.has_cache_reached_end_of_stream() || self.cache_duration_us() >= SEEK_SETTLE_CACHE_US {
                return;
            }
            thread::sleep(SEEK_SETTLE_INTERVAL);
        }
        debug!("{} ⏳ seek 后缓存仍不足: {}us", log_ctx(), self.cache_duration_us());
    }
}

impl Default for MemoryMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

fn select_sync_time(times: &[i64], position_us: i64, mode: SeekMode) -> Option<i64> {
    let first = *times.first()?;
    let last = *times.last()?;
    let previous = times.iter().rev().find(|&&t| t <= position_us).copied();
    let next = times.iter().find(|&&t| t >= position_us).copied();
    Some(match mode {
        SeekMode::PreviousSync => previous.unwrap_or(first),
        SeekMode::NextSync => next.unwrap_or(last),
        SeekMode::ClosestSync => match (previous, next) {
            (Some(p), Some(n)) => {
                if position_us - p <= n - position_us {
                    p
                } else {
                    n
                }
            }
            (Some(p), None) => p,
            (None, Some(n)) => n,
            (None, None) => first,
        },
    })
}

impl MediaSource for MemoryMediaSource {
    fn set_data_source(
        &mut self,
        item: &MediaItem,
        request_headers: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        self.reset();
        *self.control.request_headers.lock() = request_headers.cloned();

        let location = item.location();
        if !item.is_local() && !self.control.network_available() {
            warn!("{} 📡 网络不可达: {}", log_ctx(), location);
            return Err(PlayerError::NetworkUnreachable(location));
        }
        let media = self
            .library
            .get(&location)
            .cloned()
            .ok_or_else(|| PlayerError::OpenError(location.clone()))?;

        self.formats = media
            .formats
            .iter()
            .enumerate()
            .map(|(index, raw)| Format::parse(index, raw))
            .collect();
        self.duration_us = self
            .formats
            .iter()
            .map(|f| f.duration_us)
            .find(|&d| d >= 0)
            .unwrap_or(-1);
        info!(
            "{} 📂 打开内存媒体: {} ({} 条轨道, {} 个样本, 时长 {}us)",
            log_ctx(),
            location,
            self.formats.len(),
            media.samples.len(),
            self.duration_us
        );
        for format in &self.formats {
            debug!("{} 🎼 轨道 {}: {}", log_ctx(), format.track_index, format);
        }
        self.media = Some(media);
        Ok(())
    }

    fn formats(&self) -> &[Format] {
        &self.formats
    }

    fn bind_track(&mut self, format: &Format, receiver: TrackType) {
        debug!("{} 🔗 绑定轨道 {} -> {:?}", log_ctx(), format.track_index, receiver);
        self.bindings.insert(format.track_index, receiver);
    }

    fn unbind_track(&mut self, format: &Format, receiver: TrackType) {
        if self.bindings.get(&format.track_index) == Some(&receiver) {
            debug!("{} ✂️ 解绑轨道 {}", log_ctx(), format.track_index);
            self.bindings.remove(&format.track_index);
        }
    }

    fn send_data(&mut self, receivers: &mut dyn ReceiverSet) -> Result<bool> {
        let Some(media) = self.media.clone() else {
            return Ok(false);
        };
        if self.control.fail_reads() {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "读取样本失败").into());
        }
        let Some(sample) = media.samples.get(self.cursor) else {
            self.send_end_of_stream(receivers)?;
            return Ok(false);
        };

        let receiver = self
            .bindings
            .get(&sample.track_index)
            .and_then(|&track_type| receivers.receiver(track_type));
        let Some(receiver) = receiver else {
            // 没有接收者的轨道直接跳过
            self.cursor += 1;
            return Ok(true);
        };

        let consumed = receiver.receive_data(&mut MemorySample { sample })?;
        if consumed {
            self.cursor += 1;
        }
        Ok(consumed)
    }

    fn seek_to(&mut self, position_us: i64, mode: SeekMode) -> i64 {
        self.control.seeks.lock().push(position_us);
        let Some(media) = self.media.clone() else {
            return position_us;
        };

        let target_us = select_sync_time(&self.sync_times(&media), position_us, mode).unwrap_or(position_us);
        self.cursor = media.samples.partition_point(|s| s.time_us < target_us);
        debug!(
            "{} 🎯 seek {}us -> 同步点 {}us (游标 {})",
            log_ctx(),
            position_us,
            target_us,
            self.cursor
        );
        self.settle_after_seek();

        match media.samples.get(self.cursor) {
            Some(sample) => sample.time_us,
            None => self.duration_us.max(target_us),
        }
    }

    fn has_cache_reached_end_of_stream(&self) -> bool {
        self.media.is_some() && self.control.end_of_stream()
    }

    fn duration_us(&self) -> i64 {
        self.duration_us
    }

    fn cache_duration_us(&self) -> i64 {
        let Some(media) = self.media.as_ref() else {
            return -1;
        };
        if let Some(cache_us) = self.control.cache_duration_override_us() {
            return cache_us;
        }
        let end_us = if self.duration_us >= 0 {
            self.duration_us
        } else {
            media.samples.last().map_or(0, |s| s.time_us)
        };
        match media.samples.get(self.cursor) {
            Some(sample) => (end_us - sample.time_us).max(0),
            None => 0,
        }
    }

    fn release(&mut self) {
        if self.media.is_some() {
            info!("{} 🧹 释放内存媒体", log_ctx());
        }
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::media_source::SampleReceiver;

    /// 记录收到的样本时间，`capacity` 个之后拒收
    struct Collector {
        times: Vec<i64>,
        end_of_stream: usize,
        capacity: usize,
    }

    impl SampleReceiver for Collector {
        fn receive_data(&mut self, sample: &mut dyn Sample) -> Result<bool> {
            if self.times.len() >= self.capacity {
                return Ok(false);
            }
            let mut buffer = vec![0; 16 * 1024];
            let data = sample.read_data(&Format::parse(0, &MediaFormat::new()), &mut buffer)?;
            if data.end_of_stream {
                self.end_of_stream += 1;
                return Ok(false);
            }
            self.times.push(data.sample_time_us);
            Ok(true)
        }
    }

    struct Receivers {
        video: Collector,
        audio: Collector,
    }

    impl Receivers {
        fn new(capacity: usize) -> Self {
            let collector = || Collector {
                times: Vec::new(),
                end_of_stream: 0,
                capacity,
            };
            Self {
                video: collector(),
                audio: collector(),
            }
        }
    }

    impl ReceiverSet for Receivers {
        fn receiver(&mut self, track_type: TrackType) -> Option<&mut dyn SampleReceiver> {
            match track_type {
                TrackType::Video => Some(&mut self.video),
                TrackType::Audio => Some(&mut self.audio),
                TrackType::None => None,
            }
        }
    }

    fn open(url: &str, media: MemoryMedia) -> MemoryMediaSource {
        let mut source = MemoryMediaSource::new().with_media(url, media);
        source.set_data_source(&MediaItem::from_url(url), None).unwrap();
        source
    }

    fn bind_all(source: &mut MemoryMediaSource) {
        for format in source.formats().to_vec() {
            let receiver = if format.is_video() { TrackType::Video } else { TrackType::Audio };
            source.bind_track(&format, receiver);
        }
    }

    #[test]
    fn test_open_errors() {
        let mut source = MemoryMediaSource::new()
            .with_media("https://cdn.example.com/a.m3u8", MemoryMedia::synthetic(1_000_000));
        let err = source
            .set_data_source(&MediaItem::from_url("/missing.mp4"), None)
            .unwrap_err();
        assert!(matches!(err, PlayerError::OpenError(_)));

        source.control().set_network_available(false);
        let err = source
            .set_data_source(&MediaItem::from_url("https://cdn.example.com/a.m3u8"), None)
            .unwrap_err();
        assert!(matches!(err, PlayerError::NetworkUnreachable(_)));
        assert_eq!(source.duration_us(), -1);
        assert_eq!(source.cache_duration_us(), -1);
    }

    #[test]
    fn test_open_records_formats_and_headers() {
        let mut source = MemoryMediaSource::new().with_media("/demo.mp4", MemoryMedia::synthetic(2_000_000));
        let headers = HashMap::from([("Referer".to_string(), "https://example.com".to_string())]);
        source
            .set_data_source(&MediaItem::from_url("/demo.mp4"), Some(&headers))
            .unwrap();
        assert_eq!(source.formats().len(), 2);
        assert!(source.formats()[0].is_video());
        assert!(source.formats()[1].is_audio());
        assert_eq!(source.duration_us(), 2_000_000);
        assert_eq!(source.control().request_headers(), Some(headers));
    }

    #[test]
    fn test_unbound_tracks_are_skipped() {
        let mut source = open("/video.mp4", MemoryMedia::synthetic(150_000));
        let video = source.formats()[0].clone();
        source.bind_track(&video, TrackType::Video);

        let mut receivers = Receivers::new(usize::MAX);
        while source.send_data(&mut receivers).unwrap() {}
        assert_eq!(receivers.video.times.len(), 5);
        assert!(receivers.audio.times.is_empty());
        // 到达末尾后只向已绑定的接收者发送流结束
        assert_eq!(receivers.video.end_of_stream, 1);
        assert_eq!(receivers.audio.end_of_stream, 0);
        assert_eq!(source.cache_duration_us(), 0);
    }

    #[test]
    fn test_refused_sample_is_retried() {
        let mut source = open("/audio.mp4", MemoryMedia::synthetic_audio_only(200_000));
        bind_all(&mut source);
        let mut receivers = Receivers::new(3);
        while source.send_data(&mut receivers).unwrap() {}
        assert_eq!(receivers.audio.times, vec![0, 20_000, 40_000]);

        receivers.audio.capacity = 4;
        assert!(source.send_data(&mut receivers).unwrap());
        assert_eq!(receivers.audio.times.last(), Some(&60_000));
    }

    #[test]
    fn test_seek_uses_video_sync_samples() {
        let mut source = open("/av.mp4", MemoryMedia::synthetic(5_000_000));
        bind_all(&mut source);

        assert_eq!(source.seek_to(1_400_000, SeekMode::ClosestSync), 1_000_000);
        assert_eq!(source.seek_to(1_600_000, SeekMode::ClosestSync), 2_000_000);
        assert_eq!(source.seek_to(1_900_000, SeekMode::PreviousSync), 1_000_000);
        assert_eq!(source.seek_to(1_100_000, SeekMode::NextSync), 2_000_000);
        assert_eq!(
            source.control().seeks(),
            vec![1_400_000, 1_600_000, 1_900_000, 1_100_000]
        );

        let mut receivers = Receivers::new(usize::MAX);
        assert!(source.send_data(&mut receivers).unwrap());
        assert_eq!(receivers.video.times, vec![2_000_000]);
        assert_eq!(source.cache_duration_us(), 3_000_000);
    }

    #[test]
    fn test_failed_read_is_io_error() {
        let mut source = open("/av.mp4", MemoryMedia::synthetic(1_000_000));
        bind_all(&mut source);
        source.control().set_fail_reads(true);
        let err = source.send_data(&mut Receivers::new(usize::MAX)).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_cache_override_and_release() {
        let mut source = open("/av.mp4", MemoryMedia::synthetic(1_000_000));
        let control = source.control();
        assert!(source.has_cache_reached_end_of_stream());
        control.set_end_of_stream(false);
        control.set_cache_duration_us(Some(0));
        assert!(!source.has_cache_reached_end_of_stream());
        assert_eq!(source.cache_duration_us(), 0);

        source.release();
        assert!(source.formats().is_empty());
        assert!(!source.has_cache_reached_end_of_stream());
        assert!(!source.send_data(&mut Receivers::new(1)).unwrap());
    }
}
