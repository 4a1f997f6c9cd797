use crate::core::{Format, Result};
use crate::player::audio_renderer::{AudioSink, AudioSinkFactory};
use crate::player::codec::{
    BufferInfo, CodecError, Decoder, DecoderConfiguration, DecoderFactory, OutputStatus, VideoSurface,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单个输入缓冲区的容量
const INPUT_BUFFER_CAPACITY: usize = 64 * 1024;

struct OutputSlot {
    data: Vec<u8>,
    info: BufferInfo,
}

/// 直通解码器：输入原样成为输出
///
/// 输入输出共用一组有限的缓冲区索引，所有索引都被输出占用时
/// `dequeue_input_buffer` 返回 None，形成背压
pub struct PassthroughDecoder {
    mime: String,
    surface: Option<Arc<dyn VideoSurface>>,
    input_slots: Vec<Vec<u8>>,
    outputs: Vec<Option<OutputSlot>>,
    ready: VecDeque<usize>,
    released: bool,
}

impl PassthroughDecoder {
    pub fn new(config: &DecoderConfiguration, slots: usize) -> Self {
        let slots = slots.max(1);
        Self {
            mime: config.mime.clone(),
            surface: config.surface.clone(),
            input_slots: vec![vec![0; INPUT_BUFFER_CAPACITY]; slots],
            outputs: (0..slots).map(|_| None).collect(),
            ready: VecDeque::new(),
            released: false,
        }
    }

    fn check_alive(&self) -> std::result::Result<(), CodecError> {
        if self.released {
            Err(CodecError::IllegalState(format!("{} 解码器已释放", self.mime)))
        } else {
            Ok(())
        }
    }
}

impl Decoder for PassthroughDecoder {
    fn dequeue_input_buffer(&mut self) -> std::result::Result<Option<usize>, CodecError> {
        self.check_alive()?;
        Ok(self.outputs.iter().position(Option::is_none))
    }

    fn input_buffer(&mut self, index: usize) -> std::result::Result<&mut [u8], CodecError> {
        self.check_alive()?;
        self.input_slots
            .get_mut(index)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| CodecError::Codec(format!("无效的输入缓冲区: {}", index)))
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: u32,
    ) -> std::result::Result<(), CodecError> {
        self.check_alive()?;
        let (Some(input), Some(None)) = (self.input_slots.get(index), self.outputs.get(index)) else {
            return Err(CodecError::Codec(format!("输入缓冲区不可用: {}", index)));
        };
        let size = size.min(input.len());
        let slot = OutputSlot {
            data: input[..size].to_vec(),
            info: BufferInfo {
                offset: 0,
                size,
                presentation_time_us,
                flags,
            },
        };
        self.outputs[index] = Some(slot);
        self.ready.push_back(index);
        Ok(())
    }

    fn dequeue_output_buffer(&mut self) -> std::result::Result<OutputStatus, CodecError> {
        self.check_alive()?;
        let next = self
            .ready
            .pop_front()
            .and_then(|index| self.outputs[index].as_ref().map(|slot| (index, slot.info)));
        Ok(match next {
            Some((index, info)) => OutputStatus::Buffer { index, info },
            None => OutputStatus::TryAgainLater,
        })
    }

    fn output_buffer(&self, index: usize) -> std::result::Result<&[u8], CodecError> {
        self.check_alive()?;
        match self.outputs.get(index) {
            Some(Some(slot)) => Ok(&slot.data),
            _ => Err(CodecError::Codec(format!("无效的输出缓冲区: {}", index))),
        }
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> std::result::Result<(), CodecError> {
        self.check_alive()?;
        let slot = self
            .outputs
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| CodecError::Codec(format!("无效的输出缓冲区: {}", index)))?;
        self.ready.retain(|&ready| ready != index);
        if render {
            if let Some(surface) = &self.surface {
                surface.render_frame(slot.info.presentation_time_us);
            }
        }
        Ok(())
    }

    fn set_output_surface(&mut self, surface: Arc<dyn VideoSurface>) -> std::result::Result<(), CodecError> {
        self.check_alive()?;
        self.surface = Some(surface);
        Ok(())
    }

    fn flush(&mut self) -> std::result::Result<(), CodecError> {
        self.check_alive()?;
        self.outputs.iter_mut().for_each(|slot| *slot = None);
        self.ready.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.outputs.clear();
        self.ready.clear();
        self.surface = None;
    }
}

/// 直通解码器工厂
pub struct PassthroughDecoderFactory {
    slots: usize,
    created: AtomicUsize,
}

impl PassthroughDecoderFactory {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            created: AtomicUsize::new(0),
        }
    }

    /// 已创建的会话数
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for PassthroughDecoderFactory {
    fn create_decoder(&self, config: &DecoderConfiguration) -> std::result::Result<Box<dyn Decoder>, CodecError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(PassthroughDecoder::new(config, self.slots)))
    }
}

/// 按实时速率消耗数据的音频设备
pub struct ClockedAudioSink {
    bytes_per_second: u64,
    capacity_bytes: usize,
    buffered_bytes: usize,
    playing: bool,
    last_drain: Instant,
    written_total: Arc<AtomicU64>,
}

impl ClockedAudioSink {
    pub fn new(sample_rate: u32, channels: u16, buffer_ms: u64) -> Self {
        // 16 位 PCM
        let bytes_per_second = sample_rate as u64 * channels as u64 * 2;
        Self {
            bytes_per_second,
            capacity_bytes: (bytes_per_second * buffer_ms / 1000).max(1) as usize,
            buffered_bytes: 0,
            playing: false,
            last_drain: Instant::now(),
            written_total: Arc::new(AtomicU64::new(0)),
        }
    }

    fn consumed_since_drain(&self) -> (usize, Duration) {
        if !self.playing {
            return (0, Duration::ZERO);
        }
        let elapsed = self.last_drain.elapsed();
        let consumed = elapsed.as_micros() as u64 * self.bytes_per_second / 1_000_000;
        (consumed as usize, elapsed)
    }

    fn drain(&mut self) {
        let (consumed, _) = self.consumed_since_drain();
        if consumed > 0 || !self.playing {
            self.buffered_bytes = self.buffered_bytes.saturating_sub(consumed);
            self.last_drain = Instant::now();
        }
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.saturating_sub(self.consumed_since_drain().0)
    }
}

impl AudioSink for ClockedAudioSink {
    fn write_non_blocking(&mut self, data: &[u8]) -> Result<usize> {
        self.drain();
        let accepted = data.len().min(self.capacity_bytes.saturating_sub(self.buffered_bytes));
        self.buffered_bytes += accepted;
        self.written_total.fetch_add(accepted as u64, Ordering::Relaxed);
        Ok(accepted)
    }

    fn play(&mut self) {
        if !self.playing {
            self.drain();
            self.playing = true;
            self.last_drain = Instant::now();
        }
    }

    fn pause(&mut self) {
        self.drain();
        self.playing = false;
    }

    fn flush(&mut self) {
        self.buffered_bytes = 0;
        self.last_drain = Instant::now();
    }

    fn stop(&mut self) {
        self.playing = false;
        self.flush();
    }

    fn latency_us(&self) -> i64 {
        (self.buffered_bytes() as u64 * 1_000_000 / self.bytes_per_second.max(1)) as i64
    }

    fn release(&mut self) {
        self.stop();
    }
}

/// 创建 [`ClockedAudioSink`]，统计写入的总字节数
pub struct ClockedAudioSinkFactory {
    buffer_ms: u64,
    created: AtomicUsize,
    written_total: Arc<AtomicU64>,
}

impl ClockedAudioSinkFactory {
    pub fn new(buffer_ms: u64) -> Self {
        Self {
            buffer_ms,
            created: AtomicUsize::new(0),
            written_total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn written_bytes(&self) -> u64 {
        self.written_total.load(Ordering::Relaxed)
    }
}

impl AudioSinkFactory for ClockedAudioSinkFactory {
    fn create_sink(&self, format: &Format) -> Result<Box<dyn AudioSink>> {
        let sample_rate = if format.sample_rate > 0 { format.sample_rate as u32 } else { 48_000 };
        let channels = if format.channel_count > 0 { format.channel_count as u16 } else { 2 };
        let mut sink = ClockedAudioSink::new(sample_rate, channels, self.buffer_ms);
        sink.written_total = self.written_total.clone();
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(sink))
    }
}

/// 统计送显帧数的输出平面
#[derive(Debug)]
pub struct CountingSurface {
    frames: AtomicU64,
    last_presentation_time_us: AtomicI64,
}

impl CountingSurface {
    pub fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            last_presentation_time_us: AtomicI64::new(-1),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn last_presentation_time_us(&self) -> i64 {
        self.last_presentation_time_us.load(Ordering::SeqCst)
    }
}

impl Default for CountingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSurface for CountingSurface {
    fn render_frame(&self, presentation_time_us: i64) {
        self.last_presentation_time_us
            .store(presentation_time_us, Ordering::SeqCst);
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}
