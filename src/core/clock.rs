use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 时钟的渲染结束标记
pub const END_OF_RENDER: i64 = i64::MIN;

/// 与渲染器相关的同步时钟
pub trait MediaClock: Send + Sync {
    /// 上一次渲染成功的时间戳（微秒），不保证有序
    ///
    /// 返回负值表示位置无效，返回 [`END_OF_RENDER`] 表示渲染已到末尾
    fn position_us(&self, duration_us: i64) -> i64;

    /// 渲染器所渲染轨道的时长，未知为 -1
    fn duration_us(&self) -> i64;
}

/// 渲染器与其时钟共享的状态
///
/// 只由工作线程写入，使用原子量以便时钟对象可以跨线程持有
#[derive(Debug)]
pub struct ClockState {
    last_position_us: AtomicI64,
    duration_us: AtomicI64,
    output_latency_us: AtomicI64,
    has_output: AtomicBool,
}

impl ClockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_position_us: AtomicI64::new(-1),
            duration_us: AtomicI64::new(-1),
            output_latency_us: AtomicI64::new(0),
            has_output: AtomicBool::new(false),
        })
    }

    pub fn last_position_us(&self) -> i64 {
        self.last_position_us.load(Ordering::Acquire)
    }

    pub fn set_last_position_us(&self, position_us: i64) {
        self.last_position_us.store(position_us, Ordering::Release);
    }

    pub fn duration_us(&self) -> i64 {
        self.duration_us.load(Ordering::Acquire)
    }

    pub fn set_duration_us(&self, duration_us: i64) {
        self.duration_us.store(duration_us, Ordering::Release);
    }

    pub fn output_latency_us(&self) -> i64 {
        self.output_latency_us.load(Ordering::Acquire)
    }

    pub fn set_output_latency_us(&self, latency_us: i64) {
        self.output_latency_us.store(latency_us.max(0), Ordering::Release);
    }

    pub fn has_output(&self) -> bool {
        self.has_output.load(Ordering::Acquire)
    }

    pub fn set_has_output(&self, has_output: bool) {
        self.has_output.store(has_output, Ordering::Release);
    }
}

/// 视频时钟：直接报告最后一帧的时间戳
pub struct VideoClock {
    state: Arc<ClockState>,
}

impl VideoClock {
    pub fn new(state: Arc<ClockState>) -> Self {
        Self { state }
    }
}

impl MediaClock for VideoClock {
    fn position_us(&self, _duration_us: i64) -> i64 {
        self.state.last_position_us()
    }

    fn duration_us(&self) -> i64 {
        self.state.duration_us()
    }
}

/// 音频时钟（主时钟）：最后写入设备的时间戳减去设备输出延迟
pub struct AudioClock {
    state: Arc<ClockState>,
}

impl AudioClock {
    pub fn new(state: Arc<ClockState>) -> Self {
        Self { state }
    }
}

impl MediaClock for AudioClock {
    fn position_us(&self, duration_us: i64) -> i64 {
        if !self.state.has_output() {
            return -1;
        }
        let last = self.state.last_position_us();
        if last == END_OF_RENDER || (duration_us >= 0 && last >= duration_us) {
            END_OF_RENDER
        } else if last > 0 {
            (last - self.state.output_latency_us()).max(0)
        } else {
            last
        }
    }

    fn duration_us(&self) -> i64 {
        self.state.duration_us()
    }
}

/// 墙上时钟 - 记录开始渲染的基准时刻，用来外推播放位置
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    epoch: Instant,
    start_render_ms: i64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            start_render_ms: 0,
        }
    }

    /// 自创建以来经过的毫秒数（单调）
    pub fn elapsed_realtime_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    /// 从 `position_us` 开始计时
    pub fn start_at(&mut self, position_us: i64) {
        self.start_render_ms = self.elapsed_realtime_ms() - position_us / 1000;
    }

    /// 按墙上时钟外推的位置（微秒），`delay_ms` 为下一次渲染前的等待时间
    pub fn wall_position_us(&self, delay_ms: i64, duration_us: i64) -> i64 {
        let position = (self.elapsed_realtime_ms() - self.start_render_ms) * 1000 + delay_ms;
        clamp_to_duration(position, duration_us)
    }

    /// 距离下一次渲染的等待时间：`max(1, interval - elapsed)`
    pub fn next_tick_delay_ms(loop_start: Instant, interval_ms: u64) -> u64 {
        let elapsed = loop_start.elapsed();
        Duration::from_millis(interval_ms)
            .saturating_sub(elapsed)
            .as_millis()
            .max(1) as u64
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

/// 时长未知（非正值）时不做截断
pub fn clamp_to_duration(position_us: i64, duration_us: i64) -> i64 {
    if duration_us > 0 {
        position_us.min(duration_us)
    } else {
        position_us
    }
}

/// 综合主时钟与墙上时钟得到播放位置
///
/// 主时钟只会落后于墙上时钟，不会超前；主时钟无效或到达末尾时使用墙上时钟
pub fn sync_position_us(wall_position_us: i64, master_position_us: Option<i64>) -> i64 {
    match master_position_us {
        Some(position) if position != END_OF_RENDER && position > 0 => {
            position.min(wall_position_us)
        }
        _ => wall_position_us,
    }
}
