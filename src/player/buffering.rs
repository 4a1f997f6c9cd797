use crate::core::PlaybackTuning;

/// 缓冲策略
///
/// 播放中缓存低于下限（且未缓存到末尾）时进入等待，
/// 等待期间按指数退避轮询，缓存超过上限或到达末尾时恢复播放
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// 低于此值应进入等待（微秒）
    min_cache_duration_us: i64,
    /// 高于此值应离开等待（微秒）
    max_cache_duration_us: i64,
    /// 轮询初始间隔（毫秒）
    wait_start_ms: u64,
    /// 轮询最大间隔（毫秒）
    max_wait_ms: u64,
}

impl CachePolicy {
    pub fn new(tuning: &PlaybackTuning) -> Self {
        Self {
            min_cache_duration_us: tuning.min_cache_duration_us,
            max_cache_duration_us: tuning.max_cache_duration_us,
            wait_start_ms: tuning.wait_start_ms,
            max_wait_ms: tuning.max_wait_ms.max(tuning.wait_start_ms),
        }
    }

    /// 是否应该进入缓存等待，缓存时长为负（不可用）时不等待
    pub fn should_wait_for_cache(&self, reached_end_of_stream: bool, cache_duration_us: i64) -> bool {
        !reached_end_of_stream && (0..self.min_cache_duration_us).contains(&cache_duration_us)
    }

    /// 是否应该结束缓存等待
    pub fn should_stop_wait(&self, reached_end_of_stream: bool, cache_duration_us: i64) -> bool {
        reached_end_of_stream || cache_duration_us >= self.max_cache_duration_us
    }

    pub fn wait_start_ms(&self) -> u64 {
        self.wait_start_ms
    }

    /// 下一轮等待的间隔：翻倍，不超过上限
    pub fn next_wait_delay_ms(&self, current_ms: u64) -> u64 {
        current_ms.saturating_mul(2).min(self.max_wait_ms)
    }

    /// 缓冲进度（0.0-1.0）
    pub fn buffer_progress(&self, cache_duration_us: i64) -> f32 {
        if self.max_cache_duration_us <= 0 || cache_duration_us < 0 {
            return 0.0;
        }
        (cache_duration_us as f64 / self.max_cache_duration_us as f64).min(1.0) as f32
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(&PlaybackTuning::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = CachePolicy::default();
        let mut delay = policy.wait_start_ms();
        let mut delays = vec![delay];
        for _ in 0..5 {
            delay = policy.next_wait_delay_ms(delay);
            delays.push(delay);
        }
        assert_eq!(delays, vec![100, 200, 400, 800, 800, 800]);
    }

    #[test]
    fn test_wait_thresholds() {
        let policy = CachePolicy::default();
        assert!(policy.should_wait_for_cache(false, 0));
        assert!(policy.should_wait_for_cache(false, 999_999));
        assert!(!policy.should_wait_for_cache(false, 1_000_000));
        // 缓存不可用或已到末尾时不等待
        assert!(!policy.should_wait_for_cache(false, -1));
        assert!(!policy.should_wait_for_cache(true, 0));

        assert!(!policy.should_stop_wait(false, 3_499_999));
        assert!(policy.should_stop_wait(false, 3_500_000));
        assert!(policy.should_stop_wait(true, 0));
    }

    #[test]
    fn test_buffer_progress() {
        let policy = CachePolicy::default();
        assert_eq!(policy.buffer_progress(-1), 0.0);
        assert!((policy.buffer_progress(1_750_000) - 0.5).abs() < 1e-6);
        assert_eq!(policy.buffer_progress(10_000_000), 1.0);
    }
}
