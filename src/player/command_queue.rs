use crate::core::{MediaItem, PlaybackState};
use crate::player::codec::VideoSurface;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 工作线程执行的命令
#[derive(Debug, Clone)]
pub enum Command {
    Prepare(MediaItem),
    Play,
    Pause,
    /// 跳转目标（毫秒）
    SeekTo(i64),
    RenderTick,
    /// 本轮等待的间隔（毫秒）
    WaitForCache(u64),
    /// 尽力渲染一帧后进入 `next_state`
    RenderFirstFrame {
        next_state: PlaybackState,
        position_us: i64,
    },
    SetVideoSurface(Option<Arc<dyn VideoSurface>>),
}

/// 命令种类，用于查询和移除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Prepare,
    Play,
    Pause,
    SeekTo,
    RenderTick,
    WaitForCache,
    RenderFirstFrame,
    SetVideoSurface,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Prepare(_) => CommandKind::Prepare,
            Command::Play => CommandKind::Play,
            Command::Pause => CommandKind::Pause,
            Command::SeekTo(_) => CommandKind::SeekTo,
            Command::RenderTick => CommandKind::RenderTick,
            Command::WaitForCache(_) => CommandKind::WaitForCache,
            Command::RenderFirstFrame { .. } => CommandKind::RenderFirstFrame,
            Command::SetVideoSurface(_) => CommandKind::SetVideoSurface,
        }
    }
}

struct Entry {
    when: Instant,
    seq: u64,
    command: Command,
    /// 延迟播放标记，pause / seek / prepare 可以据此撤销
    pending_play: bool,
}

struct QueueInner {
    entries: Vec<Entry>,
    next_seq: u64,
    quit: bool,
}

/// 工作线程的命令队列
///
/// 按到期时间排序，同一时刻按到达顺序；支持延迟投递、按种类查询和移除。
/// `quit` 之后所有投递都被忽略，`next` 返回 None
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: Vec::new(),
                next_seq: 0,
                quit: false,
            }),
            available: Condvar::new(),
        }
    }

    /// 立即投递
    pub fn send(&self, command: Command) -> bool {
        self.enqueue(command, Duration::ZERO, false)
    }

    /// 延迟 `delay_ms` 后投递
    pub fn send_delayed(&self, command: Command, delay_ms: u64) -> bool {
        self.enqueue(command, Duration::from_millis(delay_ms), false)
    }

    /// 投递带标记的延迟播放
    pub fn send_pending_play(&self, delay_ms: u64) -> bool {
        self.enqueue(Command::Play, Duration::from_millis(delay_ms), true)
    }

    fn enqueue(&self, command: Command, delay: Duration, pending_play: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.quit {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = Entry {
            when: Instant::now() + delay,
            seq,
            command,
            pending_play,
        };
        let position = inner
            .entries
            .partition_point(|e| (e.when, e.seq) <= (entry.when, entry.seq));
        inner.entries.insert(position, entry);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// 队列中是否存在该种类的命令（包括尚未到期的）
    pub fn has(&self, kind: CommandKind) -> bool {
        self.inner.lock().entries.iter().any(|e| e.command.kind() == kind)
    }

    /// 移除该种类的所有命令
    pub fn remove(&self, kind: CommandKind) {
        self.inner.lock().entries.retain(|e| e.command.kind() != kind);
    }

    /// 移除所有带标记的延迟播放
    pub fn remove_pending_plays(&self) {
        self.inner.lock().entries.retain(|e| !e.pending_play);
    }

    /// 停止队列：清空并唤醒等待者
    pub fn quit(&self) {
        let mut inner = self.inner.lock();
        inner.quit = true;
        inner.entries.clear();
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_quit(&self) -> bool {
        self.inner.lock().quit
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 阻塞等待下一个到期的命令，队列停止后返回 None
    pub fn next(&self) -> Option<Command> {
        let mut inner = self.inner.lock();
        loop {
            if inner.quit {
                return None;
            }
            let now = Instant::now();
            match inner.entries.first().map(|e| e.when) {
                Some(when) if when <= now => return Some(inner.entries.remove(0).command),
                Some(when) => {
                    self.available.wait_until(&mut inner, when);
                }
                None => self.available.wait(&mut inner),
            }
        }
    }

    /// 不等待到期，直接取出最早的命令
    #[cfg(test)]
    pub(crate) fn pop_front(&self) -> Option<Command> {
        let mut inner = self.inner.lock();
        if inner.entries.is_empty() {
            None
        } else {
            Some(inner.entries.remove(0).command)
        }
    }

    /// 队列中命令的种类（按执行顺序）
    #[cfg(test)]
    pub(crate) fn kinds(&self) -> Vec<CommandKind> {
        self.inner.lock().entries.iter().map(|e| e.command.kind()).collect()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
