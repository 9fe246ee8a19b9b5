// 上传进度统计
//
// 纯计数逻辑，除读取时钟外没有副作用：
// - 当前文件已确认字节数、百分比
// - 整个任务的累计字节数、百分比
// - 速度采样（间隔 >= 0.5 秒才重新计算）

use serde::Serialize;
use std::time::{Duration, Instant};

/// 速度重新采样的最小间隔
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 格式化字节大小（1024 进制，最多两位小数，去掉末尾的 0）
///
/// `0 -> "0 B"`, `1536 -> "1.5 KB"`, `10_485_760 -> "10 MB"`
pub fn format_size(bytes: f64) -> String {
    if bytes <= 0.0 || !bytes.is_finite() {
        return "0 B".to_string();
    }

    // log1024(x) = log2(x) / 10，2 的整数次幂时结果精确
    let exponent = (bytes.log2() / 10.0).floor();
    let index = exponent.clamp(0.0, (SIZE_UNITS.len() - 1) as f64) as usize;
    let value = bytes / 1024f64.powi(index as i32);

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[index])
}

/// 格式化速度，未采样时显示 "calculating..."
pub fn format_speed(speed: Option<f64>) -> String {
    match speed {
        Some(bytes_per_sec) => format!("{}/s", format_size(bytes_per_sec)),
        None => "calculating...".to_string(),
    }
}

/// 进度快照（推送给观察者）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// 当前文件在队列中的索引
    pub file_index: usize,
    /// 队列中的文件总数
    pub file_count: usize,
    /// 当前文件路径
    pub path: String,
    /// 当前文件已确认字节数
    pub file_bytes: u64,
    /// 当前文件大小
    pub file_size: u64,
    /// 当前文件百分比（取整）
    pub file_percent: u32,
    /// 任务累计已确认字节数
    pub task_bytes: u64,
    /// 任务总大小
    pub task_size: u64,
    /// 任务百分比（不取整，用于连续进度条）
    pub task_percent: f64,
    /// 上传速度 (bytes/s)，尚未采样时为 None
    pub speed: Option<f64>,
}

impl ProgressSnapshot {
    /// 状态栏文本，例如 `Uploading a.bin: 42% (1.5 MB/s)`
    pub fn status_line(&self) -> String {
        format!(
            "Uploading {}: {}% ({})",
            self.path,
            self.file_percent,
            format_speed(self.speed)
        )
    }
}

/// 速度采样锚点
#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    at: Instant,
    bytes: u64,
}

/// 上传进度统计器
#[derive(Debug)]
pub struct ProgressTracker {
    /// 任务总大小
    task_size: u64,
    /// 文件总数
    file_count: usize,
    /// 之前所有文件已确认的字节数
    completed_files_bytes: u64,
    /// 当前文件索引
    file_index: usize,
    /// 当前文件路径
    file_path: String,
    /// 当前文件大小
    file_size: u64,
    /// 当前文件已确认字节数
    file_bytes: u64,
    /// 速度采样锚点
    sample: SpeedSample,
    /// 最近一次速度估计
    speed: Option<f64>,
}

impl ProgressTracker {
    pub fn new(task_size: u64, file_count: usize) -> Self {
        Self {
            task_size,
            file_count,
            completed_files_bytes: 0,
            file_index: 0,
            file_path: String::new(),
            file_size: 0,
            file_bytes: 0,
            sample: SpeedSample {
                at: Instant::now(),
                bytes: 0,
            },
            speed: None,
        }
    }

    /// 开始统计新文件
    pub fn begin_file(&mut self, index: usize, path: &str, size: u64) {
        self.begin_file_at(index, path, size, Instant::now());
    }

    /// 开始统计新文件（指定时间，便于测试）
    pub fn begin_file_at(&mut self, index: usize, path: &str, size: u64, now: Instant) {
        self.file_index = index;
        self.file_path = path.to_string();
        self.file_size = size;
        self.file_bytes = 0;
        self.sample = SpeedSample { at: now, bytes: 0 };
        self.speed = None;
    }

    /// 记录当前文件的累计已确认字节数
    pub fn record(&mut self, file_bytes: u64) {
        self.record_at(file_bytes, Instant::now());
    }

    /// 记录当前文件的累计已确认字节数（指定时间）
    ///
    /// 距离上次采样不足 0.5 秒时沿用旧的速度估计。
    pub fn record_at(&mut self, file_bytes: u64, now: Instant) {
        // 累计值只增不减，且不超过文件大小
        let file_bytes = file_bytes.min(self.file_size).max(self.file_bytes);
        self.file_bytes = file_bytes;

        let elapsed = now.saturating_duration_since(self.sample.at);
        if elapsed >= SPEED_SAMPLE_INTERVAL {
            let bytes_diff = file_bytes.saturating_sub(self.sample.bytes);
            self.speed = Some(bytes_diff as f64 / elapsed.as_secs_f64());
            self.sample = SpeedSample {
                at: now,
                bytes: file_bytes,
            };
        }
    }

    /// 当前文件完成，计入累计字节数
    pub fn finish_file(&mut self) {
        self.completed_files_bytes =
            (self.completed_files_bytes + self.file_size).min(self.task_size);
        self.file_bytes = 0;
        self.file_size = 0;
    }

    pub fn file_bytes(&self) -> u64 {
        self.file_bytes
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// 任务累计已确认字节数
    pub fn task_bytes(&self) -> u64 {
        (self.completed_files_bytes + self.file_bytes).min(self.task_size)
    }

    /// 当前文件百分比（四舍五入），空文件按 100% 计
    pub fn file_percent(&self) -> u32 {
        if self.file_size == 0 {
            return 100;
        }
        ((self.file_bytes as f64 / self.file_size as f64) * 100.0).round() as u32
    }

    /// 任务百分比（不取整），空任务按 100% 计
    pub fn task_percent(&self) -> f64 {
        if self.task_size == 0 {
            return 100.0;
        }
        (self.task_bytes() as f64 / self.task_size as f64) * 100.0
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            file_index: self.file_index,
            file_count: self.file_count,
            path: self.file_path.clone(),
            file_bytes: self.file_bytes,
            file_size: self.file_size,
            file_percent: self.file_percent(),
            task_bytes: self.task_bytes(),
            task_size: self.task_size,
            task_percent: self.task_percent(),
            speed: self.speed,
        }
    }
}
