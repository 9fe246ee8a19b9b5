// 命令行进度输出
//
// 把上传事件输出为文本状态行或 JSON 行（stdout），
// 进度事件按时间间隔节流，避免事件风暴。

use crate::uploader::{ProgressSnapshot, StatusUpdate, TaskStatus, UploadObserver};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 尚未发布过事件
const NEVER: u64 = u64::MAX;

/// 进度事件节流器
///
/// 线程安全的时间节流器，使用原子操作避免锁竞争
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 计时起点
    base: Instant,
    /// 上次发布事件的时间（相对 base 的纳秒）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    /// # 参数
    /// * `interval` - 最小发布间隔
    pub fn new(interval: Duration) -> Self {
        Self {
            base: Instant::now(),
            last_emit_nanos: AtomicU64::new(NEVER),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 距离上次发布已超过节流间隔时返回 true 并更新时间戳
    pub fn should_emit(&self) -> bool {
        let now = self.base.elapsed().as_nanos() as u64;
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        if last != NEVER && now.saturating_sub(last) < self.interval_nanos {
            return false;
        }
        // 被其他线程抢先更新时本次不发布
        self.last_emit_nanos
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// 强制发布（用于文件完成时的最后一次更新）
    pub fn force_emit(&self) {
        let now = self.base.elapsed().as_nanos() as u64;
        self.last_emit_nanos.store(now, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.last_emit_nanos.store(NEVER, Ordering::Relaxed);
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// 人类可读的状态行
    Text,
    /// 每个事件一行 JSON
    Json,
}

/// JSON 事件
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ReportEvent<'a> {
    Status(&'a StatusUpdate),
    Progress(&'a ProgressSnapshot),
    Finished { status: TaskStatus, browse_url: &'a str },
}

/// 命令行上传观察者
pub struct ConsoleReporter {
    format: OutputFormat,
    throttler: ProgressThrottler,
    /// 完成或取消后跳转的目录地址
    browse_url: String,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    /// 输出到 stdout
    ///
    /// # 参数
    /// * `format` - 输出格式
    /// * `endpoint` - 服务器地址
    /// * `destination` - 服务器上的目标目录
    pub fn new(format: OutputFormat, endpoint: &str, destination: &str) -> Self {
        Self::with_writer(format, endpoint, destination, Box::new(io::stdout()))
    }

    pub fn with_writer(
        format: OutputFormat,
        endpoint: &str,
        destination: &str,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            format,
            throttler: ProgressThrottler::default(),
            browse_url: browse_url(endpoint, destination),
            out: Mutex::new(out),
        }
    }

    pub fn browse_url(&self) -> &str {
        &self.browse_url
    }

    fn emit_line(&self, line: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("输出事件失败: {}", e);
        }
    }

    fn emit_json(&self, event: &ReportEvent<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => self.emit_line(&line),
            Err(e) => warn!("序列化事件失败: {}", e),
        }
    }
}

impl UploadObserver for ConsoleReporter {
    fn on_status(&self, update: &StatusUpdate) {
        if matches!(update, StatusUpdate::Uploading { .. }) {
            self.throttler.reset();
        }
        match self.format {
            OutputFormat::Text => self.emit_line(&update.to_string()),
            OutputFormat::Json => self.emit_json(&ReportEvent::Status(update)),
        }
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if snapshot.file_bytes >= snapshot.file_size {
            self.throttler.force_emit();
        } else if !self.throttler.should_emit() {
            return;
        }
        match self.format {
            OutputFormat::Text => self.emit_line(&snapshot.status_line()),
            OutputFormat::Json => self.emit_json(&ReportEvent::Progress(snapshot)),
        }
    }

    fn on_finished(&self, status: TaskStatus) {
        if self.format == OutputFormat::Json {
            self.emit_json(&ReportEvent::Finished {
                status,
                browse_url: &self.browse_url,
            });
        }
        match status {
            TaskStatus::Completed | TaskStatus::Cancelled => {
                info!("目标目录: {}", self.browse_url);
            }
            _ => {}
        }
    }
}

/// 目标目录的浏览地址
fn browse_url(endpoint: &str, destination: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        destination.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn snapshot(file_bytes: u64, file_size: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            file_index: 0,
            file_count: 1,
            path: "a.bin".to_string(),
            file_bytes,
            file_size,
            file_percent: (file_bytes * 100 / file_size) as u32,
            task_bytes: file_bytes,
            task_size: file_size,
            task_percent: file_bytes as f64 * 100.0 / file_size as f64,
            speed: None,
        }
    }

    #[test]
    fn test_throttler_basic() {
        let throttler = ProgressThrottler::with_millis(100);

        // 第一次应该发布
        assert!(throttler.should_emit());
        // 立即再次调用，不应该发布
        assert!(!throttler.should_emit());
    }

    #[test]
    fn test_throttler_after_interval() {
        let throttler = ProgressThrottler::with_millis(50);
        assert!(throttler.should_emit());

        thread::sleep(Duration::from_millis(60));
        assert!(throttler.should_emit());

        throttler.reset();
        assert!(throttler.should_emit());
    }

    #[test]
    fn test_browse_url() {
        assert_eq!(
            browse_url("http://127.0.0.1:8080/", "/photos"),
            "http://127.0.0.1:8080/photos"
        );
        assert_eq!(browse_url("http://host", "/"), "http://host/");
    }

    #[test]
    fn test_text_output_throttles_progress() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::with_writer(
            OutputFormat::Text,
            "http://host",
            "/",
            Box::new(buffer.clone()),
        );

        reporter.on_status(&StatusUpdate::Uploading {
            path: "a.bin".to_string(),
        });
        reporter.on_progress(&snapshot(10, 40));
        reporter.on_progress(&snapshot(20, 40));
        reporter.on_progress(&snapshot(40, 40));
        reporter.on_status(&StatusUpdate::Done);

        assert_eq!(
            buffer.lines(),
            vec![
                "Uploading a.bin...",
                "Uploading a.bin: 25% (calculating...)",
                "Uploading a.bin: 100% (calculating...)",
                "Done! Redirecting...",
            ]
        );
    }

    #[test]
    fn test_json_output() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::with_writer(
            OutputFormat::Json,
            "http://host",
            "/docs",
            Box::new(buffer.clone()),
        );

        reporter.on_status(&StatusUpdate::Error {
            message: "disk full".to_string(),
        });
        reporter.on_progress(&snapshot(40, 40));
        reporter.on_finished(TaskStatus::Failed);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            r#"{"event":"status","status":"error","message":"disk full"}"#
        );

        let progress: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(progress["event"], "progress");
        assert_eq!(progress["file_percent"], 100);
        assert!(progress["speed"].is_null());

        let finished: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
        assert_eq!(finished["status"], "failed");
        assert_eq!(finished["browse_url"], "http://host/docs");
    }
}
