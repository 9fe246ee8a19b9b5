// 上传任务
//
// 按选择顺序逐个上传文件（文件之间不并发），
// 每个文件交给 ChunkScheduler，进度汇总到 ProgressTracker。
// 任意文件失败立即终止整个任务；取消后不再发出任何请求。

use crate::uploader::{
    ChunkScheduler, ChunkSource, ChunkTransport, NoopObserver, ProgressTracker, SchedulerOptions,
    StatusUpdate, TaskStatus, TransferController, UploadError, UploadObserver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 待上传文件（入队后不可变）
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// 显示路径；来自文件夹时为相对路径
    path: String,
    /// 文件大小
    size: u64,
    /// 数据来源
    source: ChunkSource,
}

impl FileEntry {
    /// 从本地文件创建，大小取自文件元数据
    pub fn from_path(
        local_path: impl Into<PathBuf>,
        display_path: impl Into<String>,
    ) -> std::io::Result<Self> {
        let local_path = local_path.into();
        let size = std::fs::metadata(&local_path)?.len();
        Ok(Self::with_size(local_path, display_path, size))
    }

    /// 从本地文件创建（大小已知，例如扫描目录时）
    pub fn with_size(local_path: PathBuf, display_path: impl Into<String>, size: u64) -> Self {
        Self {
            path: display_path.into(),
            size,
            source: ChunkSource::Disk(local_path),
        }
    }

    /// 从内存数据创建
    pub fn from_bytes(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            path: path.into(),
            size: data.len() as u64,
            source: ChunkSource::Memory(Arc::from(data)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &ChunkSource {
        &self.source
    }
}

/// 上传任务
pub struct UploadTask {
    /// 任务ID
    id: String,
    /// 文件队列
    files: Vec<FileEntry>,
    /// 所有文件总大小
    total_size: u64,
    controller: Arc<TransferController>,
    scheduler: ChunkScheduler,
    tracker: ProgressTracker,
    observer: Arc<dyn UploadObserver>,
    /// 开始时间 (Unix timestamp)
    started_at: Option<i64>,
    /// 结束时间 (Unix timestamp)
    finished_at: Option<i64>,
    /// 错误信息
    error: Option<String>,
}

impl UploadTask {
    /// 创建新的上传任务（每次上传都新建，状态互不共享）
    pub fn new(
        transport: Arc<dyn ChunkTransport>,
        options: SchedulerOptions,
        observer: Arc<dyn UploadObserver>,
    ) -> Self {
        let controller = Arc::new(TransferController::new());
        let scheduler = ChunkScheduler::new(transport, controller.clone(), options);

        Self {
            id: Uuid::new_v4().to_string(),
            files: Vec::new(),
            total_size: 0,
            controller,
            scheduler,
            tracker: ProgressTracker::new(0, 0),
            observer,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// 创建不带观察者的任务
    pub fn without_observer(transport: Arc<dyn ChunkTransport>, options: SchedulerOptions) -> Self {
        Self::new(transport, options, Arc::new(NoopObserver))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.controller.status()
    }

    /// 控制器句柄，可在其他任务中调用 `cancel()`
    pub fn controller(&self) -> Arc<TransferController> {
        self.controller.clone()
    }

    pub fn cancel(&self) -> bool {
        self.controller.cancel()
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// 已确认的字节数（跨文件累计）
    pub fn uploaded_bytes(&self) -> u64 {
        self.tracker.task_bytes()
    }

    /// 任务进度百分比
    pub fn progress(&self) -> f64 {
        self.tracker.task_percent()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<i64> {
        self.finished_at
    }

    /// 执行上传，返回终态
    ///
    /// 空选择返回 `EmptySelection` 且任务保持 Idle；重复启动返回 `AlreadyStarted`。
    pub async fn start(&mut self, files: Vec<FileEntry>) -> Result<TaskStatus, UploadError> {
        if files.is_empty() {
            warn!("未选择任何文件: task={}", self.id);
            return Err(UploadError::EmptySelection);
        }
        if !self.controller.start() {
            return Err(UploadError::AlreadyStarted);
        }

        self.total_size = files.iter().map(|f| f.size()).sum();
        self.tracker = ProgressTracker::new(self.total_size, files.len());
        self.files = files;
        self.started_at = Some(chrono::Utc::now().timestamp());

        info!(
            "开始上传任务: task={}, 文件数={}, 总大小={} bytes",
            self.id,
            self.files.len(),
            self.total_size
        );

        let status = match self.run_queue().await {
            Ok(()) => {
                self.controller.complete();
                self.controller.status()
            }
            Err(e) => self.conclude_with_error(e),
        };
        self.finished_at = Some(chrono::Utc::now().timestamp());

        let update = match status {
            TaskStatus::Completed => {
                info!("上传任务完成: task={}", self.id);
                StatusUpdate::Done
            }
            TaskStatus::Cancelled => StatusUpdate::Cancelled,
            _ => StatusUpdate::Error {
                message: self.error.clone().unwrap_or_default(),
            },
        };
        self.observer.on_status(&update);
        self.observer.on_finished(status);

        Ok(status)
    }

    async fn run_queue(&mut self) -> Result<(), UploadError> {
        let controller = &self.controller;
        let tracker = &mut self.tracker;
        let observer = &self.observer;
        let file_count = self.files.len();

        for (index, entry) in self.files.iter().enumerate() {
            controller.check_running()?;
            observer.on_status(&StatusUpdate::Uploading {
                path: entry.path().to_string(),
            });

            controller
                .guard(|| tracker.begin_file(index, entry.path(), entry.size()))
                .ok_or_else(|| halted(controller))?;

            self.scheduler
                .upload_file(entry, |bytes| {
                    let snapshot = controller.guard(|| {
                        tracker.record(bytes);
                        tracker.snapshot()
                    });
                    if let Some(snapshot) = snapshot {
                        observer.on_progress(&snapshot);
                    }
                })
                .await?;

            controller
                .guard(|| tracker.finish_file())
                .ok_or_else(|| halted(controller))?;

            info!(
                "[{}/{}] 文件已上传: {} ({} bytes)",
                index + 1,
                file_count,
                entry.path(),
                entry.size()
            );
        }

        Ok(())
    }

    fn conclude_with_error(&mut self, e: UploadError) -> TaskStatus {
        if e.is_cancelled() || self.controller.is_cancelled() {
            warn!(
                "上传任务已取消: task={}, 已上传 {} / {} bytes",
                self.id,
                self.tracker.task_bytes(),
                self.total_size
            );
        } else if self.controller.fail() {
            error!("上传任务失败: task={}, 错误: {}", self.id, e);
            self.error = Some(e.to_string());
        }
        self.controller.status()
    }
}

/// 任务已离开 Running 时对应的错误
fn halted(controller: &TransferController) -> UploadError {
    controller
        .check_running()
        .err()
        .unwrap_or(UploadError::Cancelled)
}
