// 分片上传模块
//
// 上传流程：
// - 文件按选择顺序逐个上传，文件之间不并发
// - 单个文件切成固定大小的分片，最多 parallel_chunks 个请求同时在途
// - 服务器按偏移写入，分片可以乱序完成
// - 全部分片确认后发送结束标记
// - 任意失败终止整个任务，不重试；取消后丢弃所有迟到的结果

pub mod chunk;
pub mod controller;
pub mod error;
pub mod observer;
pub mod progress;
pub mod scheduler;
pub mod selection;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use chunk::{ChunkJob, ChunkPlan, ChunkSource, ChunkState, DEFAULT_CHUNK_SIZE};
pub use controller::{TaskStatus, TransferController};
pub use error::UploadError;
pub use observer::{NoopObserver, StatusUpdate, UploadObserver};
pub use progress::{
    format_size, format_speed, ProgressSnapshot, ProgressTracker, SPEED_SAMPLE_INTERVAL,
};
pub use scheduler::{ChunkScheduler, SchedulerOptions, DEFAULT_PARALLEL_CHUNKS};
pub use selection::{FileSelection, ScanOptions};
pub use task::{FileEntry, UploadTask};
pub use transport::{ChunkRequest, ChunkTransport, HttpTransport};
