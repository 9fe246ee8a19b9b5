// 文件分享服务的分片上传客户端
// 把本地文件/文件夹按分片并发上传到文件服务器

// 命令行参数
pub mod cli;

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 命令行进度输出
pub mod reporter;

// 分片上传模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, UploadConfig};
pub use reporter::{ConsoleReporter, OutputFormat};
pub use uploader::{
    ChunkScheduler, ChunkTransport, FileEntry, FileSelection, HttpTransport, ProgressSnapshot,
    SchedulerOptions, StatusUpdate, TaskStatus, TransferController, UploadError, UploadObserver,
    UploadTask,
};
