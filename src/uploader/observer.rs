// 上传事件回调
//
// 状态和进度由任务主动推送给界面层（命令行、JSON 输出等）。

use crate::uploader::{ProgressSnapshot, TaskStatus};
use serde::Serialize;
use std::fmt;

/// 状态栏更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusUpdate {
    /// 开始上传某个文件
    Uploading { path: String },
    /// 已取消
    Cancelled,
    /// 失败
    Error { message: String },
    /// 全部完成
    Done,
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusUpdate::Uploading { path } => write!(f, "Uploading {}...", path),
            StatusUpdate::Cancelled => write!(f, "Upload cancelled."),
            StatusUpdate::Error { message } => write!(f, "Error: {}", message),
            StatusUpdate::Done => write!(f, "Done! Redirecting..."),
        }
    }
}

/// 上传观察者
///
/// 回调在任务驱动循环中同步调用，实现中不要阻塞。
pub trait UploadObserver: Send + Sync {
    /// 状态变化
    fn on_status(&self, _update: &StatusUpdate) {}

    /// 分片确认后的进度
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    /// 任务到达终态（完成后跳转、取消后退出等由调用方决定）
    fn on_finished(&self, _status: TaskStatus) {}
}

/// 不处理任何事件的观察者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        let update = StatusUpdate::Uploading {
            path: "photos/a.jpg".to_string(),
        };
        assert_eq!(update.to_string(), "Uploading photos/a.jpg...");
        assert_eq!(StatusUpdate::Cancelled.to_string(), "Upload cancelled.");
        assert_eq!(
            StatusUpdate::Error {
                message: "disk full".to_string()
            }
            .to_string(),
            "Error: disk full"
        );
        assert_eq!(StatusUpdate::Done.to_string(), "Done! Redirecting...");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&StatusUpdate::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"error","message":"boom"}"#);
    }
}
