// 传输控制器
//
// 每个上传任务持有唯一的取消令牌和任务状态。
// 所有状态修改（进度、分片确认、调度）都经过 guard()：
// 只有任务仍在 Running 时才会在状态锁内执行，终态之后到达的结果一律丢弃。

use crate::uploader::UploadError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 上传任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 尚未开始
    Idle,
    /// 上传中
    Running,
    /// 全部完成
    Completed,
    /// 已取消
    Cancelled,
    /// 失败
    Failed,
}

impl TaskStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 传输控制器
#[derive(Debug)]
pub struct TransferController {
    token: CancellationToken,
    status: Mutex<TaskStatus>,
}

impl TransferController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            status: Mutex::new(TaskStatus::Idle),
        }
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.lock()
    }

    /// 取消令牌（克隆给每个分片请求）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Idle -> Running
    pub fn start(&self) -> bool {
        self.transition(TaskStatus::Idle, TaskStatus::Running)
    }

    /// Running -> Completed
    pub fn complete(&self) -> bool {
        self.transition(TaskStatus::Running, TaskStatus::Completed)
    }

    /// Running -> Failed
    pub fn fail(&self) -> bool {
        self.transition(TaskStatus::Running, TaskStatus::Failed)
    }

    /// Running -> Cancelled，并触发取消令牌
    ///
    /// 幂等：任务不在运行时调用不会有任何效果。
    pub fn cancel(&self) -> bool {
        let mut status = self.status.lock();
        if *status != TaskStatus::Running {
            debug!("忽略取消请求，当前状态: {}", *status);
            return false;
        }
        *status = TaskStatus::Cancelled;
        self.token.cancel();
        info!("上传任务已取消");
        true
    }

    /// 仅在 Running 时执行 `mutation`，执行期间持有状态锁
    ///
    /// 返回 None 表示任务已到终态，调用方应丢弃本次结果。
    /// `mutation` 内不能再调用本控制器的方法。
    pub fn guard<R>(&self, mutation: impl FnOnce() -> R) -> Option<R> {
        let status = self.status.lock();
        if *status != TaskStatus::Running {
            return None;
        }
        let result = mutation();
        drop(status);
        Some(result)
    }

    /// 检查任务仍在运行
    pub fn check_running(&self) -> Result<(), UploadError> {
        match self.status() {
            TaskStatus::Running => Ok(()),
            TaskStatus::Cancelled => Err(UploadError::Cancelled),
            other => Err(UploadError::NotRunning(other.to_string())),
        }
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        let mut status = self.status.lock();
        if *status != from {
            debug!("忽略状态转换 {} -> {}，当前状态: {}", from, to, *status);
            return false;
        }
        *status = to;
        true
    }
}

impl Default for TransferController {
    fn default() -> Self {
        Self::new()
    }
}
