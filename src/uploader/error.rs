// 上传错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 上传错误
///
/// `Rejected` / `Transport` 属于传输失败，会让整个任务进入 Failed；
/// `Cancelled` 单独处理，对外表现为"已取消"而不是错误。
#[derive(Debug, Error)]
pub enum UploadError {
    /// 未选择任何文件（调用方校验错误，任务保持 Idle）
    #[error("未选择任何文件")]
    EmptySelection,

    /// 任务已经启动过
    #[error("上传任务已启动，不能重复启动")]
    AlreadyStarted,

    /// 任务已不在运行状态
    #[error("上传任务未在运行: {0}")]
    NotRunning(String),

    /// 取消令牌已触发
    #[error("上传已取消")]
    Cancelled,

    /// 服务器返回非 2xx，消息为响应正文
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// 底层传输失败（连接、DNS 等）
    #[error("上传请求发送失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 读取本地分片数据失败
    #[error("读取文件失败: {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文件名无法放入请求头
    #[error("无效的文件名: {0}")]
    InvalidFileName(String),

    /// 分片任务 panic 或被中止
    #[error("分片任务异常: {0}")]
    Worker(String),
}

impl UploadError {
    /// 是否为取消导致的错误
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// 根据响应状态和正文构造拒绝错误，正文为空时回退到状态行
    pub fn rejected(status: reqwest::StatusCode, body: String) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            body.trim_end().to_string()
        };
        UploadError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
