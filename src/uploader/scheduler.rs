// 单文件分片调度器
//
// 并发上传策略：
// - JoinSet 作为在途请求窗口，容量为 parallel_chunks
// - 按分片索引递增顺序填满窗口
// - 任意一个请求返回后立即补发下一个分片
// - 完成顺序不保证，服务器按偏移写入
// - 全部数据分片确认后发送一次结束标记
// - 第一个错误立即返回，不重试；剩余请求随 JoinSet 释放被中止

use crate::uploader::{
    ChunkJob, ChunkPlan, ChunkRequest, ChunkSource, ChunkTransport, FileEntry,
    TransferController, UploadError, DEFAULT_CHUNK_SIZE,
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 默认每个文件的最大并发分片数
pub const DEFAULT_PARALLEL_CHUNKS: usize = 4;

/// 调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// 分片大小（字节）
    pub chunk_size: u64,
    /// 每个文件的最大在途请求数
    pub parallel_chunks: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_chunks: DEFAULT_PARALLEL_CHUNKS,
        }
    }
}

/// 分片调度器
pub struct ChunkScheduler {
    transport: Arc<dyn ChunkTransport>,
    controller: Arc<TransferController>,
    options: SchedulerOptions,
}

impl ChunkScheduler {
    pub fn new(
        transport: Arc<dyn ChunkTransport>,
        controller: Arc<TransferController>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            transport,
            controller,
            options,
        }
    }

    #[cfg(test)]
    pub(crate) fn controller(&self) -> &Arc<TransferController> {
        &self.controller
    }

    /// 上传单个文件
    ///
    /// 每个分片确认后以当前文件的累计字节数调用 `on_progress`。
    /// 结束标记确认后才返回 Ok。
    pub async fn upload_file(
        &self,
        entry: &FileEntry,
        mut on_progress: impl FnMut(u64),
    ) -> Result<(), UploadError> {
        let mut plan = ChunkPlan::new(entry.size(), self.options.chunk_size);
        let parallel = self.options.parallel_chunks.max(1);
        let token = self.controller.token();
        let mut in_flight: JoinSet<Result<ChunkJob, (usize, UploadError)>> = JoinSet::new();
        let mut committed = 0u64;

        info!(
            "开始上传文件: {}, 大小={} bytes, 分片大小={} bytes, 分片数={}, 并发={}",
            entry.path(),
            plan.total_size(),
            plan.chunk_size(),
            plan.chunk_count(),
            parallel
        );

        loop {
            self.controller.check_running()?;

            // 填满在途窗口
            while in_flight.len() < parallel && plan.has_pending() {
                let job = match self.controller.guard(|| plan.next_pending()) {
                    Some(Some(job)) => job,
                    Some(None) => break,
                    None => return Err(self.terminal_error()),
                };

                debug!(
                    "[分片#{}] 发送: {} (范围: {}-{}, 大小: {} bytes)",
                    job.index,
                    entry.path(),
                    job.offset,
                    job.offset + job.length,
                    job.length
                );

                in_flight.spawn(send_chunk(
                    self.transport.clone(),
                    entry.source().clone(),
                    entry.path().to_string(),
                    job,
                    token.clone(),
                ));
            }

            if in_flight.is_empty() {
                break;
            }

            // 等待任意一个请求返回，或任务被取消
            let settled = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(UploadError::Cancelled),
                settled = in_flight.join_next() => settled,
            };

            let job = match settled {
                Some(Ok(Ok(job))) => job,
                Some(Ok(Err((index, e)))) => {
                    self.controller.guard(|| plan.mark_failed(index));
                    if !e.is_cancelled() {
                        error!("[分片#{}] 上传失败: {}: {}", index, entry.path(), e);
                    }
                    return Err(e);
                }
                Some(Err(e)) => {
                    error!("分片任务异常: {}: {}", entry.path(), e);
                    return Err(UploadError::Worker(e.to_string()));
                }
                None => break,
            };

            // 终态之后返回的结果直接丢弃
            let Some(length) = self.controller.guard(|| plan.mark_committed(job.index)) else {
                debug!("[分片#{}] 任务已结束，丢弃返回结果", job.index);
                return Err(self.terminal_error());
            };
            committed += length;

            debug!(
                "[分片#{}] ✓ 已确认 ({}/{} 完成, 在途 {})",
                job.index,
                plan.committed_count(),
                plan.chunk_count(),
                plan.in_flight_count()
            );
            on_progress(committed);
        }

        // 所有数据分片已确认，发送结束标记
        self.controller.check_running()?;
        debug_assert!(plan.is_complete());
        debug_assert_eq!(plan.committed_bytes(), plan.total_size());
        debug!("发送结束标记: {}", entry.path());
        let marker = ChunkRequest::final_marker(entry.path());
        if let Err(e) = send_request(self.transport.as_ref(), marker, &token).await {
            if !e.is_cancelled() {
                error!("结束标记失败: {}: {}", entry.path(), e);
            }
            return Err(e);
        }
        self.controller.check_running()?;

        info!("文件上传完成: {}", entry.path());
        Ok(())
    }

    fn terminal_error(&self) -> UploadError {
        self.controller
            .check_running()
            .err()
            .unwrap_or(UploadError::Cancelled)
    }
}

/// 单个数据分片的请求任务（在 JoinSet 中运行）
async fn send_chunk(
    transport: Arc<dyn ChunkTransport>,
    source: ChunkSource,
    file_name: String,
    job: ChunkJob,
    token: CancellationToken,
) -> Result<ChunkJob, (usize, UploadError)> {
    let result = async {
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let body = source.read(job.offset, job.length).await?;
        let request = ChunkRequest::data(&file_name, job.offset, body);
        send_request(transport.as_ref(), request, &token).await
    }
    .await;

    match result {
        Ok(()) => Ok(job),
        Err(e) => Err((job.index, e)),
    }
}

/// 发送请求；令牌触发后发出或返回的请求都视为取消
async fn send_request(
    transport: &dyn ChunkTransport,
    request: ChunkRequest,
    token: &CancellationToken,
) -> Result<(), UploadError> {
    if token.is_cancelled() {
        return Err(UploadError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(UploadError::Cancelled),
        result = transport.send(request) => {
            if token.is_cancelled() {
                Err(UploadError::Cancelled)
            } else {
                result
            }
        }
    }
}
