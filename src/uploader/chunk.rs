// 上传分片管理
//
// 分片规则：
// - 文件大小 S、分片大小 C，分片数量 = ⌈S/C⌉
// - 除最后一个分片外长度均为 C，最后一个为 S - (n-1)·C
// - 所有分片区间恰好覆盖 [0, S)，无空洞无重叠
// - 空文件没有数据分片，只发送结束标记

use crate::uploader::UploadError;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 默认上传分片大小: 4MB
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// 分片状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// 等待调度
    Pending,
    /// 请求已发出，尚未返回
    InFlight,
    /// 服务器已确认
    Committed,
    /// 请求失败
    Failed,
}

/// 上传分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkJob {
    /// 分片索引（从 0 开始）
    pub index: usize,
    /// 文件内偏移
    pub offset: u64,
    /// 分片长度
    pub length: u64,
    /// 当前状态
    pub state: ChunkState,
}

impl ChunkJob {
    pub fn new(index: usize, offset: u64, length: u64) -> Self {
        Self {
            index,
            offset,
            length,
            state: ChunkState::Pending,
        }
    }

    /// 字节范围
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }
}

/// 单个文件的分片计划
///
/// 调度顺序严格按索引递增，没有重试，所以只需要一个游标记录下一个待发分片。
#[derive(Debug)]
pub struct ChunkPlan {
    jobs: Vec<ChunkJob>,
    total_size: u64,
    chunk_size: u64,
    next_index: usize,
}

impl ChunkPlan {
    /// 创建分片计划
    ///
    /// # 参数
    /// * `total_size` - 文件总大小
    /// * `chunk_size` - 分片大小（为 0 时按 1 处理）
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let jobs = Self::calculate_jobs(total_size, chunk_size);

        debug!(
            "创建分片计划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            total_size,
            chunk_size,
            jobs.len()
        );

        Self {
            jobs,
            total_size,
            chunk_size,
            next_index: 0,
        }
    }

    fn calculate_jobs(total_size: u64, chunk_size: u64) -> Vec<ChunkJob> {
        let count = total_size.div_ceil(chunk_size);
        (0..count)
            .map(|i| {
                let offset = i * chunk_size;
                let length = chunk_size.min(total_size - offset);
                ChunkJob::new(i as usize, offset, length)
            })
            .collect()
    }

    /// 取出索引最小的待发分片，并标记为 InFlight
    pub fn next_pending(&mut self) -> Option<ChunkJob> {
        let job = self.jobs.get_mut(self.next_index)?;
        job.state = ChunkState::InFlight;
        self.next_index += 1;
        Some(job.clone())
    }

    /// 标记分片已确认，返回该分片长度
    pub fn mark_committed(&mut self, index: usize) -> u64 {
        match self.jobs.get_mut(index) {
            Some(job) if job.state == ChunkState::InFlight => {
                job.state = ChunkState::Committed;
                job.length
            }
            _ => 0,
        }
    }

    /// 标记分片失败
    pub fn mark_failed(&mut self, index: usize) {
        if let Some(job) = self.jobs.get_mut(index) {
            job.state = ChunkState::Failed;
        }
    }

    pub fn jobs(&self) -> &[ChunkJob] {
        &self.jobs
    }

    pub fn chunk_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn has_pending(&self) -> bool {
        self.next_index < self.jobs.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.count(ChunkState::InFlight)
    }

    pub fn committed_count(&self) -> usize {
        self.count(ChunkState::Committed)
    }

    /// 已确认的字节数
    pub fn committed_bytes(&self) -> u64 {
        self.jobs
            .iter()
            .filter(|j| j.state == ChunkState::Committed)
            .map(|j| j.length)
            .sum()
    }

    /// 所有数据分片都已确认（空文件视为已完成）
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.state == ChunkState::Committed)
    }

    fn count(&self, state: ChunkState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }
}

/// 分片数据来源
#[derive(Debug, Clone)]
pub enum ChunkSource {
    /// 本地文件
    Disk(PathBuf),
    /// 内存缓冲区
    Memory(Arc<[u8]>),
}

impl ChunkSource {
    /// 读取分片数据
    pub async fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, UploadError> {
        match self {
            ChunkSource::Memory(data) => {
                let start = offset as usize;
                let end = start + length as usize;
                data.get(start..end)
                    .map(|slice| slice.to_vec())
                    .ok_or_else(|| UploadError::Io {
                        path: PathBuf::from("<memory>"),
                        source: std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "分片超出缓冲区范围",
                        ),
                    })
            }
            ChunkSource::Disk(path) => {
                let path = path.clone();
                let task_path = path.clone();
                let size = length as usize;

                tokio::task::spawn_blocking(move || {
                    let mut file = std::fs::File::open(&task_path)?;
                    file.seek(SeekFrom::Start(offset))?;

                    let mut buffer = vec![0u8; size];
                    file.read_exact(&mut buffer)?;
                    Ok::<_, std::io::Error>(buffer)
                })
                .await
                .map_err(|e| UploadError::Worker(e.to_string()))?
                .map_err(|source| UploadError::Io { path, source })
            }
        }
    }
}
