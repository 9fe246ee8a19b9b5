// 分片传输
//
// 每个数据分片和每个结束标记对应一次 POST 请求：
//   POST {endpoint}{upload_path}?dir={目标目录}
//   X-File-Name: 相对路径
//   X-Chunk-Offset: 分片起始偏移
//   X-Final-Chunk: true|false
//   Content-Type: application/octet-stream
// 服务器按偏移写入，所以分片可以乱序到达。

use crate::uploader::UploadError;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tracing::debug;

/// 文件名请求头
pub const HEADER_FILE_NAME: &str = "X-File-Name";
/// 分片偏移请求头
pub const HEADER_CHUNK_OFFSET: &str = "X-Chunk-Offset";
/// 结束标记请求头
pub const HEADER_FINAL_CHUNK: &str = "X-Final-Chunk";

/// 一次分片请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    /// 文件相对路径
    pub file_name: String,
    /// 分片起始偏移（结束标记为 0）
    pub offset: u64,
    /// 是否为结束标记
    pub is_final: bool,
    /// 分片数据（结束标记为空）
    pub body: Vec<u8>,
}

impl ChunkRequest {
    pub fn data(file_name: &str, offset: u64, body: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            offset,
            is_final: false,
            body,
        }
    }

    /// 结束标记：偏移 0、空正文、final 标志
    pub fn final_marker(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            offset: 0,
            is_final: true,
            body: Vec::new(),
        }
    }
}

/// 分片传输接口
///
/// 成功即服务器已确认该分片；取消由调度器在外层处理。
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn send(&self, request: ChunkRequest) -> Result<(), UploadError>;
}

/// 基于 HTTP 的分片传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpTransport {
    /// 创建 HTTP 传输
    ///
    /// # 参数
    /// * `endpoint` - 服务器地址，例如 `http://127.0.0.1:8080`
    /// * `upload_path` - 上传接口路径，例如 `/upload`
    /// * `destination` - 服务器上的目标目录
    pub fn new(endpoint: &str, upload_path: &str, destination: &str) -> Result<Self, UploadError> {
        // 不设置超时：请求挂起时任务会一直等待
        let client = reqwest::Client::builder()
            .user_agent(concat!("fileshare-upload/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, endpoint, upload_path, destination))
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: &str,
        upload_path: &str,
        destination: &str,
    ) -> Self {
        let upload_url = format!(
            "{}/{}?dir={}",
            endpoint.trim_end_matches('/'),
            upload_path.trim_start_matches('/'),
            urlencoding::encode(destination)
        );
        Self { client, upload_url }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send(&self, request: ChunkRequest) -> Result<(), UploadError> {
        // 文件名按原始 UTF-8 字节放入请求头
        let file_name = HeaderValue::from_bytes(request.file_name.as_bytes())
            .map_err(|_| UploadError::InvalidFileName(request.file_name.clone()))?;

        let size = request.body.len();
        let response = self
            .client
            .post(&self.upload_url)
            .header(HEADER_FILE_NAME, file_name)
            .header(HEADER_CHUNK_OFFSET, request.offset.to_string())
            .header(
                HEADER_FINAL_CHUNK,
                if request.is_final { "true" } else { "false" },
            )
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        debug!(
            "分片请求返回: file={}, offset={}, final={}, size={}, status={}",
            request.file_name, request.offset, request.is_final, size, status
        );

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::rejected(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url_encodes_destination() {
        let transport = HttpTransport::new("http://127.0.0.1:8080/", "/upload", "/photos/2024 trip")
            .unwrap();
        assert_eq!(
            transport.upload_url(),
            "http://127.0.0.1:8080/upload?dir=%2Fphotos%2F2024%20trip"
        );
    }

    #[test]
    fn test_final_marker_shape() {
        let marker = ChunkRequest::final_marker("dir/a.bin");
        assert_eq!(marker.offset, 0);
        assert!(marker.is_final);
        assert!(marker.body.is_empty());

        let data = ChunkRequest::data("dir/a.bin", 4096, vec![1, 2, 3]);
        assert!(!data.is_final);
        assert_eq!(data.offset, 4096);
    }
}
