// 配置管理模块

use crate::uploader::{ScanOptions, SchedulerOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 分片大小上限（MB）
pub const MAX_CHUNK_SIZE_MB: u64 = 1024;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 文件服务器地址
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 上传接口路径
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// 服务器上的目标目录
    #[serde(default = "default_destination")]
    pub destination: String,
    /// 分片大小 (MB)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 每个文件最大并发分片数
    #[serde(default = "default_parallel_chunks")]
    pub parallel_chunks: usize,
    /// 扫描文件夹时跳过隐藏文件
    #[serde(default)]
    pub skip_hidden_files: bool,
    /// 扫描文件夹时跟随符号链接
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_upload_path() -> String {
    "/upload".to_string()
}

fn default_destination() -> String {
    "/".to_string()
}

fn default_chunk_size_mb() -> u64 {
    4
}

fn default_parallel_chunks() -> usize {
    4
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            upload_path: default_upload_path(),
            destination: default_destination(),
            chunk_size_mb: default_chunk_size_mb(),
            parallel_chunks: default_parallel_chunks(),
            skip_hidden_files: false,
            follow_symlinks: false,
        }
    }
}

impl UploadConfig {
    /// 校验上传配置
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_mb == 0 {
            anyhow::bail!("分片大小必须大于 0 MB");
        }
        if self.chunk_size_mb > MAX_CHUNK_SIZE_MB {
            anyhow::bail!(
                "分片大小不能超过 {} MB: {}",
                MAX_CHUNK_SIZE_MB,
                self.chunk_size_mb
            );
        }
        if self.parallel_chunks == 0 {
            anyhow::bail!("并发分片数必须大于 0");
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            anyhow::bail!("服务器地址必须以 http:// 或 https:// 开头: {}", self.endpoint);
        }
        if self.destination.split(['/', '\\']).any(|part| part == "..") {
            anyhow::bail!("目标目录不能包含 '..': {}", self.destination);
        }
        Ok(())
    }

    /// 分片大小（字节）
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            chunk_size: self.chunk_size_bytes(),
            parallel_chunks: self.parallel_chunks,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden_files,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传配置验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.upload
            .validate()
            .context("保存配置失败：上传配置无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载配置，失败时使用默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.endpoint, "http://127.0.0.1:8080");
        assert_eq!(config.upload.upload_path, "/upload");
        assert_eq!(config.upload.destination, "/");
        assert_eq!(config.upload.chunk_size_bytes(), 4 * 1024 * 1024);
        assert_eq!(config.upload.parallel_chunks, 4);
        assert!(!config.log.enabled);
        assert_eq!(config.log.log_dir, PathBuf::from("logs"));
        assert_eq!(config.log.retention_days, 7);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.max_file_size, 50 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/app.toml");
        let path = path.to_str().unwrap();

        let mut config = AppConfig::default();
        config.upload.destination = "/photos/2024".to_string();
        config.upload.parallel_chunks = 8;
        config.log.enabled = true;
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.upload.destination, "/photos/2024");
        assert_eq!(loaded.upload.parallel_chunks, 8);
        assert!(loaded.log.enabled);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.toml");
        std::fs::write(&path, "[upload]\nchunk_size_mb = 1\n").unwrap();

        let loaded = AppConfig::load_from_file(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(loaded.upload.chunk_size_bytes(), 1024 * 1024);
        assert_eq!(loaded.upload.parallel_chunks, 4);
        assert_eq!(loaded.upload.endpoint, "http://127.0.0.1:8080");
        assert_eq!(loaded.log.level, "info");
    }

    #[tokio::test]
    async fn test_load_or_default_on_missing_or_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        let config = AppConfig::load_or_default(missing.to_str().unwrap()).await;
        assert_eq!(config.upload.parallel_chunks, 4);

        let invalid = temp_dir.path().join("invalid.toml");
        std::fs::write(&invalid, "[upload]\nparallel_chunks = 0\n").unwrap();
        assert!(AppConfig::load_from_file(invalid.to_str().unwrap())
            .await
            .is_err());
        let config = AppConfig::load_or_default(invalid.to_str().unwrap()).await;
        assert_eq!(config.upload.parallel_chunks, 4);
    }

    #[test]
    fn test_upload_config_validation() {
        let mut config = UploadConfig::default();
        assert!(config.validate().is_ok());

        config.chunk_size_mb = 0;
        assert!(config.validate().is_err());
        config.chunk_size_mb = MAX_CHUNK_SIZE_MB;
        assert!(config.validate().is_ok());
        config.chunk_size_mb = MAX_CHUNK_SIZE_MB + 1;
        assert!(config.validate().is_err());
        config.chunk_size_mb = 4;

        config.parallel_chunks = 0;
        assert!(config.validate().is_err());
        config.parallel_chunks = 4;

        config.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
        config.endpoint = "https://files.example.com".to_string();
        assert!(config.validate().is_ok());

        config.destination = "/photos/../etc".to_string();
        assert!(config.validate().is_err());
        config.destination = "/photos/..hidden".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_chunk_is_rejected_without_overflow() {
        let config = UploadConfig {
            chunk_size_mb: u64::MAX / 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.chunk_size_bytes(), u64::MAX);
    }

    #[test]
    fn test_derived_options() {
        let config = UploadConfig {
            chunk_size_mb: 2,
            parallel_chunks: 3,
            skip_hidden_files: true,
            ..Default::default()
        };
        let options = config.scheduler_options();
        assert_eq!(options.chunk_size, 2 * 1024 * 1024);
        assert_eq!(options.parallel_chunks, 3);

        let scan = config.scan_options();
        assert!(scan.skip_hidden);
        assert!(!scan.follow_symlinks);
    }
}
