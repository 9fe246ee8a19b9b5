// 命令行参数解析

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// 分片上传客户端：把本地文件/文件夹上传到文件分享服务器
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "fileshare-upload",
    version,
    about = "把本地文件/文件夹按分片并发上传到文件分享服务器"
)]
pub struct CliArgs {
    /// 要上传的文件或文件夹（目录按文件夹处理）
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// 添加文件夹（可重复）
    #[arg(long = "folder", value_name = "DIR")]
    pub folders: Vec<PathBuf>,

    /// 服务器上的目标目录（默认 /）
    #[arg(short = 'd', long = "dest", value_name = "DIR")]
    pub destination: Option<String>,

    /// 服务器地址（默认 http://127.0.0.1:8080）
    #[arg(short = 'e', long = "endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// 每个文件的最大并发分片数（默认 4）
    #[arg(short = 'j', long = "parallel", value_name = "N")]
    pub parallel: Option<usize>,

    /// 分片大小，单位 MB（默认 4）
    #[arg(long = "chunk-size-mb", value_name = "N")]
    pub chunk_size_mb: Option<u64>,

    /// 配置文件路径
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: String,

    /// 以 JSON 行输出上传事件
    #[arg(long = "json")]
    pub json: bool,

    /// 提高日志级别（-v 为 debug，-vv 为 trace）
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    /// 命令行参数覆盖配置文件
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(destination) = &self.destination {
            config.upload.destination = destination.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.upload.endpoint = endpoint.clone();
        }
        if let Some(parallel) = self.parallel {
            config.upload.parallel_chunks = parallel;
        }
        if let Some(chunk_size_mb) = self.chunk_size_mb {
            config.upload.chunk_size_mb = chunk_size_mb;
        }
        match self.verbose {
            0 => {}
            1 => config.log.level = "debug".to_string(),
            _ => config.log.level = "trace".to_string(),
        }
    }
}
