// 上传文件选择
//
// 负责:
// - 收集单独选择的文件
// - 递归扫描文件夹，保留目录结构
// - 生成有序的上传队列（单独文件在前，文件夹内容在后）

use crate::uploader::{format_size, FileEntry};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 文件夹扫描配置
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
}

/// 文件选择
///
/// 文件夹内的文件路径形如 `<文件夹名>/<相对路径>`，分隔符统一为 `/`。
#[derive(Debug, Default)]
pub struct FileSelection {
    options: ScanOptions,
    /// 单独选择的文件
    files: Vec<FileEntry>,
    /// 文件夹扫描得到的文件
    folder_files: Vec<FileEntry>,
}

impl FileSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// 添加单个文件，显示路径为文件名
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("读取文件元数据失败: {}", path.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("不是文件: {}", path.display());
        }

        let name = path
            .file_name()
            .with_context(|| format!("无法获取文件名: {}", path.display()))?
            .to_string_lossy()
            .into_owned();

        debug!("选择文件: {} ({})", name, format_size(metadata.len() as f64));
        self.files
            .push(FileEntry::with_size(path.to_path_buf(), name, metadata.len()));
        Ok(())
    }

    /// 递归扫描文件夹并添加其中的所有文件
    ///
    /// # 参数
    /// - `root_path`: 要扫描的文件夹路径
    ///
    /// # 返回
    /// - 本次添加的文件数量
    pub fn add_folder<P: AsRef<Path>>(&mut self, root_path: P) -> Result<usize> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            anyhow::bail!("扫描路径不存在: {}", root_path.display());
        }
        if !root_path.is_dir() {
            anyhow::bail!("扫描路径不是文件夹: {}", root_path.display());
        }

        let folder_name = folder_name(root_path)?;
        info!("开始扫描文件夹: {}", root_path.display());

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root_path)
            .follow_links(self.options.follow_symlinks)
            .min_depth(1)
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && is_hidden(entry.file_name())));

        let mut scanned: Vec<(PathBuf, PathBuf, u64)> = Vec::new();
        for entry in walker {
            let entry =
                entry.with_context(|| format!("扫描文件夹失败: {}", root_path.display()))?;

            if !entry.file_type().is_file() {
                if !entry.file_type().is_dir() {
                    debug!("跳过非常规文件: {}", entry.path().display());
                }
                continue;
            }

            let size = entry
                .metadata()
                .with_context(|| format!("读取文件元数据失败: {}", entry.path().display()))?
                .len();
            let relative_path = entry
                .path()
                .strip_prefix(root_path)
                .with_context(|| {
                    format!(
                        "计算相对路径失败: {} (root: {})",
                        entry.path().display(),
                        root_path.display()
                    )
                })?
                .to_path_buf();

            scanned.push((entry.into_path(), relative_path, size));
        }

        // 按相对路径排序（保证目录结构的顺序）
        scanned.sort_by(|a, b| a.1.cmp(&b.1));

        let count = scanned.len();
        let total: u64 = scanned.iter().map(|(_, _, size)| size).sum();
        for (local_path, relative_path, size) in scanned {
            let display = format!("{}/{}", folder_name, to_slash(&relative_path));
            self.folder_files
                .push(FileEntry::with_size(local_path, display, size));
        }

        info!(
            "文件夹扫描完成: {} 个文件，总大小 {}",
            count,
            format_size(total as f64)
        );
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.folder_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .chain(self.folder_files.iter())
            .map(|f| f.size())
            .sum()
    }

    /// 上传队列：单独文件在前，文件夹内容在后
    pub fn into_entries(self) -> Vec<FileEntry> {
        let mut entries = self.files;
        entries.extend(self.folder_files);
        entries
    }
}

fn folder_name(root_path: &Path) -> Result<String> {
    if let Some(name) = root_path.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    // "." 或 ".." 之类的路径需要先解析
    let canonical = root_path
        .canonicalize()
        .with_context(|| format!("解析文件夹路径失败: {}", root_path.display()))?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("无法获取文件夹名: {}", root_path.display()))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
