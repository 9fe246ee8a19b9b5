use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use fileshare_uploader::{
    cli::CliArgs,
    config::AppConfig,
    logging, ConsoleReporter, FileSelection, HttpTransport, OutputFormat, TaskStatus,
    UploadError, UploadTask,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 参数或配置校验失败
const EXIT_VALIDATION: u8 = 2;
/// 任务被取消（与 SIGINT 约定一致）
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // --help/--version 以及参数错误由 clap 输出并退出（错误退出码为 2）
    let args = CliArgs::parse();

    // 日志系统初始化前的错误只能直接打印
    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置无效: {:#}", e);
            return ExitCode::from(EXIT_VALIDATION);
        }
    };

    let _log_guard = logging::init_logging(&config.log);

    let selection = match build_selection(&args, &config) {
        Ok(selection) => selection,
        Err(e) => {
            error!("选择文件失败: {:#}", e);
            return ExitCode::from(EXIT_VALIDATION);
        }
    };

    match run(selection, &config, args.json).await {
        Ok(TaskStatus::Completed) => ExitCode::SUCCESS,
        Ok(TaskStatus::Cancelled) => ExitCode::from(EXIT_CANCELLED),
        Ok(_) => ExitCode::FAILURE,
        Err(e) => match e.downcast_ref::<UploadError>() {
            Some(UploadError::EmptySelection) => {
                error!("{}", UploadError::EmptySelection);
                eprintln!("\n{}", CliArgs::command().render_help());
                ExitCode::from(EXIT_VALIDATION)
            }
            _ => {
                error!("上传失败: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

/// 加载配置文件（不存在时使用默认配置）并应用命令行覆盖
async fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = if Path::new(&args.config_path).exists() {
        AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("加载配置文件失败: {}", args.config_path))?
    } else {
        AppConfig::default()
    };

    args.apply(&mut config);
    config.upload.validate()?;
    Ok(config)
}

/// 构建上传队列：位置参数中的目录按文件夹处理
fn build_selection(args: &CliArgs, config: &AppConfig) -> Result<FileSelection> {
    let mut selection = FileSelection::with_options(config.upload.scan_options());

    for path in &args.paths {
        if path.is_dir() {
            selection.add_folder(path)?;
        } else {
            selection.add_file(path)?;
        }
    }
    for folder in &args.folders {
        selection.add_folder(folder)?;
    }

    Ok(selection)
}

async fn run(selection: FileSelection, config: &AppConfig, json: bool) -> Result<TaskStatus> {
    let upload = &config.upload;
    let transport = HttpTransport::new(&upload.endpoint, &upload.upload_path, &upload.destination)
        .context("创建 HTTP 客户端失败")?;
    info!(
        "上传地址: {}, 分片大小={}MB, 并发分片数={}",
        transport.upload_url(),
        upload.chunk_size_mb,
        upload.parallel_chunks
    );

    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let reporter = Arc::new(ConsoleReporter::new(
        format,
        &upload.endpoint,
        &upload.destination,
    ));

    let mut task = UploadTask::new(Arc::new(transport), upload.scheduler_options(), reporter);

    // Ctrl-C 取消任务
    let controller = task.controller();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl-C，正在取消上传");
            controller.cancel();
        }
    });

    let result = task.start(selection.into_entries()).await;
    ctrl_c.abort();
    let status = result?;

    info!(
        "上传结束: task={}, 状态={}, 已上传 {} / {} bytes",
        task.id(),
        status,
        task.uploaded_bytes(),
        task.total_size()
    );
    Ok(status)
}
