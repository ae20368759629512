//! 日志初始化
//!
//! 按 `[logging]` 配置选择输出目标（stdout / 追加文件 / 按天滚动文件）与格式（text / json）。

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use crate::config::LoggingConfig;
use crate::errors::{EngineError, Result};

const DEFAULT_LOG_NAME: &str = "commerce-engine.log";

/// 初始化全局 tracing subscriber
///
/// 返回的 `WorkerGuard` 必须在进程生命周期内保持存活，否则非阻塞写入的尾部日志会丢失。
/// 重复初始化（例如测试中）不会报错，后一次调用的 subscriber 会被忽略。
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let to_file = config.file.as_deref().is_some_and(|f| !f.is_empty());

    let writer: Box<dyn std::io::Write + Send + Sync> = match config.file.as_deref() {
        Some(log_file) if !log_file.is_empty() && config.enable_rotation => {
            let path = Path::new(log_file);
            let dir = path.parent().unwrap_or(Path::new("."));
            let filename = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or(DEFAULT_LOG_NAME);
            let appender = rolling::Builder::new()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix(filename.trim_end_matches(".log"))
                .filename_suffix("log")
                .max_log_files(config.max_backups as usize)
                .build(dir)
                .map_err(|e| {
                    EngineError::file_operation(format!("无法创建滚动日志 {}: {}", log_file, e))
                })?;
            Box::new(appender)
        }
        Some(log_file) if !log_file.is_empty() => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            Box::new(file)
        }
        _ => Box::new(std::io::stdout()),
    };

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(writer);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_target(true)
        .with_ansi(!to_file);

    let installed = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("[WARN] tracing subscriber already installed: {}", e);
    }

    Ok(guard)
}
