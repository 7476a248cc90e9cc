// src/logging/mod.rs

pub mod csm;
pub mod remote_log;

use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::SdkResult;
use crate::logging::remote_log::{RemoteLogLayer, RemoteLogQueue};

/// **初始化全局 tracing 日志**
///
/// - JSON 格式按小时滚动写入 `log_dir/pubsdk_log.json`
/// - WARN 及以上的 SDK 事件同时进入远程日志队列
///
/// 返回的 guard 需要宿主一直持有，drop 时会刷新剩余日志。
pub fn init_tracing(log_dir: &str, remote_logs: Arc<RemoteLogQueue>) -> SdkResult<WorkerGuard> {
    let log_file = rolling::hourly(log_dir, "pubsdk_log.json");
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(non_blocking))
        .with(RemoteLogLayer::new(remote_logs))
        .try_init()?;

    Ok(guard)
}
