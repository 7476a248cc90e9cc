// src/error.rs

use thiserror::Error;

/// SDK 内部错误类型
///
/// 这些错误不会抛给发起竞价的调用方，只通过 `BidLifecycleListener` 和日志暴露。
#[derive(Error, Debug)]
pub enum SdkError {
    /// 网络传输失败（连接、超时、读取 body）
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 服务端返回了非 200/204 的状态码
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// JSON 编解码失败
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// 读取配置文件失败
    #[error("unable to read settings file {path}: {source}")]
    Settings {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 全局 tracing subscriber 已经安装过
    #[error("unable to install tracing subscriber: {0}")]
    TracingInit(#[from] tracing_subscriber::util::TryInitError),
}

pub type SdkResult<T> = Result<T, SdkError>;
