// src/config/settings.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::bidding::executor::ExecutorKind;
use crate::error::{SdkError, SdkResult};
use crate::model::ad_unit::AdSize;

fn default_network_timeout_ms() -> u64 {
    60_000
}

fn default_chunk_size() -> usize {
    8
}

fn default_screen_size() -> AdSize {
    AdSize::new(360, 640)
}

fn default_metric_batch_size() -> usize {
    10
}

fn default_metric_capacity() -> usize {
    1_000
}

fn default_remote_log_batch_size() -> usize {
    20
}

fn default_remote_log_capacity() -> usize {
    256
}

/// **SDK 静态配置**
///
/// 可以从 JSON 文件加载，未给出的字段使用默认值。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SdkSettings {
    pub cdb_url: String,
    pub cp_id: String,
    pub bundle_id: String,
    pub sdk_version: String,
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,
    #[serde(default)]
    pub executor: ExecutorKind,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_screen_size")]
    pub screen_size: AdSize,
    #[serde(default = "default_metric_batch_size")]
    pub metric_batch_size: usize,
    #[serde(default = "default_metric_capacity")]
    pub metric_capacity: usize,
    #[serde(default = "default_remote_log_batch_size")]
    pub remote_log_batch_size: usize,
    #[serde(default = "default_remote_log_capacity")]
    pub remote_log_capacity: usize,
}

impl SdkSettings {
    pub fn new(cdb_url: &str, cp_id: &str, bundle_id: &str, sdk_version: &str) -> Self {
        Self {
            cdb_url: cdb_url.trim_end_matches('/').to_string(),
            cp_id: cp_id.to_string(),
            bundle_id: bundle_id.to_string(),
            sdk_version: sdk_version.to_string(),
            network_timeout_ms: default_network_timeout_ms(),
            executor: ExecutorKind::default(),
            chunk_size: default_chunk_size(),
            screen_size: default_screen_size(),
            metric_batch_size: default_metric_batch_size(),
            metric_capacity: default_metric_capacity(),
            remote_log_batch_size: default_remote_log_batch_size(),
            remote_log_capacity: default_remote_log_capacity(),
        }
    }

    /// 从 JSON 文件读取配置
    pub fn from_file(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SdkError::Settings {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: SdkSettings = serde_json::from_str(&content)?;
        settings.cdb_url = settings.cdb_url.trim_end_matches('/').to_string();
        Ok(settings)
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_screen_size(mut self, screen_size: AdSize) -> Self {
        self.screen_size = screen_size;
        self
    }
}
