// src/network/pub_sdk_api.rs

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::settings::SdkSettings;
use crate::error::{SdkError, SdkResult};
use crate::model::cdb::{
    CdbRequest, CdbResponse, MetricRequest, RemoteConfigRequest, RemoteConfigResponse,
    RemoteLogRecords,
};

const CDB_PATH: &str = "/inapp/v2";
const CONFIG_PATH: &str = "/config/app";
const CSM_PATH: &str = "/csm";
const LOGS_PATH: &str = "/inapp/logs";

/// **CDB 网络客户端**
///
/// 空的 slot 列表是正常的成功响应，失败一律通过 `SdkError` 返回。
#[async_trait]
pub trait PubSdkApi: Send + Sync {
    async fn load_cdb(&self, request: &CdbRequest) -> SdkResult<CdbResponse>;

    async fn load_config(&self, request: &RemoteConfigRequest) -> SdkResult<RemoteConfigResponse>;

    async fn post_csm(&self, request: &MetricRequest) -> SdkResult<()>;

    async fn post_logs(&self, records: &[RemoteLogRecords]) -> SdkResult<()>;
}

/// 基于 reqwest 的实现
pub struct HttpPubSdkApi {
    client: Client,
    base_url: String,
}

impl HttpPubSdkApi {
    pub fn new(settings: &SdkSettings) -> SdkResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.network_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.cdb_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST JSON，返回响应 body。只有 200 / 204 算成功。
    async fn post<T>(&self, path: &str, body: &T) -> SdkResult<String>
    where
        T: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), elapsed_ms = start.elapsed().as_millis() as u64, "HTTP call done");
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(SdkError::HttpStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }

    fn parse_or_default<R>(body: &str) -> SdkResult<R>
    where
        R: DeserializeOwned + Default,
    {
        if body.trim().is_empty() {
            return Ok(R::default());
        }
        Ok(serde_json::from_str(body)?)
    }
}

#[async_trait]
impl PubSdkApi for HttpPubSdkApi {
    async fn load_cdb(&self, request: &CdbRequest) -> SdkResult<CdbResponse> {
        let body = self.post(CDB_PATH, request).await?;
        Self::parse_or_default(&body)
    }

    async fn load_config(&self, request: &RemoteConfigRequest) -> SdkResult<RemoteConfigResponse> {
        let body = self.post(CONFIG_PATH, request).await?;
        Self::parse_or_default(&body)
    }

    async fn post_csm(&self, request: &MetricRequest) -> SdkResult<()> {
        self.post(CSM_PATH, request).await.map(|_| ())
    }

    async fn post_logs(&self, records: &[RemoteLogRecords]) -> SdkResult<()> {
        self.post(LOGS_PATH, records).await.map(|_| ())
    }
}
