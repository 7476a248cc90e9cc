// src/network/bid_request_sender.rs

use dashmap::DashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bidding::listener::BidLifecycleListener;
use crate::config::settings::SdkSettings;
use crate::error::SdkResult;
use crate::model::ad_unit::CacheAdUnit;
use crate::model::cdb::{
    CdbRequest, CdbRequestSlot, CdbResponse, ContextData, Publisher, RemoteConfigRequest,
    RemoteConfigResponse, User,
};
use crate::model::integration::IntegrationRegistry;
use crate::network::pub_sdk_api::PubSdkApi;

/// **CDB 请求发送器**
///
/// 负责组装请求、调用网络客户端并通知生命周期观察者。
/// 同时维护在途登记表：同一个缓存键在上一次缓存拉取结束前不会重复拉取。
pub struct BidRequestSender {
    cp_id: String,
    bundle_id: String,
    sdk_version: String,
    integrations: Arc<IntegrationRegistry>,
    api: Arc<dyn PubSdkApi>,
    lifecycle: Arc<dyn BidLifecycleListener>,
    pending: DashSet<CacheAdUnit>,
}

impl BidRequestSender {
    pub fn new(
        settings: &SdkSettings,
        integrations: Arc<IntegrationRegistry>,
        api: Arc<dyn PubSdkApi>,
        lifecycle: Arc<dyn BidLifecycleListener>,
    ) -> Self {
        Self {
            cp_id: settings.cp_id.clone(),
            bundle_id: settings.bundle_id.clone(),
            sdk_version: settings.sdk_version.clone(),
            integrations,
            api,
            lifecycle,
            pending: DashSet::new(),
        }
    }

    pub fn api(&self) -> &Arc<dyn PubSdkApi> {
        &self.api
    }

    /// 每个广告位生成新的 impId
    pub fn create_cdb_request(&self, keys: &[CacheAdUnit], context: &ContextData) -> CdbRequest {
        CdbRequest {
            id: Uuid::new_v4().to_string(),
            publisher: Publisher {
                bundle_id: self.bundle_id.clone(),
                cp_id: self.cp_id.clone(),
                ext: context.clone(),
            },
            user: User::default(),
            sdk_version: self.sdk_version.clone(),
            profile_id: self.integrations.profile_id(),
            slots: keys
                .iter()
                .map(|key| CdbRequestSlot::new(Uuid::new_v4().to_string(), key))
                .collect(),
        }
    }

    pub fn create_config_request(&self) -> RemoteConfigRequest {
        RemoteConfigRequest {
            cp_id: self.cp_id.clone(),
            bundle_id: self.bundle_id.clone(),
            sdk_version: self.sdk_version.clone(),
            rtb_profile_id: self.integrations.profile_id(),
            device_os: User::default().device_os,
        }
    }

    /// 登记在途键，返回之前不在途、本次需要真正拉取的键
    pub fn register_pending(&self, keys: Vec<CacheAdUnit>) -> Vec<CacheAdUnit> {
        keys.into_iter()
            .filter(|key| {
                let fresh = self.pending.insert(key.clone());
                if !fresh {
                    debug!(ad_unit = %key, "Fetch already in flight, skipping");
                }
                fresh
            })
            .collect()
    }

    /// 登记在途键，返回的 guard drop 时自动释放
    pub fn claim_pending(self: &Arc<Self>, keys: Vec<CacheAdUnit>) -> PendingKeys {
        PendingKeys {
            keys: self.register_pending(keys),
            sender: Arc::clone(self),
        }
    }

    pub fn release_pending(&self, keys: &[CacheAdUnit]) {
        for key in keys {
            self.pending.remove(key);
        }
    }

    pub fn is_pending(&self, key: &CacheAdUnit) -> bool {
        self.pending.contains(key)
    }

    /// 发起 CDB 调用并通知 started → finished | failed
    pub async fn fetch(&self, request: &CdbRequest) -> SdkResult<CdbResponse> {
        self.lifecycle.on_cdb_call_started(request);
        let start = Instant::now();

        match self.api.load_cdb(request).await {
            Ok(response) => {
                debug!(
                    request_id = %request.id,
                    slots = response.slots.len(),
                    time_to_next_call = response.time_to_next_call,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "CDB call finished"
                );
                self.lifecycle.on_cdb_call_finished(request, &response);
                Ok(response)
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "CDB call failed");
                self.lifecycle.on_cdb_call_failed(request, &e);
                Err(e)
            }
        }
    }

    pub async fn fetch_config(&self) -> SdkResult<RemoteConfigResponse> {
        let request = self.create_config_request();
        self.api.load_config(&request).await.inspect_err(|e| {
            warn!(error = %e, "Remote config call failed");
        })
    }
}

/// 一次缓存拉取占用的在途键
pub struct PendingKeys {
    keys: Vec<CacheAdUnit>,
    sender: Arc<BidRequestSender>,
}

impl PendingKeys {
    pub fn keys(&self) -> &[CacheAdUnit] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Drop for PendingKeys {
    fn drop(&mut self) {
        self.sender.release_pending(&self.keys);
    }
}
