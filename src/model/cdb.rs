// src/model/cdb.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ad_unit::{AdSize, AdUnitType, CacheAdUnit};
use crate::model::slot::CdbResponseSlot;

/// 媒体传入的上下文数据，原样放进 publisher.ext
pub type ContextData = Map<String, Value>;

/// CDB 竞价请求
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CdbRequest {
    pub id: String,
    pub publisher: Publisher,
    pub user: User,
    pub sdk_version: String,
    pub profile_id: i32,
    pub slots: Vec<CdbRequestSlot>,
}

impl CdbRequest {
    pub fn slot_by_impression_id(&self, impression_id: &str) -> Option<&CdbRequestSlot> {
        self.slots.iter().find(|s| s.impression_id == impression_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub bundle_id: String,
    pub cp_id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub ext: ContextData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub device_id_type: String,
    pub device_os: String,
}

impl Default for User {
    fn default() -> Self {
        Self {
            device_id_type: "gaid".to_string(),
            device_os: "android".to_string(),
        }
    }
}

/// 请求里的单个广告位，impId 每次请求重新生成
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CdbRequestSlot {
    #[serde(rename = "impId")]
    pub impression_id: String,
    pub placement_id: String,
    pub sizes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_native: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interstitial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewarded: Option<bool>,
}

impl CdbRequestSlot {
    pub fn new(impression_id: String, key: &CacheAdUnit) -> Self {
        let flag = |t: AdUnitType| (key.ad_unit_type == t).then_some(true);
        Self {
            impression_id,
            placement_id: key.ad_unit_id.clone(),
            sizes: vec![key.size.formatted()],
            is_native: flag(AdUnitType::CustomNative),
            interstitial: flag(AdUnitType::Interstitial),
            rewarded: flag(AdUnitType::Rewarded),
        }
    }

    /// 反推出请求时使用的缓存键
    pub fn cache_ad_unit(&self) -> Option<CacheAdUnit> {
        let size = self.sizes.first().and_then(|s| AdSize::parse(s))?;
        let ad_unit_type = if self.is_native == Some(true) {
            AdUnitType::CustomNative
        } else if self.rewarded == Some(true) {
            AdUnitType::Rewarded
        } else if self.interstitial == Some(true) {
            AdUnitType::Interstitial
        } else {
            AdUnitType::Banner
        };
        Some(CacheAdUnit::new(size, &self.placement_id, ad_unit_type))
    }
}

/// CDB 竞价响应。空 body 等价于 `CdbResponse::default()`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CdbResponse {
    #[serde(default)]
    pub slots: Vec<CdbResponseSlot>,
    #[serde(default)]
    pub time_to_next_call: u32,
}

impl CdbResponse {
    pub fn slot_by_impression_id(&self, impression_id: &str) -> Option<&CdbResponseSlot> {
        self.slots
            .iter()
            .find(|s| s.impression_id.as_deref() == Some(impression_id))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigRequest {
    pub cp_id: String,
    pub bundle_id: String,
    pub sdk_version: String,
    pub rtb_profile_id: i32,
    pub device_os: String,
}

/// 远程配置；缺失的字段保持本地当前值
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_bidding_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_bidding_time_budget_in_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch_on_init_enabled: Option<bool>,
}

/// CSM 上报中单次曝光的数据
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSlot {
    pub impression_id: String,
    pub cached_bid_used: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricFeedback {
    pub slots: Vec<MetricSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<i64>,
    pub is_timeout: bool,
    pub cdb_call_start_elapsed: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdb_call_end_elapsed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_group_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequest {
    pub feedbacks: Vec<MetricFeedback>,
    pub wrapper_version: String,
    pub profile_id: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteLogRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLogContext {
    pub version: String,
    pub bundle_id: String,
    pub device_os: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteLogRecords {
    pub context: RemoteLogContext,
    pub errors: Vec<RemoteLogRecord>,
}
