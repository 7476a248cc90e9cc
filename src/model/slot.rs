// src/model/slot.rs

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::clock::Clock;

/// 即时竞价（ttl = 0）写入缓存时使用的 ttl
pub const DEFAULT_TTL_IN_SECONDS: u32 = 900;

fn default_cpm() -> String {
    "0.0".to_string()
}

/// cpm 在 CDB 里是字符串（"1.12"），也兼容数字
fn lenient_cpm<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => default_cpm(),
        other => other.to_string(),
    })
}

/// isVideo / isRewarded 可能是 bool，也可能是 "true"/"false"
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// ttl 缺失、为负或非法时按 0 处理，避免整个响应解析失败
fn lenient_ttl<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let ttl = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    };
    Ok(u32::try_from(ttl).unwrap_or(u32::MAX))
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| url.scheme() == "http" || url.scheme() == "https")
        .unwrap_or(false)
}

/// 允许 deeplink，只要求是合法的绝对 URI
fn is_uri(value: &str) -> bool {
    Url::parse(value).is_ok()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NativeImage {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub width: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NativeProduct {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub click_url: String,
    #[serde(default)]
    pub call_to_action: String,
    #[serde(default)]
    pub image: NativeImage,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NativeAdvertiser {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub logo: NativeImage,
    #[serde(default)]
    pub logo_click_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NativePrivacy {
    #[serde(rename = "optoutClickUrl", default)]
    pub click_url: String,
    #[serde(rename = "optoutImageUrl", default)]
    pub image_url: String,
    #[serde(rename = "longLegalText", default)]
    pub legal_text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NativeImpressionPixel {
    #[serde(default)]
    pub url: String,
}

/// **原生广告素材**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NativeAssets {
    #[serde(default)]
    pub products: Vec<NativeProduct>,
    #[serde(default)]
    pub advertiser: NativeAdvertiser,
    #[serde(default)]
    pub privacy: NativePrivacy,
    #[serde(default)]
    pub impression_pixels: Vec<NativeImpressionPixel>,
}

impl NativeAssets {
    /// 素材是否完整：至少一个商品，所有 URL 可解析，至少一个曝光像素
    pub fn is_valid(&self) -> bool {
        let products_ok = !self.products.is_empty()
            && self
                .products
                .iter()
                .all(|p| is_uri(&p.click_url) && is_http_url(&p.image.url));
        let advertiser_ok =
            is_uri(&self.advertiser.logo_click_url) && is_http_url(&self.advertiser.logo.url);
        let privacy_ok = is_uri(&self.privacy.click_url) && is_http_url(&self.privacy.image_url);
        let pixels_ok = !self.impression_pixels.is_empty()
            && self.impression_pixels.iter().all(|p| is_http_url(&p.url));

        products_ok && advertiser_ok && privacy_ok && pixels_ok
    }
}

/// **CDB 返回的单个竞价**
///
/// 解析后不再修改；下载时间和被覆盖的 ttl 由 [`Bid`] 携带。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CdbResponseSlot {
    #[serde(rename = "impId", default, skip_serializing_if = "Option::is_none")]
    pub impression_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<i64>,
    #[serde(default = "default_cpm", deserialize_with = "lenient_cpm")]
    pub cpm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(rename = "ttl", default, deserialize_with = "lenient_ttl")]
    pub ttl_in_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(rename = "native", default, skip_serializing_if = "Option::is_none")]
    pub native_assets: Option<NativeAssets>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_video: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_rewarded: bool,
}

impl Default for CdbResponseSlot {
    fn default() -> Self {
        Self {
            impression_id: None,
            placement_id: None,
            zone_id: None,
            cpm: default_cpm(),
            currency: None,
            width: 0,
            height: 0,
            ttl_in_seconds: 0,
            display_url: None,
            native_assets: None,
            is_video: false,
            is_rewarded: false,
        }
    }
}

impl CdbResponseSlot {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// cpm 无法解析时返回 None
    pub fn cpm_as_number(&self) -> Option<f64> {
        self.cpm
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|cpm| cpm.is_finite())
    }

    pub fn is_native(&self) -> bool {
        self.native_assets.is_some()
    }

    /// 静默槽位：cpm = 0 且 ttl > 0，只表示“ttl 秒内不要再请求这个广告位”
    pub fn is_silent(&self) -> bool {
        self.cpm_as_number() == Some(0.0) && self.ttl_in_seconds > 0
    }

    /// 即时竞价：cpm > 0 且 ttl = 0
    pub fn is_immediate(&self) -> bool {
        self.cpm_as_number().is_some_and(|cpm| cpm > 0.0) && self.ttl_in_seconds == 0
    }

    pub fn is_valid(&self) -> bool {
        let cpm = match self.cpm_as_number() {
            Some(cpm) if cpm >= 0.0 => cpm,
            _ => return false,
        };

        if cpm == 0.0 {
            // cpm = 0 且 ttl = 0 是 no bid
            return self.ttl_in_seconds > 0;
        }

        match &self.native_assets {
            Some(assets) => assets.is_valid(),
            None => self.display_url.as_deref().is_some_and(is_http_url),
        }
    }
}

/// **缓存中的竞价**
///
/// 共享同一个不可变的 slot，自身携带生效 ttl 和下载时间。
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    slot: Arc<CdbResponseSlot>,
    ttl_in_seconds: u32,
    time_of_download: i64,
}

impl Bid {
    pub fn new(slot: CdbResponseSlot, time_of_download: i64) -> Self {
        Self::from_shared(Arc::new(slot), time_of_download)
    }

    pub fn from_shared(slot: Arc<CdbResponseSlot>, time_of_download: i64) -> Self {
        let ttl_in_seconds = slot.ttl_in_seconds;
        Self {
            slot,
            ttl_in_seconds,
            time_of_download,
        }
    }

    pub fn with_ttl_in_seconds(mut self, ttl_in_seconds: u32) -> Self {
        self.ttl_in_seconds = ttl_in_seconds;
        self
    }

    pub fn slot(&self) -> &CdbResponseSlot {
        &self.slot
    }

    pub fn shared_slot(&self) -> Arc<CdbResponseSlot> {
        Arc::clone(&self.slot)
    }

    pub fn ttl_in_seconds(&self) -> u32 {
        self.ttl_in_seconds
    }

    pub fn time_of_download(&self) -> i64 {
        self.time_of_download
    }

    pub fn cpm_as_number(&self) -> f64 {
        self.slot.cpm_as_number().unwrap_or(0.0)
    }

    pub fn is_silent(&self) -> bool {
        self.cpm_as_number() == 0.0 && self.ttl_in_seconds > 0
    }

    /// 有价格的真实竞价（即非静默、非 no bid）
    pub fn is_priced(&self) -> bool {
        self.cpm_as_number() > 0.0
    }

    /// time_of_download + ttl * 1000 <= now
    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        let expiry = self
            .time_of_download
            .saturating_add(i64::from(self.ttl_in_seconds) * 1000);
        expiry <= clock.current_time_in_millis()
    }
}
