// src/model/ad_unit.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// 广告尺寸（像素）
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

impl AdSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 横竖屏互换后的尺寸
    pub const fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// CDB 请求里的尺寸格式，例如 "320x50"
    pub fn formatted(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// 解析 "WxH" 格式
    pub fn parse(formatted: &str) -> Option<Self> {
        let (width, height) = formatted.split_once('x')?;
        Some(Self {
            width: width.trim().parse().ok()?,
            height: height.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for AdSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 广告位类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum AdUnitType {
    Banner = 1,
    Interstitial = 2,
    CustomNative = 3,
    Rewarded = 4,
}

impl TryFrom<u8> for AdUnitType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AdUnitType::Banner),
            2 => Ok(AdUnitType::Interstitial),
            3 => Ok(AdUnitType::CustomNative),
            4 => Ok(AdUnitType::Rewarded),
            _ => Err(format!("Invalid value for AdUnitType: {}", value)),
        }
    }
}

impl From<AdUnitType> for u8 {
    fn from(ad: AdUnitType) -> Self {
        ad as u8
    }
}

impl fmt::Display for AdUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdUnitType::Banner => "banner",
            AdUnitType::Interstitial => "interstitial",
            AdUnitType::CustomNative => "native",
            AdUnitType::Rewarded => "rewarded",
        };
        f.write_str(name)
    }
}

/// **媒体侧声明的广告位**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdUnit {
    Banner { ad_unit_id: String, size: AdSize },
    Interstitial { ad_unit_id: String },
    Rewarded { ad_unit_id: String },
    Native { ad_unit_id: String },
}

impl AdUnit {
    pub fn banner(ad_unit_id: &str, size: AdSize) -> Self {
        AdUnit::Banner {
            ad_unit_id: ad_unit_id.to_string(),
            size,
        }
    }

    pub fn interstitial(ad_unit_id: &str) -> Self {
        AdUnit::Interstitial {
            ad_unit_id: ad_unit_id.to_string(),
        }
    }

    pub fn rewarded(ad_unit_id: &str) -> Self {
        AdUnit::Rewarded {
            ad_unit_id: ad_unit_id.to_string(),
        }
    }

    pub fn native(ad_unit_id: &str) -> Self {
        AdUnit::Native {
            ad_unit_id: ad_unit_id.to_string(),
        }
    }

    pub fn ad_unit_id(&self) -> &str {
        match self {
            AdUnit::Banner { ad_unit_id, .. }
            | AdUnit::Interstitial { ad_unit_id }
            | AdUnit::Rewarded { ad_unit_id }
            | AdUnit::Native { ad_unit_id } => ad_unit_id,
        }
    }

    pub fn ad_unit_type(&self) -> AdUnitType {
        match self {
            AdUnit::Banner { .. } => AdUnitType::Banner,
            AdUnit::Interstitial { .. } => AdUnitType::Interstitial,
            AdUnit::Rewarded { .. } => AdUnitType::Rewarded,
            AdUnit::Native { .. } => AdUnitType::CustomNative,
        }
    }
}

/// 缓存键：(尺寸, 广告位 ID, 类型)。映射时创建，之后不再修改。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheAdUnit {
    pub size: AdSize,
    pub ad_unit_id: String,
    pub ad_unit_type: AdUnitType,
}

impl CacheAdUnit {
    pub fn new(size: AdSize, ad_unit_id: &str, ad_unit_type: AdUnitType) -> Self {
        Self {
            size,
            ad_unit_id: ad_unit_id.to_string(),
            ad_unit_type,
        }
    }
}

impl fmt::Display for CacheAdUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.ad_unit_id, self.size, self.ad_unit_type)
    }
}
