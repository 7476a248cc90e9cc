// src/model/integration.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::model::ad_unit::AdUnitType;

/// 媒体接入方式，决定 CDB 请求里的 profile id 以及可用的广告格式
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum Integration {
    Fallback = 0,
    Standalone = 1,
    InHouse = 2,
    MopubMediation = 3,
    MopubAppBidding = 4,
    AdmobMediation = 5,
    GamAppBidding = 6,
    CustomAppBidding = 7,
}

impl Integration {
    pub fn profile_id(self) -> i32 {
        match self {
            Integration::Fallback => 235,
            Integration::Standalone => 295,
            Integration::InHouse => 296,
            Integration::MopubMediation => 297,
            Integration::MopubAppBidding => 298,
            Integration::AdmobMediation => 299,
            Integration::GamAppBidding => 300,
            Integration::CustomAppBidding => 301,
        }
    }

    /// 广告格式支持矩阵。激励视频只在部分接入方式下可用。
    pub fn supports(self, ad_unit_type: AdUnitType) -> bool {
        match ad_unit_type {
            AdUnitType::Banner | AdUnitType::Interstitial | AdUnitType::CustomNative => true,
            AdUnitType::Rewarded => matches!(
                self,
                Integration::Standalone
                    | Integration::InHouse
                    | Integration::MopubAppBidding
                    | Integration::GamAppBidding
                    | Integration::CustomAppBidding
            ),
        }
    }
}

impl TryFrom<u8> for Integration {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Integration::Fallback),
            1 => Ok(Integration::Standalone),
            2 => Ok(Integration::InHouse),
            3 => Ok(Integration::MopubMediation),
            4 => Ok(Integration::MopubAppBidding),
            5 => Ok(Integration::AdmobMediation),
            6 => Ok(Integration::GamAppBidding),
            7 => Ok(Integration::CustomAppBidding),
            _ => Err(format!("Invalid value for Integration: {}", value)),
        }
    }
}

impl From<Integration> for u8 {
    fn from(integration: Integration) -> Self {
        integration as u8
    }
}

impl fmt::Display for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Integration::Fallback => "FALLBACK",
            Integration::Standalone => "STANDALONE",
            Integration::InHouse => "IN_HOUSE",
            Integration::MopubMediation => "MOPUB_MEDIATION",
            Integration::MopubAppBidding => "MOPUB_APP_BIDDING",
            Integration::AdmobMediation => "ADMOB_MEDIATION",
            Integration::GamAppBidding => "GAM_APP_BIDDING",
            Integration::CustomAppBidding => "CUSTOM_APP_BIDDING",
        };
        f.write_str(name)
    }
}

/// 当前接入方式的登记处，多线程读写
#[derive(Debug)]
pub struct IntegrationRegistry {
    current: AtomicU8,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(Integration::Fallback.into()),
        }
    }

    pub fn declare(&self, integration: Integration) {
        self.current.store(integration.into(), Ordering::SeqCst);
    }

    pub fn read_integration(&self) -> Integration {
        Integration::try_from(self.current.load(Ordering::SeqCst)).unwrap_or(Integration::Fallback)
    }

    pub fn profile_id(&self) -> i32 {
        self.read_integration().profile_id()
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
