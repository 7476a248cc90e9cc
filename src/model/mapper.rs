// src/model/mapper.rs

use std::collections::HashSet;

use crate::model::ad_unit::{AdSize, AdUnit, AdUnitType, CacheAdUnit};

/// 原生广告在 CDB 请求里固定使用 2x2
pub const NATIVE_SIZE: AdSize = AdSize::new(2, 2);

/// 广告位 → 缓存键。返回 None 表示无法映射（直接按 no bid 处理）。
pub trait AdUnitMapper: Send + Sync {
    fn map(&self, ad_unit: &AdUnit) -> Option<CacheAdUnit>;

    /// 批量映射并切块，分块策略由 mapper 自己决定
    fn map_to_chunks(&self, ad_units: &[AdUnit]) -> Vec<Vec<CacheAdUnit>>;
}

#[derive(Debug, Clone)]
pub struct DefaultAdUnitMapper {
    screen_size: AdSize,
    chunk_size: usize,
}

impl DefaultAdUnitMapper {
    pub fn new(screen_size: AdSize, chunk_size: usize) -> Self {
        Self {
            screen_size,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl AdUnitMapper for DefaultAdUnitMapper {
    fn map(&self, ad_unit: &AdUnit) -> Option<CacheAdUnit> {
        let ad_unit_id = ad_unit.ad_unit_id();
        if ad_unit_id.trim().is_empty() {
            return None;
        }

        let size = match ad_unit {
            AdUnit::Banner { size, .. } => *size,
            AdUnit::Interstitial { .. } | AdUnit::Rewarded { .. } => self.screen_size,
            AdUnit::Native { .. } => NATIVE_SIZE,
        };
        if size.width == 0 || size.height == 0 {
            return None;
        }

        // 满屏 banner 的响应 slot 在缓存里会被识别成插屏，两边必须一致
        let ad_unit_type = match ad_unit {
            AdUnit::Banner { .. } => ad_unit_type_for_size(size, self.screen_size),
            _ => ad_unit.ad_unit_type(),
        };
        Some(CacheAdUnit::new(size, ad_unit_id, ad_unit_type))
    }

    fn map_to_chunks(&self, ad_units: &[AdUnit]) -> Vec<Vec<CacheAdUnit>> {
        let mut seen = HashSet::new();
        let keys: Vec<CacheAdUnit> = ad_units
            .iter()
            .filter_map(|unit| self.map(unit))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        keys.chunks(self.chunk_size).map(<[_]>::to_vec).collect()
    }
}

/// 按尺寸推断缓存键类型：满屏（或旋转后满屏）视为插屏
pub fn ad_unit_type_for_size(size: AdSize, screen_size: AdSize) -> AdUnitType {
    if size == screen_size || size == screen_size.rotated() {
        AdUnitType::Interstitial
    } else {
        AdUnitType::Banner
    }
}
