// src/cache/sdk_cache.rs

use dashmap::DashMap;
use tracing::debug;

use crate::model::ad_unit::{AdSize, AdUnitType, CacheAdUnit};
use crate::model::mapper::ad_unit_type_for_size;
use crate::model::slot::{Bid, CdbResponseSlot};

/// **竞价缓存**
///
/// 每个 `CacheAdUnit` 最多一条 `Bid`。过期不做后台清理，读取时由调用方判断。
/// 所有操作都是分片加锁的原子操作，可以在任意线程并发调用。
#[derive(Debug)]
pub struct SdkCache {
    entries: DashMap<CacheAdUnit, Bid>,
    screen_size: AdSize,
}

impl SdkCache {
    pub fn new(screen_size: AdSize) -> Self {
        Self {
            entries: DashMap::new(),
            screen_size,
        }
    }

    /// 按 slot 推断出的键插入（覆盖旧值），返回使用的键
    pub fn add(&self, bid: Bid) -> Option<CacheAdUnit> {
        let Some(key) = self.detect_cache_ad_unit(bid.slot()) else {
            debug!("Dropping bid without placement id");
            return None;
        };
        self.entries.insert(key.clone(), bid);
        Some(key)
    }

    pub fn peek(&self, key: &CacheAdUnit) -> Option<Bid> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &CacheAdUnit) -> Option<Bid> {
        self.entries.remove(key).map(|(_, bid)| bid)
    }

    /// 原子的“检查后删除”：predicate 在持有分片锁时执行
    pub fn remove_if<F>(&self, key: &CacheAdUnit, predicate: F) -> Option<Bid>
    where
        F: FnOnce(&Bid) -> bool,
    {
        self.entries
            .remove_if(key, |_, bid| predicate(bid))
            .map(|(_, bid)| bid)
    }

    /// 由 slot 自身反推缓存键：native → CustomNative，激励 → Rewarded，
    /// 满屏 → Interstitial，其余 → Banner
    pub fn detect_cache_ad_unit(&self, slot: &CdbResponseSlot) -> Option<CacheAdUnit> {
        let placement_id = slot.placement_id.as_deref().filter(|id| !id.is_empty())?;
        let size = AdSize::new(slot.width, slot.height);

        let ad_unit_type = if slot.is_native() {
            AdUnitType::CustomNative
        } else if slot.is_rewarded {
            AdUnitType::Rewarded
        } else {
            ad_unit_type_for_size(size, self.screen_size)
        };

        Some(CacheAdUnit::new(size, placement_id, ad_unit_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
