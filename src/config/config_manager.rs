// src/config/config_manager.rs

use std::sync::{Arc, RwLock};
use tracing::info;

use crate::model::cdb::RemoteConfigResponse;

/// 远程配置的一次完整快照。每次决策只读一次，永远不会被部分更新。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub kill_switch_enabled: bool,
    pub prefetch_on_init_enabled: bool,
    pub live_bidding_enabled: bool,
    pub live_bidding_time_budget_ms: u64,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            kill_switch_enabled: false,
            prefetch_on_init_enabled: true,
            live_bidding_enabled: false,
            live_bidding_time_budget_ms: 8_000,
        }
    }
}

/// **远程配置管理**
///
/// 快照整体替换，读取只是一次 `Arc` clone。
#[derive(Debug, Default)]
pub struct ConfigManager {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigManager {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// 合并远程配置，缺失的字段保持原值
    pub fn refresh_config(&self, response: &RemoteConfigResponse) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = Arc::clone(&*guard);
        let next = ConfigSnapshot {
            kill_switch_enabled: response.kill_switch.unwrap_or(previous.kill_switch_enabled),
            prefetch_on_init_enabled: response
                .prefetch_on_init_enabled
                .unwrap_or(previous.prefetch_on_init_enabled),
            live_bidding_enabled: response
                .live_bidding_enabled
                .unwrap_or(previous.live_bidding_enabled),
            live_bidding_time_budget_ms: response
                .live_bidding_time_budget_in_millis
                .unwrap_or(previous.live_bidding_time_budget_ms),
        };

        if next != *previous {
            info!(
                kill_switch = next.kill_switch_enabled,
                prefetch_on_init = next.prefetch_on_init_enabled,
                live_bidding = next.live_bidding_enabled,
                time_budget_ms = next.live_bidding_time_budget_ms,
                "Remote config updated"
            );
        }
        *guard = Arc::new(next);
    }

    pub fn is_kill_switch_enabled(&self) -> bool {
        self.snapshot().kill_switch_enabled
    }
}
