// src/lib.rs

//! 移动端广告 SDK 的竞价生命周期核心：
//! 向 CDB 拉取竞价、缓存竞价、全局/广告位静默以及带时间预算的实时竞价。

pub mod bidding;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod network;

pub use bidding::bid_manager::{BidManager, SdkComponents};
pub use bidding::executor::{ExecutorKind, TaskExecutor};
pub use bidding::listener::{BidLifecycleListener, BidListener};
pub use cache::sdk_cache::SdkCache;
pub use clock::{Clock, SystemClock};
pub use config::config_manager::{ConfigManager, ConfigSnapshot};
pub use config::settings::SdkSettings;
pub use error::{SdkError, SdkResult};
pub use model::ad_unit::{AdSize, AdUnit, AdUnitType, CacheAdUnit};
pub use model::slot::{Bid, CdbResponseSlot};
