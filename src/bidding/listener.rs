// src/bidding/listener.rs

use crate::model::ad_unit::CacheAdUnit;
use crate::model::cdb::{CdbRequest, CdbResponse};
use crate::model::slot::Bid;
use crate::error::SdkError;

/// 单次竞价请求的结果回调，每次请求恰好回调一次
pub trait BidListener: Send + Sync {
    fn on_bid_response(&self, bid: Bid);

    fn on_no_bid(&self);
}

/// **竞价生命周期观察者**
///
/// 只做通知，不影响竞价流程；默认实现全部为空。
pub trait BidLifecycleListener: Send + Sync {
    fn on_sdk_initialized(&self) {}

    fn on_cdb_call_started(&self, _request: &CdbRequest) {}

    fn on_cdb_call_finished(&self, _request: &CdbRequest, _response: &CdbResponse) {}

    fn on_cdb_call_failed(&self, _request: &CdbRequest, _error: &SdkError) {}

    fn on_bid_cached(&self, _bid: &Bid) {}

    fn on_bid_consumed(&self, _key: &CacheAdUnit, _bid: &Bid) {}

    fn on_global_silent_mode_enabled(&self, _seconds: u32) {}
}

/// 什么都不做的生命周期观察者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLifecycleListener;

impl BidLifecycleListener for NoOpLifecycleListener {}

/// 发送一批客户端指标（CSM）
pub trait MetricBatchSender: Send + Sync {
    fn send_metric_batch(&self);
}

/// 发送一批远程日志
pub trait RemoteLogBatchSender: Send + Sync {
    fn send_remote_log_batch(&self);
}
