// src/logging/csm.rs

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::bidding::executor::TaskExecutor;
use crate::bidding::listener::{BidLifecycleListener, MetricBatchSender};
use crate::clock::Clock;
use crate::error::SdkError;
use crate::model::ad_unit::CacheAdUnit;
use crate::model::cdb::{CdbRequest, CdbResponse, MetricFeedback, MetricRequest, MetricSlot};
use crate::model::integration::IntegrationRegistry;
use crate::model::slot::Bid;
use crate::network::pub_sdk_api::PubSdkApi;

/// **单次曝光的客户端指标**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Metric {
    pub impression_id: String,
    pub cdb_call_start_timestamp: Option<i64>,
    pub cdb_call_end_timestamp: Option<i64>,
    pub is_cdb_call_timeout: bool,
    pub is_cdb_call_failed: bool,
    pub elapsed_timestamp: Option<i64>, // 竞价被消费的时间
    pub ready_to_send: bool,
}

impl Metric {
    fn new(impression_id: &str) -> Self {
        Self {
            impression_id: impression_id.to_string(),
            ..Self::default()
        }
    }

    fn to_feedback(&self) -> MetricFeedback {
        let start = self.cdb_call_start_timestamp.unwrap_or_default();
        MetricFeedback {
            slots: vec![MetricSlot {
                impression_id: self.impression_id.clone(),
                cached_bid_used: self.elapsed_timestamp.is_some(),
            }],
            elapsed: self.elapsed_timestamp.map(|t| t - start),
            is_timeout: self.is_cdb_call_timeout,
            cdb_call_start_elapsed: 0,
            cdb_call_end_elapsed: self.cdb_call_end_timestamp.map(|t| t - start),
            request_group_id: None,
        }
    }
}

/// **客户端指标队列**
///
/// 只保存在内存中，按 impId 聚合；ready 的指标分批上报。
/// 最多保留 `capacity` 条，满了淘汰调用开始最早的一条。
pub struct MetricQueue {
    metrics: DashMap<String, Metric>,
    capacity: usize,
    api: Arc<dyn PubSdkApi>,
    executor: TaskExecutor,
    integrations: Arc<IntegrationRegistry>,
    sdk_version: String,
    batch_size: usize,
}

impl MetricQueue {
    pub fn new(
        api: Arc<dyn PubSdkApi>,
        executor: TaskExecutor,
        integrations: Arc<IntegrationRegistry>,
        sdk_version: &str,
        batch_size: usize,
        capacity: usize,
    ) -> Self {
        Self {
            metrics: DashMap::new(),
            capacity: capacity.max(1),
            api,
            executor,
            integrations,
            sdk_version: sdk_version.to_string(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn update<F>(&self, impression_id: &str, f: F)
    where
        F: FnOnce(&mut Metric),
    {
        if !self.metrics.contains_key(impression_id) && self.metrics.len() >= self.capacity {
            self.evict_oldest();
        }
        let mut entry = self
            .metrics
            .entry(impression_id.to_string())
            .or_insert_with(|| Metric::new(impression_id));
        f(entry.value_mut());
    }

    fn evict_oldest(&self) {
        // 没有开始时间的条目最先淘汰
        let oldest = self
            .metrics
            .iter()
            .min_by_key(|m| m.cdb_call_start_timestamp.unwrap_or(i64::MIN))
            .map(|m| m.key().clone());
        if let Some(id) = oldest {
            self.metrics.remove(&id);
            debug!(impression_id = %id, "Metric queue full, evicted oldest metric");
        }
    }

    pub fn get(&self, impression_id: &str) -> Option<Metric> {
        self.metrics.get(impression_id).map(|m| m.value().clone())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// 取出最多 batch_size 条 ready 的指标
    pub fn drain_ready(&self) -> Vec<Metric> {
        let ids: Vec<String> = self
            .metrics
            .iter()
            .filter(|m| m.ready_to_send)
            .take(self.batch_size)
            .map(|m| m.key().clone())
            .collect();

        ids.iter()
            .filter_map(|id| self.metrics.remove(id).map(|(_, metric)| metric))
            .collect()
    }
}

impl MetricBatchSender for MetricQueue {
    fn send_metric_batch(&self) {
        let batch = self.drain_ready();
        if batch.is_empty() {
            return;
        }

        let request = MetricRequest {
            feedbacks: batch.iter().map(Metric::to_feedback).collect(),
            wrapper_version: self.sdk_version.clone(),
            profile_id: self.integrations.profile_id(),
        };
        let api = Arc::clone(&self.api);
        self.executor.execute(async move {
            if let Err(e) = api.post_csm(&request).await {
                debug!(error = %e, dropped = request.feedbacks.len(), "CSM batch not delivered");
            }
        });
    }
}

/// 把竞价生命周期事件记到 `MetricQueue` 里
pub struct CsmBidLifecycleListener {
    queue: Arc<MetricQueue>,
    clock: Arc<dyn Clock>,
}

impl CsmBidLifecycleListener {
    pub fn new(queue: Arc<MetricQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }
}

impl BidLifecycleListener for CsmBidLifecycleListener {
    fn on_cdb_call_started(&self, request: &CdbRequest) {
        let now = self.clock.current_time_in_millis();
        for slot in &request.slots {
            self.queue.update(&slot.impression_id, |m| {
                m.cdb_call_start_timestamp = Some(now);
            });
        }
    }

    fn on_cdb_call_finished(&self, request: &CdbRequest, response: &CdbResponse) {
        let now = self.clock.current_time_in_millis();
        for slot in &request.slots {
            let has_bid = response
                .slot_by_impression_id(&slot.impression_id)
                .is_some_and(|s| s.is_valid());
            self.queue.update(&slot.impression_id, |m| {
                m.cdb_call_end_timestamp = Some(now);
                // 没有返回竞价的曝光不会再被消费，可以直接上报
                if !has_bid {
                    m.ready_to_send = true;
                }
            });
        }
    }

    fn on_cdb_call_failed(&self, request: &CdbRequest, error: &SdkError) {
        let is_timeout = matches!(error, SdkError::Network(e) if e.is_timeout());
        for slot in &request.slots {
            self.queue.update(&slot.impression_id, |m| {
                if is_timeout {
                    m.is_cdb_call_timeout = true;
                } else {
                    m.is_cdb_call_failed = true;
                }
                m.ready_to_send = true;
            });
        }
    }

    fn on_bid_consumed(&self, _key: &CacheAdUnit, bid: &Bid) {
        let Some(impression_id) = bid.slot().impression_id.as_deref() else {
            return;
        };
        let expired = bid.is_expired(self.clock.as_ref());
        let now = self.clock.current_time_in_millis();
        self.queue.update(impression_id, |m| {
            if !expired {
                m.elapsed_timestamp = Some(now);
            }
            m.ready_to_send = true;
        });
    }
}
