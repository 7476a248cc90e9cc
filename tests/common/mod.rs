// tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

use rust_pubsdk::bidding::listener::{MetricBatchSender, RemoteLogBatchSender};
use rust_pubsdk::logging::remote_log::RemoteLogQueue;
use rust_pubsdk::model::cdb::{
    CdbRequest, CdbRequestSlot, CdbResponse, MetricRequest, RemoteConfigRequest,
    RemoteConfigResponse, RemoteLogRecords,
};
use rust_pubsdk::model::integration::IntegrationRegistry;
use rust_pubsdk::network::pub_sdk_api::PubSdkApi;
use rust_pubsdk::{
    AdSize, Bid, BidLifecycleListener, BidListener, BidManager, CacheAdUnit, CdbResponseSlot,
    Clock, ConfigManager, ExecutorKind, SdkCache, SdkComponents, SdkError, SdkResult, SdkSettings,
    TaskExecutor,
};

pub const BANNER_ID: &str = "/140800857/Endeavour_320x50";
pub const BANNER_SIZE: AdSize = AdSize::new(320, 50);
pub const SCREEN_SIZE: AdSize = AdSize::new(360, 640);
pub const DISPLAY_URL: &str = "https://publisherdirect.criteo.com/publishertag/preprodtest/FakeAJS.js";

type Responder = Box<dyn Fn(&CdbRequest) -> SdkResult<CdbResponse> + Send + Sync>;

/// 可编排的 CDB 客户端
pub struct MockPubSdkApi {
    responder: Mutex<Responder>,
    delay: Mutex<Duration>,
    queued_delays: Mutex<VecDeque<Duration>>,
    config: Mutex<SdkResult<RemoteConfigResponse>>,
    requests: Mutex<Vec<CdbRequest>>,
    config_calls: AtomicUsize,
    csm_calls: AtomicUsize,
    log_calls: AtomicUsize,
}

impl MockPubSdkApi {
    pub fn new() -> Self {
        Self {
            responder: Mutex::new(Box::new(|_| Ok(CdbResponse::default()))),
            delay: Mutex::new(Duration::ZERO),
            queued_delays: Mutex::new(VecDeque::new()),
            config: Mutex::new(Ok(RemoteConfigResponse::default())),
            requests: Mutex::new(Vec::new()),
            config_calls: AtomicUsize::new(0),
            csm_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
        }
    }

    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&CdbRequest) -> SdkResult<CdbResponse> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Box::new(responder);
    }

    /// 每个请求的广告位都返回同一个价格和 ttl
    pub fn respond_with_bids(&self, cpm: &'static str, ttl: u32, time_to_next_call: u32) {
        self.respond_with(move |request| {
            Ok(CdbResponse {
                slots: request.slots.iter().map(|s| slot_for(s, cpm, ttl)).collect(),
                time_to_next_call,
            })
        });
    }

    pub fn fail_cdb(&self) {
        self.respond_with(|_| Err(SdkError::HttpStatus(500)));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// 按调用顺序逐个使用的延迟，用完后回到 `set_delay` 的值
    pub fn queue_delays(&self, delays: &[Duration]) {
        self.queued_delays.lock().unwrap().extend(delays.iter().copied());
    }

    pub fn set_config(&self, config: SdkResult<RemoteConfigResponse>) {
        *self.config.lock().unwrap() = config;
    }

    pub fn cdb_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CdbRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PubSdkApi for MockPubSdkApi {
    async fn load_cdb(&self, request: &CdbRequest) -> SdkResult<CdbResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let queued = self.queued_delays.lock().unwrap().pop_front();
        let delay = queued.unwrap_or_else(|| *self.delay.lock().unwrap());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let responder = self.responder.lock().unwrap();
        (*responder)(request)
    }

    async fn load_config(&self, _request: &RemoteConfigRequest) -> SdkResult<RemoteConfigResponse> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.config.lock().unwrap() {
            Ok(config) => Ok(config.clone()),
            Err(_) => Err(SdkError::HttpStatus(503)),
        }
    }

    async fn post_csm(&self, _request: &MetricRequest) -> SdkResult<()> {
        self.csm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_logs(&self, _records: &[RemoteLogRecords]) -> SdkResult<()> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 可手动拨动的时钟
#[derive(Default)]
pub struct MockClock(AtomicI64);

impl MockClock {
    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn current_time_in_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    CallStarted,
    CallFinished,
    CallFailed,
    Cached(Bid),
    Consumed(CacheAdUnit, Bid),
    GlobalSilence(u32),
}

#[derive(Default)]
pub struct RecordingLifecycle {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycle {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn consumed(&self) -> Vec<(CacheAdUnit, Bid)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Consumed(key, bid) => Some((key, bid)),
                _ => None,
            })
            .collect()
    }

    pub fn cached(&self) -> Vec<Bid> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Cached(bid) => Some(bid),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &LifecycleEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl BidLifecycleListener for RecordingLifecycle {
    fn on_cdb_call_started(&self, _request: &CdbRequest) {
        self.push(LifecycleEvent::CallStarted);
    }

    fn on_cdb_call_finished(&self, _request: &CdbRequest, _response: &CdbResponse) {
        self.push(LifecycleEvent::CallFinished);
    }

    fn on_cdb_call_failed(&self, _request: &CdbRequest, _error: &SdkError) {
        self.push(LifecycleEvent::CallFailed);
    }

    fn on_bid_cached(&self, bid: &Bid) {
        self.push(LifecycleEvent::Cached(bid.clone()));
    }

    fn on_bid_consumed(&self, key: &CacheAdUnit, bid: &Bid) {
        self.push(LifecycleEvent::Consumed(key.clone(), bid.clone()));
    }

    fn on_global_silent_mode_enabled(&self, seconds: u32) {
        self.push(LifecycleEvent::GlobalSilence(seconds));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Bid(Bid),
    NoBid,
}

#[derive(Default)]
pub struct RecordingBidListener {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingBidListener {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    /// 必须恰好回调一次
    pub fn single(&self) -> Outcome {
        let outcomes = self.outcomes();
        assert_eq!(outcomes.len(), 1, "expected exactly one callback, got {outcomes:?}");
        outcomes[0].clone()
    }
}

impl BidListener for RecordingBidListener {
    fn on_bid_response(&self, bid: Bid) {
        self.outcomes.lock().unwrap().push(Outcome::Bid(bid));
    }

    fn on_no_bid(&self) {
        self.outcomes.lock().unwrap().push(Outcome::NoBid);
    }
}

#[derive(Default)]
pub struct CountingTelemetry {
    metrics: AtomicUsize,
    logs: AtomicUsize,
}

impl CountingTelemetry {
    pub fn metric_batches(&self) -> usize {
        self.metrics.load(Ordering::SeqCst)
    }

    pub fn log_batches(&self) -> usize {
        self.logs.load(Ordering::SeqCst)
    }
}

impl MetricBatchSender for CountingTelemetry {
    fn send_metric_batch(&self) {
        self.metrics.fetch_add(1, Ordering::SeqCst);
    }
}

impl RemoteLogBatchSender for CountingTelemetry {
    fn send_remote_log_batch(&self) {
        self.logs.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub manager: BidManager,
    pub api: Arc<MockPubSdkApi>,
    pub clock: Arc<MockClock>,
    pub lifecycle: Arc<RecordingLifecycle>,
    pub telemetry: Arc<CountingTelemetry>,
    pub cache: Arc<SdkCache>,
    pub config: Arc<ConfigManager>,
    pub integrations: Arc<IntegrationRegistry>,
}

pub fn settings(chunk_size: usize) -> SdkSettings {
    let mut settings = SdkSettings::new("http://localhost", "B-056946", "com.example.app", "4.0.0")
        .with_screen_size(SCREEN_SIZE);
    settings.chunk_size = chunk_size;
    settings
}

pub fn harness(kind: ExecutorKind) -> Harness {
    harness_with_chunk_size(kind, 8)
}

pub fn harness_with_chunk_size(kind: ExecutorKind, chunk_size: usize) -> Harness {
    let api = Arc::new(MockPubSdkApi::new());
    let clock = Arc::new(MockClock::default());
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let telemetry = Arc::new(CountingTelemetry::default());

    let settings = settings(chunk_size).with_executor(kind);
    let executor = TaskExecutor::new(kind, Handle::current());
    let components = SdkComponents {
        clock: clock.clone(),
        lifecycle: lifecycle.clone(),
        metrics: telemetry.clone(),
        remote_logs: telemetry.clone(),
        ..SdkComponents::new(settings, api.clone(), executor, Arc::new(RemoteLogQueue::new(16)))
    };

    let cache = Arc::clone(&components.cache);
    let config = Arc::clone(&components.config);
    let integrations = Arc::clone(&components.integrations);

    Harness {
        manager: BidManager::new(components),
        api,
        clock,
        lifecycle,
        telemetry,
        cache,
        config,
        integrations,
    }
}

pub fn banner_key() -> CacheAdUnit {
    CacheAdUnit::new(BANNER_SIZE, BANNER_ID, rust_pubsdk::AdUnitType::Banner)
}

/// 与请求广告位对应的响应 slot
pub fn slot_for(request_slot: &CdbRequestSlot, cpm: &str, ttl: u32) -> CdbResponseSlot {
    let key = request_slot.cache_ad_unit().expect("request slot has a size");
    CdbResponseSlot {
        impression_id: Some(request_slot.impression_id.clone()),
        placement_id: Some(request_slot.placement_id.clone()),
        cpm: cpm.to_string(),
        currency: Some("USD".to_string()),
        width: key.size.width,
        height: key.size.height,
        ttl_in_seconds: ttl,
        display_url: Some(DISPLAY_URL.to_string()),
        is_rewarded: request_slot.rewarded == Some(true),
        ..CdbResponseSlot::default()
    }
}

pub fn banner_slot(cpm: &str, ttl: u32) -> CdbResponseSlot {
    CdbResponseSlot {
        placement_id: Some(BANNER_ID.to_string()),
        cpm: cpm.to_string(),
        width: BANNER_SIZE.width,
        height: BANNER_SIZE.height,
        ttl_in_seconds: ttl,
        display_url: Some(DISPLAY_URL.to_string()),
        ..CdbResponseSlot::default()
    }
}

pub fn silence_slot(ttl: u32) -> CdbResponseSlot {
    CdbResponseSlot {
        display_url: None,
        ..banner_slot("0.00", ttl)
    }
}
