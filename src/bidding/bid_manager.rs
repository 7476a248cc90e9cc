// src/bidding/bid_manager.rs

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::bidding::executor::TaskExecutor;
use crate::bidding::listener::{
    BidLifecycleListener, BidListener, MetricBatchSender, RemoteLogBatchSender,
};
use crate::cache::sdk_cache::SdkCache;
use crate::clock::{Clock, SystemClock};
use crate::config::config_manager::ConfigManager;
use crate::config::settings::SdkSettings;
use crate::error::{SdkError, SdkResult};
use crate::logging::csm::{CsmBidLifecycleListener, MetricQueue};
use crate::logging::remote_log::{RemoteLogQueue, RemoteLogSender};
use crate::model::ad_unit::{AdUnit, CacheAdUnit};
use crate::model::cdb::{CdbRequest, CdbResponse, ContextData, RemoteLogContext, User};
use crate::model::integration::IntegrationRegistry;
use crate::model::mapper::{AdUnitMapper, DefaultAdUnitMapper};
use crate::model::slot::{Bid, CdbResponseSlot, DEFAULT_TTL_IN_SECONDS};
use crate::network::bid_request_sender::BidRequestSender;
use crate::network::live_bid_request_sender::{LiveBidRequestSender, LiveCdbCallListener};
use crate::network::pub_sdk_api::{HttpPubSdkApi, PubSdkApi};

/// **BidManager 依赖的全部组件**
///
/// 字段公开，测试里可以替换任意一个协作者。
pub struct SdkComponents {
    pub settings: SdkSettings,
    pub api: Arc<dyn PubSdkApi>,
    pub executor: TaskExecutor,
    pub clock: Arc<dyn Clock>,
    pub cache: Arc<SdkCache>,
    pub config: Arc<ConfigManager>,
    pub integrations: Arc<IntegrationRegistry>,
    pub mapper: Arc<dyn AdUnitMapper>,
    pub lifecycle: Arc<dyn BidLifecycleListener>,
    pub metrics: Arc<dyn MetricBatchSender>,
    pub remote_logs: Arc<dyn RemoteLogBatchSender>,
}

impl SdkComponents {
    /// 默认组装：系统时钟、CSM 指标、远程日志
    pub fn new(
        settings: SdkSettings,
        api: Arc<dyn PubSdkApi>,
        executor: TaskExecutor,
        remote_log_queue: Arc<RemoteLogQueue>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let integrations = Arc::new(IntegrationRegistry::new());

        let metric_queue = Arc::new(MetricQueue::new(
            Arc::clone(&api),
            executor.clone(),
            Arc::clone(&integrations),
            &settings.sdk_version,
            settings.metric_batch_size,
            settings.metric_capacity,
        ));
        let lifecycle = Arc::new(CsmBidLifecycleListener::new(
            Arc::clone(&metric_queue),
            Arc::clone(&clock),
        ));
        let remote_logs = Arc::new(RemoteLogSender::new(
            remote_log_queue,
            Arc::clone(&api),
            executor.clone(),
            RemoteLogContext {
                version: settings.sdk_version.clone(),
                bundle_id: settings.bundle_id.clone(),
                device_os: User::default().device_os,
            },
            settings.remote_log_batch_size,
        ));

        Self {
            cache: Arc::new(SdkCache::new(settings.screen_size)),
            mapper: Arc::new(DefaultAdUnitMapper::new(settings.screen_size, settings.chunk_size)),
            config: Arc::new(ConfigManager::default()),
            settings,
            api,
            executor,
            clock,
            integrations,
            lifecycle,
            metrics: metric_queue,
            remote_logs,
        }
    }

    /// 使用 HTTP 客户端和 settings 里指定的执行器
    pub fn from_settings(
        settings: SdkSettings,
        handle: Handle,
        remote_log_queue: Arc<RemoteLogQueue>,
    ) -> SdkResult<Self> {
        let api: Arc<dyn PubSdkApi> = Arc::new(HttpPubSdkApi::new(&settings)?);
        let executor = TaskExecutor::new(settings.executor, handle);
        Ok(Self::new(settings, api, executor, remote_log_queue))
    }
}

/// 缓存查询结果
enum CacheLookup {
    /// 未过期的静默槽位，留在缓存里
    Silenced,
    Bid(Bid),
    NoBid,
}

struct Inner {
    cache: Arc<SdkCache>,
    config: Arc<ConfigManager>,
    clock: Arc<dyn Clock>,
    executor: TaskExecutor,
    integrations: Arc<IntegrationRegistry>,
    mapper: Arc<dyn AdUnitMapper>,
    lifecycle: Arc<dyn BidLifecycleListener>,
    metrics: Arc<dyn MetricBatchSender>,
    remote_logs: Arc<dyn RemoteLogBatchSender>,
    sender: Arc<BidRequestSender>,
    live_sender: LiveBidRequestSender,
    /// 全局静默截止时间（毫秒），now < 该值时不发起新请求
    time_to_next_call_allowed_at: AtomicI64,
}

/// **竞价管理器**
///
/// 每次广告请求决定：用缓存、发起拉取、进入静默，还是在时间预算内跑实时竞价。
/// 可以 clone，多处共享同一份状态。
#[derive(Clone)]
pub struct BidManager {
    inner: Arc<Inner>,
}

impl BidManager {
    pub fn new(components: SdkComponents) -> Self {
        let sender = Arc::new(BidRequestSender::new(
            &components.settings,
            Arc::clone(&components.integrations),
            components.api,
            Arc::clone(&components.lifecycle),
        ));
        let live_sender = LiveBidRequestSender::new(Arc::clone(&sender), components.executor.clone());

        components.lifecycle.on_sdk_initialized();

        Self {
            inner: Arc::new(Inner {
                cache: components.cache,
                config: components.config,
                clock: components.clock,
                executor: components.executor,
                integrations: components.integrations,
                mapper: components.mapper,
                lifecycle: components.lifecycle,
                metrics: components.metrics,
                remote_logs: components.remote_logs,
                sender,
                live_sender,
                time_to_next_call_allowed_at: AtomicI64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<SdkCache> {
        &self.inner.cache
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.inner.config
    }

    pub fn integrations(&self) -> &Arc<IntegrationRegistry> {
        &self.inner.integrations
    }

    /// **预取**
    ///
    /// 先刷新一次远程配置，再按块拉取竞价写入缓存。不受全局静默影响。
    pub fn prefetch(&self, ad_units: &[AdUnit]) {
        let inner = Arc::clone(&self.inner);
        let ad_units = ad_units.to_vec();

        self.inner.executor.execute(async move {
            inner.refresh_config().await;

            let snapshot = inner.config.snapshot();
            if snapshot.kill_switch_enabled {
                debug!("Kill switch enabled, skipping prefetch");
            } else if !snapshot.prefetch_on_init_enabled {
                debug!("Prefetch on init disabled");
            } else {
                for chunk in inner.mapper.map_to_chunks(&ad_units) {
                    let keys = inner.filter_supported(chunk);
                    if !keys.is_empty() {
                        inner.fetch_for_cache(keys, ContextData::new());
                    }
                }
            }

            inner.send_telemetry();
        });
    }

    /// **取缓存竞价并预取下一次**
    ///
    /// 同步返回缓存中可用的竞价（最多被消费一次），同时在后台为该广告位重新拉取。
    pub fn get_bid_for_ad_unit_and_prefetch(
        &self,
        ad_unit: &AdUnit,
        context: ContextData,
    ) -> Option<Bid> {
        let inner = &self.inner;
        let key = inner.map_supported(ad_unit)?;

        if inner.config.snapshot().kill_switch_enabled {
            debug!(ad_unit = %key, "Kill switch enabled, no bid");
            return None;
        }
        if inner.is_global_silence_enabled() {
            debug!(ad_unit = %key, "Global silent mode, no bid");
            return None;
        }

        let bid = match inner.consume_cached_bid(&key) {
            CacheLookup::Silenced => {
                debug!(ad_unit = %key, "Ad unit is silenced");
                return None;
            }
            CacheLookup::Bid(bid) => Some(bid),
            CacheLookup::NoBid => None,
        };

        inner.fetch_for_cache(vec![key], context);
        inner.send_telemetry();
        bid
    }

    /// **实时竞价**
    ///
    /// 结果通过 listener 回调，`on_bid_response` 与 `on_no_bid` 恰好触发一次。
    pub fn get_live_bid_for_ad_unit(
        &self,
        ad_unit: &AdUnit,
        context: ContextData,
        listener: Arc<dyn BidListener>,
    ) {
        let inner = &self.inner;
        let Some(key) = inner.map_supported(ad_unit) else {
            listener.on_no_bid();
            return;
        };

        let snapshot = inner.config.snapshot();
        if snapshot.kill_switch_enabled {
            debug!(ad_unit = %key, "Kill switch enabled, no bid");
            listener.on_no_bid();
            return;
        }

        inner.send_telemetry();

        if inner.is_global_silence_enabled() || inner.is_ad_unit_silenced(&key) {
            debug!(ad_unit = %key, "Silent mode, answering live bid from cache");
            inner.answer_from_cache(&key, listener.as_ref());
            return;
        }
        inner.discard_expired_silence(&key);

        let request = inner.sender.create_cdb_request(std::slice::from_ref(&key), &context);
        let handler = Arc::new(LiveBidHandler {
            inner: Arc::clone(inner),
            key,
            listener,
        });
        inner.live_sender.send_live_bid_request(
            request,
            Duration::from_millis(snapshot.live_bidding_time_budget_ms),
            handler,
        );
    }

    /// 宿主入口：按远程配置选择实时竞价或缓存竞价
    pub fn load_bid(&self, ad_unit: &AdUnit, context: ContextData, listener: Arc<dyn BidListener>) {
        if self.inner.config.snapshot().live_bidding_enabled {
            self.get_live_bid_for_ad_unit(ad_unit, context, listener);
            return;
        }

        match self.get_bid_for_ad_unit_and_prefetch(ad_unit, context) {
            Some(bid) => listener.on_bid_response(bid),
            None => listener.on_no_bid(),
        }
    }

    /// 开启全局静默 `seconds` 秒；0 不做任何改变
    pub fn set_time_to_next_call(&self, seconds: u32) {
        self.inner.set_time_to_next_call(seconds);
    }

    pub fn is_global_silence_enabled(&self) -> bool {
        self.inner.is_global_silence_enabled()
    }

    /// 等待所有后台任务结束
    pub async fn wait_for_idle(&self) {
        self.inner.executor.wait_for_idle().await;
    }
}

impl Inner {
    fn now(&self) -> i64 {
        self.clock.current_time_in_millis()
    }

    /// 映射并按当前接入方式过滤广告格式
    fn map_supported(&self, ad_unit: &AdUnit) -> Option<CacheAdUnit> {
        let Some(key) = self.mapper.map(ad_unit) else {
            debug!(ad_unit_id = ad_unit.ad_unit_id(), "Ad unit cannot be mapped");
            return None;
        };
        self.filter_supported(vec![key]).pop()
    }

    fn filter_supported(&self, keys: Vec<CacheAdUnit>) -> Vec<CacheAdUnit> {
        let integration = self.integrations.read_integration();
        keys.into_iter()
            .filter(|key| {
                let supported = integration.supports(key.ad_unit_type);
                if !supported {
                    warn!(ad_unit = %key, %integration, "Ad unit type not supported by integration");
                }
                supported
            })
            .collect()
    }

    fn is_global_silence_enabled(&self) -> bool {
        self.now() < self.time_to_next_call_allowed_at.load(Ordering::SeqCst)
    }

    fn is_ad_unit_silenced(&self, key: &CacheAdUnit) -> bool {
        self.cache
            .peek(key)
            .is_some_and(|bid| bid.is_silent() && !bid.is_expired(self.clock.as_ref()))
    }

    fn set_time_to_next_call(&self, seconds: u32) {
        if seconds == 0 {
            return;
        }
        let deadline = self.now() + i64::from(seconds) * 1000;
        self.time_to_next_call_allowed_at.store(deadline, Ordering::SeqCst);
        info!(seconds, deadline, "Global silent mode enabled");
        self.lifecycle.on_global_silent_mode_enabled(seconds);
    }

    /// 原子地“查找并删除”：未过期的静默槽位保留，其余条目删除并通知已消费
    fn consume_cached_bid(&self, key: &CacheAdUnit) -> CacheLookup {
        let clock = self.clock.as_ref();
        let mut silenced = false;
        let removed = self.cache.remove_if(key, |bid| {
            silenced = bid.is_silent() && !bid.is_expired(clock);
            !silenced
        });

        match removed {
            Some(bid) => {
                self.lifecycle.on_bid_consumed(key, &bid);
                if bid.is_priced() && !bid.is_expired(clock) {
                    debug!(ad_unit = %key, cpm = bid.cpm_as_number(), "Consumed cached bid");
                    CacheLookup::Bid(bid)
                } else {
                    debug!(ad_unit = %key, "Dropped stale cached entry");
                    CacheLookup::NoBid
                }
            }
            None if silenced => CacheLookup::Silenced,
            None => CacheLookup::NoBid,
        }
    }

    /// 发起实时请求前清掉已过期的静默槽位，并通知已消费
    fn discard_expired_silence(&self, key: &CacheAdUnit) {
        let clock = self.clock.as_ref();
        let stale = self
            .cache
            .remove_if(key, |bid| bid.is_silent() && bid.is_expired(clock));
        if let Some(stale) = stale {
            debug!(ad_unit = %key, "Expired silence slot removed");
            self.lifecycle.on_bid_consumed(key, &stale);
        }
    }

    fn answer_from_cache(&self, key: &CacheAdUnit, listener: &dyn BidListener) {
        match self.consume_cached_bid(key) {
            CacheLookup::Bid(bid) => listener.on_bid_response(bid),
            CacheLookup::Silenced | CacheLookup::NoBid => listener.on_no_bid(),
        }
    }

    /// 打上下载时间；即时竞价的 ttl 换成默认值
    fn stamp(&self, slot: CdbResponseSlot) -> Bid {
        let immediate = slot.is_immediate();
        let bid = Bid::new(slot, self.now());
        if immediate {
            bid.with_ttl_in_seconds(DEFAULT_TTL_IN_SECONDS)
        } else {
            bid
        }
    }

    fn cache_slot(&self, slot: CdbResponseSlot) {
        if !slot.is_valid() {
            debug!(placement_id = ?slot.placement_id, cpm = %slot.cpm, "Invalid slot dropped");
            return;
        }
        let bid = self.stamp(slot);
        if let Some(key) = self.cache.add(bid.clone()) {
            debug!(ad_unit = %key, ttl = bid.ttl_in_seconds(), "Bid cached");
            self.lifecycle.on_bid_cached(&bid);
        }
    }

    fn apply_response(&self, response: CdbResponse) {
        self.set_time_to_next_call(response.time_to_next_call);
        for slot in response.slots {
            self.cache_slot(slot);
        }
    }

    /// 后台拉取并写入缓存；已在途的键不会重复拉取
    fn fetch_for_cache(self: &Arc<Self>, keys: Vec<CacheAdUnit>, context: ContextData) {
        // 任务结束或被丢弃时，guard 随 future 一起 drop 并释放在途键
        let pending = self.sender.claim_pending(keys);
        if pending.is_empty() {
            return;
        }

        let inner = Arc::clone(self);
        self.executor.execute(async move {
            let request = inner.sender.create_cdb_request(pending.keys(), &context);
            // 失败已经通知过生命周期观察者，缓存保持不变
            if let Ok(response) = inner.sender.fetch(&request).await {
                inner.apply_response(response);
            }
            drop(pending);
        });
    }

    async fn refresh_config(&self) {
        if let Ok(response) = self.sender.fetch_config().await {
            self.config.refresh_config(&response);
        }
    }

    fn send_telemetry(&self) {
        self.metrics.send_metric_batch();
        self.remote_logs.send_remote_log_batch();
    }
}

/// 单次实时竞价的结果处理
struct LiveBidHandler {
    inner: Arc<Inner>,
    key: CacheAdUnit,
    listener: Arc<dyn BidListener>,
}

impl LiveCdbCallListener for LiveBidHandler {
    fn on_bid_available(&self, request: &CdbRequest, response: CdbResponse) {
        let inner = &self.inner;
        inner.set_time_to_next_call(response.time_to_next_call);

        let slot = request
            .slots
            .first()
            .and_then(|s| response.slot_by_impression_id(&s.impression_id))
            .cloned();

        match slot {
            Some(slot) if slot.is_valid() && slot.cpm_as_number().is_some_and(|cpm| cpm > 0.0) => {
                // 直接交给调用方，不进缓存
                let bid = inner.stamp(slot);
                inner.lifecycle.on_bid_consumed(&self.key, &bid);
                self.listener.on_bid_response(bid);
            }
            Some(slot) if slot.is_silent() => {
                inner.cache_slot(slot);
                self.listener.on_no_bid();
            }
            _ => self.listener.on_no_bid(),
        }
    }

    fn on_time_budget_exceeded(&self) {
        self.inner.answer_from_cache(&self.key, self.listener.as_ref());
    }

    fn on_cdb_error(&self, _error: SdkError) {
        self.inner.answer_from_cache(&self.key, self.listener.as_ref());
    }

    fn on_late_response(&self, _request: &CdbRequest, response: CdbResponse) {
        let inner = &self.inner;
        inner.set_time_to_next_call(response.time_to_next_call);

        for slot in response.slots {
            let silenced = inner
                .cache
                .detect_cache_ad_unit(&slot)
                .is_some_and(|key| inner.is_ad_unit_silenced(&key));
            if silenced {
                debug!(placement_id = ?slot.placement_id, "Late slot ignored, ad unit silenced");
                continue;
            }
            inner.cache_slot(slot);
        }
    }
}
