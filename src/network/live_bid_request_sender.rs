// src/network/live_bid_request_sender.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::bidding::executor::TaskExecutor;
use crate::error::SdkError;
use crate::model::cdb::{CdbRequest, CdbResponse};
use crate::network::bid_request_sender::BidRequestSender;

/// 实时竞价的结果回调
///
/// `on_bid_available` / `on_time_budget_exceeded` / `on_cdb_error` 三者只会触发其一；
/// 超时之后才到达的响应走 `on_late_response`，只用于更新缓存。
pub trait LiveCdbCallListener: Send + Sync {
    fn on_bid_available(&self, request: &CdbRequest, response: CdbResponse);

    fn on_time_budget_exceeded(&self);

    fn on_cdb_error(&self, error: SdkError);

    fn on_late_response(&self, request: &CdbRequest, response: CdbResponse);
}

/// **实时竞价发送器**
///
/// CDB 调用与截止定时器赛跑，用一个只能被设置一次的原子标记决定赢家。
/// 每次调用都是独立的任务，同一广告位的多个实时请求可以并发。
pub struct LiveBidRequestSender {
    sender: Arc<BidRequestSender>,
    executor: TaskExecutor,
}

impl LiveBidRequestSender {
    pub fn new(sender: Arc<BidRequestSender>, executor: TaskExecutor) -> Self {
        Self { sender, executor }
    }

    pub fn send_live_bid_request(
        &self,
        request: CdbRequest,
        time_budget: Duration,
        listener: Arc<dyn LiveCdbCallListener>,
    ) {
        let decided = Arc::new(AtomicBool::new(false));

        let timer = {
            let decided = Arc::clone(&decided);
            let listener = Arc::clone(&listener);
            let request_id = request.id.clone();
            self.executor.schedule_after(time_budget, move || {
                if claim(&decided) {
                    debug!(%request_id, "Live bid time budget exceeded");
                    listener.on_time_budget_exceeded();
                }
            })
        };

        // 不进串行队列，时间预算只覆盖 CDB 调用本身
        let sender = Arc::clone(&self.sender);
        self.executor.spawn_detached(async move {
            let result = sender.fetch(&request).await;
            let won = claim(&decided);
            if won {
                timer.abort();
            }

            match (result, won) {
                (Ok(response), true) => listener.on_bid_available(&request, response),
                (Ok(response), false) => listener.on_late_response(&request, response),
                (Err(e), true) => listener.on_cdb_error(e),
                (Err(e), false) => {
                    debug!(request_id = %request.id, error = %e, "Late live bid call failed");
                }
            }
        });
    }
}

fn claim(decided: &AtomicBool) -> bool {
    decided
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}
