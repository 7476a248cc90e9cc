// src/logging/remote_log.rs

use chrono::Utc;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{debug, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::bidding::executor::TaskExecutor;
use crate::bidding::listener::RemoteLogBatchSender;
use crate::model::cdb::{RemoteLogContext, RemoteLogRecord, RemoteLogRecords};
use crate::network::pub_sdk_api::PubSdkApi;

/// 只收集本 crate 的事件
const TARGET_PREFIX: &str = "rust_pubsdk";

/// **远程日志队列**
///
/// 有界的内存队列，满了丢弃最旧的一条。
#[derive(Debug)]
pub struct RemoteLogQueue {
    records: Mutex<VecDeque<RemoteLogRecord>>,
    capacity: usize,
}

impl RemoteLogQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, record: RemoteLogRecord) {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn poll(&self, max: usize) -> Vec<RemoteLogRecord> {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = max.min(records.len());
        records.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 把 WARN 及以上的事件写进 `RemoteLogQueue`
pub struct RemoteLogLayer {
    queue: Arc<RemoteLogQueue>,
}

impl RemoteLogLayer {
    pub fn new(queue: Arc<RemoteLogQueue>) -> Self {
        Self { queue }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S> Layer<S> for RemoteLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Level 的顺序是 ERROR < WARN < INFO ...
        if *metadata.level() > Level::WARN || !metadata.target().starts_with(TARGET_PREFIX) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.queue.push(RemoteLogRecord {
            timestamp: Utc::now().to_rfc3339(),
            level: metadata.level().to_string(),
            message: format!("{}{}", visitor.message, visitor.fields),
        });
    }
}

/// 从队列取一批日志上报到 CDB
pub struct RemoteLogSender {
    queue: Arc<RemoteLogQueue>,
    api: Arc<dyn PubSdkApi>,
    executor: TaskExecutor,
    context: RemoteLogContext,
    batch_size: usize,
}

impl RemoteLogSender {
    pub fn new(
        queue: Arc<RemoteLogQueue>,
        api: Arc<dyn PubSdkApi>,
        executor: TaskExecutor,
        context: RemoteLogContext,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            api,
            executor,
            context,
            batch_size: batch_size.max(1),
        }
    }
}

impl RemoteLogBatchSender for RemoteLogSender {
    fn send_remote_log_batch(&self) {
        let errors = self.queue.poll(self.batch_size);
        if errors.is_empty() {
            return;
        }

        let records = vec![RemoteLogRecords {
            context: self.context.clone(),
            errors,
        }];
        let api = Arc::clone(&self.api);
        self.executor.execute(async move {
            if let Err(e) = api.post_logs(&records).await {
                debug!(error = %e, "Remote logs not delivered");
            }
        });
    }
}
