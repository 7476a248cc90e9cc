// src/bidding/executor.rs

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{error, warn};

/// 任务调度模型
///
/// - `Serial`：单个 worker 按提交顺序依次执行
/// - `Pooled`：每个任务直接 spawn 到运行时上，不保证顺序
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    Serial,
    Pooled,
}

type Job = BoxFuture<'static, ()>;

/// 在途任务计数，drop 时自动减一（包括任务被 abort 的情况）
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn acquire(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

struct ExecutorInner {
    kind: ExecutorKind,
    handle: Handle,
    queue: Option<mpsc::UnboundedSender<(Job, InFlight)>>,
    in_flight: Arc<watch::Sender<usize>>,
}

/// **后台任务执行器**
///
/// 同步代码里也可以调用 `execute`，不需要 `.await`。
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<ExecutorInner>,
}

impl TaskExecutor {
    pub fn new(kind: ExecutorKind, handle: Handle) -> Self {
        let (in_flight, _) = watch::channel(0usize);
        let queue = match kind {
            ExecutorKind::Serial => {
                let (sender, mut receiver) = mpsc::unbounded_channel::<(Job, InFlight)>();
                handle.spawn(async move {
                    while let Some((job, _guard)) = receiver.recv().await {
                        // 单个任务 panic 不能拖垮整个队列
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            error!("Background task panicked");
                        }
                    }
                });
                Some(sender)
            }
            ExecutorKind::Pooled => None,
        };

        Self {
            inner: Arc::new(ExecutorInner {
                kind,
                handle,
                queue,
                in_flight: Arc::new(in_flight),
            }),
        }
    }

    pub fn kind(&self) -> ExecutorKind {
        self.inner.kind
    }

    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// 提交一个后台任务
    ///
    /// 串行队列已关闭时任务被丢弃，future 连同它持有的资源一起 drop。
    pub fn execute<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.inner.queue {
            Some(queue) => {
                let guard = InFlight::acquire(&self.inner.in_flight);
                if queue.send((future.boxed(), guard)).is_err() {
                    warn!("Serial executor is closed, dropping task");
                }
            }
            None => self.spawn_detached(future),
        }
    }

    /// 绕过串行队列直接 spawn，仍计入在途任务
    pub fn spawn_detached<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = InFlight::acquire(&self.inner.in_flight);
        self.inner.handle.spawn(async move {
            let _guard = guard;
            future.await;
        });
    }

    /// 延迟执行回调，不占用串行 worker。返回的句柄可用于取消。
    pub fn schedule_after<F>(&self, delay: Duration, callback: F) -> AbortHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = InFlight::acquire(&self.inner.in_flight);
        self.inner
            .handle
            .spawn(async move {
                let _guard = guard;
                tokio::time::sleep(delay).await;
                callback();
            })
            .abort_handle()
    }

    /// 当前在途的任务数（含未触发的定时器）
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// 等待所有已提交任务和定时器结束
    pub async fn wait_for_idle(&self) {
        let mut receiver = self.inner.in_flight.subscribe();
        // 发送端由 self 持有，不会提前关闭
        let _ = receiver.wait_for(|n| *n == 0).await;
    }
}
