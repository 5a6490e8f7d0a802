//! 事件总线
//!
//! 默认的事件控制器实现。`schedule` 把事件放入无界队列，启动后由分发任务按
//! 订阅模式投递给回调。启动前调度的事件会被缓存，启动后依次投递。
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_kernel::subsystem::{EventBus, EventController, Event};
//!
//! # async fn demo() {
//! let bus = EventBus::new();
//! bus.subscribe("monitor", "kernel.*", Arc::new(|event: Event| {
//!     println!("收到事件: {}", event.event_type);
//! }))
//! .await;
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::core::context::KernelContext;
use crate::subsystem::event::Event;
use crate::subsystem::{EventController, Subsystem};
use crate::utils::{generate_uuid, CoreError, Result};

/// 事件回调函数类型
///
/// 回调在分发任务中同步执行，应尽快返回。
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Clone)]
struct SubscriptionEntry {
    subscription_id: String,
    subscriber_id: String,
    pattern: String,
    callback: EventCallback,
}

#[derive(Default)]
struct BusCounters {
    scheduled: AtomicU64,
    delivered: AtomicU64,
    unmatched: AtomicU64,
}

/// 分发统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// 调度的事件数
    pub scheduled: u64,
    /// 投递给回调的次数
    pub delivered: u64,
    /// 没有任何订阅者的事件数
    pub unmatched: u64,
}

/// 事件总线
pub struct EventBus {
    subscriptions: Arc<RwLock<Vec<SubscriptionEntry>>>,
    sender: UnboundedSender<Event>,
    /// 未运行时保存接收端，运行时由分发任务持有
    receiver: Mutex<Option<UnboundedReceiver<Event>>>,
    dispatcher: Mutex<Option<JoinHandle<UnboundedReceiver<Event>>>>,
    shutdown: Arc<Notify>,
    counters: Arc<BusCounters>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            sender,
            receiver: Mutex::new(Some(receiver)),
            dispatcher: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            counters: Arc::new(BusCounters::default()),
        }
    }

    /// 订阅事件
    ///
    /// # Arguments
    ///
    /// * `subscriber_id` - 订阅者标识
    /// * `pattern` - 事件类型模式（支持 `*` 与 `prefix.*`）
    /// * `callback` - 事件回调
    ///
    /// # Returns
    ///
    /// 订阅 ID，用于取消订阅
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        pattern: impl Into<String>,
        callback: EventCallback,
    ) -> String {
        let entry = SubscriptionEntry {
            subscription_id: generate_uuid(),
            subscriber_id: subscriber_id.into(),
            pattern: pattern.into(),
            callback,
        };
        let subscription_id = entry.subscription_id.clone();

        debug!(
            subscriber_id = %entry.subscriber_id,
            pattern = %entry.pattern,
            "新增事件订阅"
        );
        self.subscriptions.write().await.push(entry);
        subscription_id
    }

    /// 取消订阅，返回订阅是否存在
    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.subscription_id != subscription_id);
        before != subscriptions.len()
    }

    /// 取消某个订阅者的全部订阅，返回取消的数量
    pub async fn unsubscribe_all(&self, subscriber_id: &str) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.subscriber_id != subscriber_id);
        before - subscriptions.len()
    }

    /// 当前订阅数量
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// 分发统计
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            unmatched: self.counters.unmatched.load(Ordering::Relaxed),
        }
    }

    /// 分发任务是否在运行
    pub async fn is_running(&self) -> bool {
        self.dispatcher.lock().await.is_some()
    }

    async fn dispatch(
        subscriptions: &RwLock<Vec<SubscriptionEntry>>,
        counters: &BusCounters,
        event: Event,
    ) {
        let matching: Vec<EventCallback> = subscriptions
            .read()
            .await
            .iter()
            .filter(|s| event.matches(&s.pattern))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        if matching.is_empty() {
            trace!(event_type = %event.event_type, "没有匹配的订阅者");
            counters.unmatched.fetch_add(1, Ordering::Relaxed);
            return;
        }

        for callback in matching {
            callback(event.clone());
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for EventBus {}

#[async_trait]
impl EventController for EventBus {
    async fn start(&self, _ctx: &KernelContext) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock().await;
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::InitFailed("事件总线已经在运行".to_string()))?;

        let subscriptions = Arc::clone(&self.subscriptions);
        let counters = Arc::clone(&self.counters);
        let shutdown = Arc::clone(&self.shutdown);

        *dispatcher = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    maybe_event = receiver.recv() => match maybe_event {
                        Some(event) => Self::dispatch(&subscriptions, &counters, event).await,
                        None => break,
                    },
                    _ = shutdown.notified() => {
                        // 投递停止前已调度的事件
                        while let Ok(event) = receiver.try_recv() {
                            Self::dispatch(&subscriptions, &counters, event).await;
                        }
                        break;
                    }
                }
            }
            receiver
        }));

        info!("事件总线已启动");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(handle) = self.dispatcher.lock().await.take() else {
            return Ok(());
        };

        self.shutdown.notify_one();
        match handle.await {
            Ok(receiver) => {
                *self.receiver.lock().await = Some(receiver);
                info!("事件总线已停止");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "事件分发任务异常退出");
                Err(CoreError::Internal(format!("事件分发任务异常退出: {}", e)))
            }
        }
    }

    fn schedule(&self, event: Event) {
        trace!(event_id = %event.event_id, event_type = %event.event_type, "调度事件");
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        // 接收端只在总线析构时释放
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::event::kernel_events;
    use crate::subsystem::WorkerPool;
    use serde_json::Value;
    use std::sync::Mutex as StdMutex;

    fn test_context() -> KernelContext {
        KernelContext::new(Arc::new(WorkerPool::new(1)))
    }

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, EventCallback) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: EventCallback = Arc::new(move |event: Event| {
            sink.lock().unwrap().push(event.event_type);
        });
        (seen, callback)
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let (_, callback) = recorder();

        let id = bus.subscribe("m1", "kernel.*", callback.clone()).await;
        assert!(crate::utils::is_valid_uuid(&id));
        bus.subscribe("m1", "custom.*", callback.clone()).await;
        bus.subscribe("m2", "*", callback).await;
        assert_eq!(bus.subscription_count().await, 3);

        assert!(bus.unsubscribe(&id).await);
        assert!(!bus.unsubscribe(&id).await);
        assert_eq!(bus.unsubscribe_all("m1").await, 1);
        assert_eq!(bus.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_events_scheduled_before_start_are_delivered() {
        let bus = EventBus::new();
        let (seen, callback) = recorder();
        bus.subscribe("monitor", "kernel.*", callback).await;

        bus.schedule(Event::kernel(kernel_events::STARTED, Value::Null));
        bus.schedule(Event::new("other.thing", "x", Value::Null));

        bus.start(&test_context()).await.unwrap();
        bus.stop().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["kernel.started".to_string()]);
        let stats = bus.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.unmatched, 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let bus = EventBus::new();
        let ctx = test_context();
        let (seen, callback) = recorder();
        bus.subscribe("monitor", "*", callback).await;

        bus.start(&ctx).await.unwrap();
        assert!(bus.start(&ctx).await.is_err());
        bus.stop().await.unwrap();
        assert!(!bus.is_running().await);

        bus.schedule(Event::kernel(kernel_events::MODULE_LOADED, Value::Null));
        bus.start(&ctx).await.unwrap();
        bus.stop().await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let bus = EventBus::new();
        bus.stop().await.unwrap();
    }
}
