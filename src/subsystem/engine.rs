//! 工作池任务引擎
//!
//! 使用 tokio 的 Semaphore 限制同时执行的工作项数量，许可数即工作池大小。
//! 池大小可在运行中调整：扩容立即生效，缩容时空闲许可立即收回，
//! 正在使用的许可在工作项结束时收回。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::subsystem::{Subsystem, TaskEngine};
use crate::utils::{CoreError, Result};

/// 停止时等待在途工作项的默认时长
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 工作池统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPoolStats {
    /// 目标池大小
    pub pool_size: usize,
    /// 在途工作项（排队与执行中）
    pub in_flight: usize,
    /// 累计提交数
    pub submitted: u64,
    /// 累计完成数
    pub completed: u64,
}

/// 池大小簿记，目标与实际许可数必须一起读写
#[derive(Debug, Clone, Copy)]
struct Sizing {
    /// 目标池大小
    target: usize,
    /// 信号量当前的许可总数（含使用中的）
    capacity: usize,
}

struct PoolState {
    semaphore: Semaphore,
    sizing: Mutex<Sizing>,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    idle: Notify,
}

impl PoolState {
    /// 临界区内不会 panic，锁中毒时沿用其中的数据
    fn sizing(&self) -> MutexGuard<'_, Sizing> {
        self.sizing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn target(&self) -> usize {
        self.sizing().target
    }

    fn resize(&self, size: usize) {
        let mut sizing = self.sizing();
        sizing.target = size;

        if size > sizing.capacity {
            self.semaphore.add_permits(size - sizing.capacity);
            sizing.capacity = size;
        } else if size < sizing.capacity {
            // 使用中的许可留到工作项结束时收回
            let reduced = self.semaphore.forget_permits(sizing.capacity - size);
            sizing.capacity -= reduced;
        }
    }

    /// 工作项结束：容量超出目标时收回许可
    fn finish(&self, permit: tokio::sync::SemaphorePermit<'_>) {
        {
            let mut sizing = self.sizing();
            if sizing.capacity > sizing.target {
                permit.forget();
                sizing.capacity -= 1;
            } else {
                drop(permit);
            }
        }

        self.completed.fetch_add(1, Ordering::Relaxed);
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_one();
        }
    }
}

/// 工作池任务引擎
#[derive(Clone)]
pub struct WorkerPool {
    state: Arc<PoolState>,
    running: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl WorkerPool {
    /// 创建指定大小的工作池（尚未启动）
    pub fn new(pool_size: usize) -> Self {
        Self {
            state: Arc::new(PoolState {
                semaphore: Semaphore::new(pool_size),
                sizing: Mutex::new(Sizing {
                    target: pool_size,
                    capacity: pool_size,
                }),
                in_flight: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                idle: Notify::new(),
            }),
            running: Arc::new(AtomicBool::new(false)),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// 设置停止时等待在途工作项的时长
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// 是否正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 统计信息
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            pool_size: self.state.target(),
            in_flight: self.state.in_flight.load(Ordering::SeqCst),
            submitted: self.state.submitted.load(Ordering::Relaxed),
            completed: self.state.completed.load(Ordering::Relaxed),
        }
    }

    async fn wait_idle(&self) {
        while self.state.in_flight.load(Ordering::SeqCst) > 0 {
            self.state.idle.notified().await;
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Subsystem for WorkerPool {}

#[async_trait]
impl TaskEngine for WorkerPool {
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CoreError::InitFailed("任务引擎已经在运行".to_string()));
        }

        info!(pool_size = self.pool_size(), "启动任务引擎");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!(in_flight = self.state.in_flight.load(Ordering::SeqCst), "停止任务引擎");

        if tokio::time::timeout(self.drain_timeout, self.wait_idle())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.state.in_flight.load(Ordering::SeqCst),
                "等待在途工作项超时"
            );
        }

        Ok(())
    }

    fn set_pool_size(&self, size: usize) {
        debug!(pool_size = size, "调整工作池大小");
        self.state.resize(size);
    }

    fn pool_size(&self) -> usize {
        self.state.target()
    }

    fn submit(&self, work: BoxFuture<'static, ()>) -> Result<JoinHandle<()>> {
        if !self.is_running() {
            return Err(CoreError::EngineNotRunning);
        }
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| CoreError::EngineNotRunning)?;

        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.submitted.fetch_add(1, Ordering::Relaxed);

        let state = Arc::clone(&self.state);
        Ok(handle.spawn(async move {
            match state.semaphore.acquire().await {
                Ok(permit) => {
                    work.await;
                    state.finish(permit);
                }
                // 信号量不会被关闭
                Err(_) => {
                    if state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                        state.idle.notify_one();
                    }
                }
            }
        }))
    }
}
