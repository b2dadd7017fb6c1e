//! 执行进度
//!
//! 规则代理在每条记录完成后递增原子计数器；`ProgressReporter` 在独立任务中
//! 按固定间隔读取计数并通过 watch 通道发布，只读不写代理状态。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// 已处理记录计数器
#[derive(Debug, Clone, Default)]
pub struct ProcessedCounter(Arc<AtomicUsize>);

impl ProcessedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// 进度上报任务
pub struct ProgressReporter {
    counter: ProcessedCounter,
    shutdown_tx: watch::Sender<bool>,
    progress_rx: watch::Receiver<usize>,
    handle: JoinHandle<usize>,
}

impl ProgressReporter {
    /// 启动上报任务，`interval` 为零时按 1ms 处理
    pub fn spawn(counter: ProcessedCounter, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(counter.get());

        let task_counter = counter.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let processed = task_counter.get();
                        if publish(&progress_tx, processed) {
                            debug!(processed, "执行进度");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            let processed = task_counter.get();
            publish(&progress_tx, processed);
            info!(processed, "进度上报已停止");
            processed
        });

        Self {
            counter,
            shutdown_tx,
            progress_rx,
            handle,
        }
    }

    /// 订阅进度更新
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.progress_rx.clone()
    }

    /// 最近一次发布的进度
    pub fn latest(&self) -> usize {
        *self.progress_rx.borrow()
    }

    /// 请求停止并等待任务结束，返回最终读数
    pub async fn stop(self) -> usize {
        let _ = self.shutdown_tx.send(true);
        match self.handle.await {
            Ok(processed) => processed,
            Err(_) => self.counter.get(),
        }
    }
}

fn publish(tx: &watch::Sender<usize>, processed: usize) -> bool {
    tx.send_if_modified(|current| {
        if *current == processed {
            false
        } else {
            *current = processed;
            true
        }
    })
}
