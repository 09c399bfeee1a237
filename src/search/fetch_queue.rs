use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::utils::threads::do_parallel_with_limit;

/// 有界并发的任务队列：单个任务超时或失败只会留下空位，不影响其他任务
#[derive(Debug, Clone)]
pub struct FetchQueue {
    name: String,
    concurrency: usize,
    timeout: Duration,
}

impl FetchQueue {
    pub fn new(name: impl Into<String>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 执行全部任务，结果与提交顺序一一对应
    pub async fn run<T, Fut>(&self, tasks: Vec<Fut>) -> Vec<Option<T>>
    where
        Fut: Future<Output = Result<T>>,
    {
        let total = tasks.len();
        let timeout = self.timeout;
        let name = self.name.as_str();

        // 超时计时在拿到并发许可之后才开始
        let guarded = tasks.into_iter().enumerate().map(|(index, task)| async move {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(value)) => Some(value),
                Ok(Err(e)) => {
                    warn!(queue = name, index, "⚠️ 任务执行失败: {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        queue = name,
                        index,
                        "⏱️ 任务超时（{}毫秒）",
                        timeout.as_millis()
                    );
                    None
                }
            }
        });

        let results = do_parallel_with_limit(guarded.collect(), self.concurrency).await;
        debug!(
            queue = name,
            total,
            succeeded = results.iter().filter(|r| r.is_some()).count(),
            "任务队列执行完成"
        );
        results
    }
}
