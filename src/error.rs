use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// 编排核心需要区分的失败类型，其余错误统一走 anyhow
#[derive(Debug, Error)]
pub enum SearchGraphError {
    /// 外部调用超过截止时间
    #[error("{operation} 超时（{seconds}秒）")]
    DeadlineExceeded {
        operation: &'static str,
        seconds: u64,
    },

    #[error("节点 {0} 不存在")]
    NodeNotFound(String),

    /// 根节点聚合时仍有子孙节点未进入终态
    #[error("根节点聚合中止：仍有 {pending} 个子孙节点未结束")]
    IncompleteDescendants { pending: usize },
}

/// 为外部调用加上截止时间，超时转换为 `DeadlineExceeded`
pub async fn with_deadline<T, Fut>(
    operation: &'static str,
    deadline: Duration,
    future: Fut,
) -> anyhow::Result<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(SearchGraphError::DeadlineExceeded {
            operation,
            seconds: deadline.as_secs(),
        }
        .into()),
    }
}
