use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// 以限定的并发数执行一组 future，结果顺序与输入顺序一致
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrent: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let controlled_futures = futures.into_iter().map(|fut| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            // semaphore 不会被 close，acquire 只会在 close 后失败
            let _permit = semaphore.acquire().await.ok();
            fut.await
        }
    });

    join_all(controlled_futures).await
}
