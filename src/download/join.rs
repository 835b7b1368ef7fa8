//! 并发执行一组任务，并按提交顺序返回结果。

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};

use super::errors::DownloadResult;

/// 同时启动全部任务，等待每一个结束后再按下标排序。
///
/// 任一任务失败则整体失败（返回请求顺序中最靠前的错误），不返回部分结果。
pub(crate) async fn join_ordered<T, F, I>(tasks: I) -> DownloadResult<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = DownloadResult<T>>,
{
    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(idx, task)| async move { (idx, task.await) })
        .collect();

    let mut settled = Vec::with_capacity(pending.len());
    while let Some(done) = pending.next().await {
        settled.push(done);
    }
    settled.sort_by_key(|(idx, _)| *idx);
    settled.into_iter().map(|(_, res)| res).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::download::errors::DownloadError;

    #[tokio::test]
    async fn keeps_submission_order() {
        let delays = [30u64, 5, 20, 0, 10];
        let out = join_ordered(delays.iter().map(|&ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, DownloadError>(ms)
        }))
        .await
        .unwrap();
        assert_eq!(out, delays.to_vec());
    }

    #[tokio::test]
    async fn fails_whole_batch_after_all_settle() {
        let finished = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tasks = (0..4u64).map(|i| {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10 * (4 - i))).await;
                finished.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if i == 1 {
                    Err(DownloadError::EmptyEncodedImage {
                        url: format!("page-{i}"),
                    })
                } else {
                    Ok(i)
                }
            }
        });
        let res = join_ordered(tasks).await;
        assert!(matches!(res, Err(DownloadError::EmptyEncodedImage { url }) if url == "page-1"));
        assert_eq!(finished.load(std::sync::atomic::Ordering::SeqCst), 4);
    }
}
