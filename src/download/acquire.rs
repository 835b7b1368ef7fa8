//! 页面图片抓取引擎。
//!
//! 按页码范围并发抓取每一页的大图，最终按页码顺序返回。
//! 有本地缓存时走“批量填充缓存 → 逐个读出”；没有缓存时走“下载 → 解码 → 重新编码 JPEG”。

use std::future::Future;

use tracing::{debug, info};

use super::cache::ImageCache;
use super::errors::{DownloadError, DownloadResult};
use super::join::join_ordered;
use super::models::{BookMetadata, ImageRecord, PageRange};
use super::progress::PhaseProgress;
use crate::book_parser::image_utils;

/// 图片来源：真实实现经中转服务下载，测试中可替换。
pub(crate) trait ImageSource {
    fn fetch(&self, url: &str) -> impl Future<Output = DownloadResult<Vec<u8>>>;

    /// 把上游图片地址换成实际请求（也是缓存键）的地址。
    fn image_url(&self, upstream: &str) -> DownloadResult<String>;
}

/// 抓取策略，调用时按“是否有缓存”选定一次。
pub(crate) enum AcquireStrategy<'a> {
    Cached(&'a ImageCache),
    Reencode { jpeg_quality: u8 },
}

impl<'a> AcquireStrategy<'a> {
    pub(crate) fn select(cache: Option<&'a ImageCache>, jpeg_quality: u8) -> Self {
        match cache {
            Some(cache) => Self::Cached(cache),
            None => Self::Reencode { jpeg_quality },
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Cached(_) => "cached",
            Self::Reencode { .. } => "reencode",
        }
    }

    async fn acquire<S: ImageSource>(
        &self,
        source: &S,
        pages: &[(u32, String)],
        progress: &PhaseProgress,
    ) -> DownloadResult<Vec<Vec<u8>>> {
        match self {
            Self::Cached(cache) => acquire_cached(cache, source, pages, progress).await,
            Self::Reencode { jpeg_quality } => {
                acquire_reencoded(source, pages, *jpeg_quality, progress).await
            }
        }
    }
}

/// 抓取 `range` 内的全部页面，结果顺序与页码一致。
///
/// `progress` 以每页两个子步骤计数，对外刻度为 `0..=range.len()`。
pub(crate) async fn acquire_images<S: ImageSource>(
    source: &S,
    strategy: &AcquireStrategy<'_>,
    meta: &BookMetadata,
    range: PageRange,
    progress: &PhaseProgress,
) -> DownloadResult<Vec<ImageRecord>> {
    meta.ensure_accessible()?;
    if !range.contained_in(meta) {
        return Err(DownloadError::InvalidRange {
            first: range.first_page(),
            last: range.last_page(),
            total: meta.total_page_count,
        });
    }

    let pages = range
        .pages()
        .map(|page| -> DownloadResult<(u32, String)> {
            Ok((page, source.image_url(&meta.upstream_image_url(page))?))
        })
        .collect::<DownloadResult<Vec<_>>>()?;

    info!(
        target: "download",
        first = range.first_page(),
        last = range.last_page(),
        strategy = strategy.name(),
        "开始抓取页面图片"
    );

    let images = strategy.acquire(source, &pages, progress).await?;
    Ok(pages
        .into_iter()
        .zip(images)
        .enumerate()
        .map(|(page_index, ((page_number, _), bytes))| ImageRecord {
            page_index,
            page_number,
            bytes,
        })
        .collect())
}

async fn acquire_cached<S: ImageSource>(
    cache: &ImageCache,
    source: &S,
    pages: &[(u32, String)],
    progress: &PhaseProgress,
) -> DownloadResult<Vec<Vec<u8>>> {
    let urls: Vec<String> = pages.iter().map(|(_, url)| url.clone()).collect();
    let fetched = cache.add_all(source, &urls).await?;
    debug!(target: "download", fetched, reused = urls.len() - fetched, "缓存填充完成");
    progress.advance(urls.len());

    join_ordered(urls.iter().map(|url| async move {
        let bytes = cache
            .match_url(url)
            .await?
            .ok_or_else(|| DownloadError::MissingCachedImage { url: url.clone() })?;
        progress.advance(1);
        Ok::<_, DownloadError>(bytes)
    }))
    .await
}

async fn acquire_reencoded<S: ImageSource>(
    source: &S,
    pages: &[(u32, String)],
    jpeg_quality: u8,
    progress: &PhaseProgress,
) -> DownloadResult<Vec<Vec<u8>>> {
    join_ordered(pages.iter().map(|(_, url)| async move {
        let raw = source.fetch(url).await?;
        let img = image_utils::decode(&raw).map_err(|source| DownloadError::Decode {
            url: url.clone(),
            source,
        })?;
        progress.advance(1);

        let encoded =
            image_utils::encode_jpeg(&img, jpeg_quality).map_err(|source| DownloadError::Decode {
                url: url.clone(),
                source,
            })?;
        if encoded.is_empty() {
            return Err(DownloadError::EmptyEncodedImage { url: url.clone() });
        }
        progress.advance(1);
        Ok::<_, DownloadError>(encoded)
    }))
    .await
}
