//! 本地图片缓存（按完整图片地址寻址的不透明字节）与缓存清理。
//!
//! 缓存只用于加速：条目只增不改，没有过期时间，只能整体清空。

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::acquire::ImageSource;
use super::errors::{DownloadError, DownloadResult};
use super::join::join_ordered;
use crate::base_system::context::Config;
use crate::book_parser::image_utils::sha1_hex;

#[derive(Debug, Clone)]
pub(crate) struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub(crate) fn new(root: &Path, namespace: &str) -> Self {
        Self {
            dir: root.join(namespace),
        }
    }

    /// 按配置打开缓存；未启用缓存时返回 None。
    pub(crate) fn from_config(config: &Config) -> Option<Self> {
        config
            .enable_image_cache
            .then(|| Self::new(&config.cache_root(), config.cache_namespace.trim()))
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", sha1_hex(url)))
    }

    /// 批量“有则复用、无则下载写入”。返回本次实际下载的数量。
    pub(crate) async fn add_all<S: ImageSource>(
        &self,
        source: &S,
        urls: &[String],
    ) -> DownloadResult<usize> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::io(&self.dir, e))?;

        let fetched = join_ordered(urls.iter().map(|url| self.populate(source, url))).await?;
        let count = fetched.into_iter().filter(|f| *f).count();
        debug!(target: "cache", total = urls.len(), fetched = count, "缓存批量填充完成");
        Ok(count)
    }

    async fn populate<S: ImageSource>(&self, source: &S, url: &str) -> DownloadResult<bool> {
        let path = self.entry_path(url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }
        let bytes = source.fetch(url).await?;
        write_atomic(&path, &bytes).await?;
        Ok(true)
    }

    pub(crate) async fn match_url(&self, url: &str) -> DownloadResult<Option<Vec<u8>>> {
        let path = self.entry_path(url);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DownloadError::io(path, e)),
        }
    }

    /// 删除整个命名空间目录，返回是否确实删除了内容。
    pub(crate) async fn clear(&self) -> DownloadResult<bool> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DownloadError::io(&self.dir, e)),
        }
    }
}

/// 清空图片缓存；未启用缓存时什么也不做。失败只记录日志。
pub async fn clear_cache(config: &Config) {
    let Some(cache) = ImageCache::from_config(config) else {
        debug!(target: "cache", "未启用图片缓存，跳过清理");
        return;
    };
    match cache.clear().await {
        Ok(true) => info!(target: "cache", dir = %cache.dir().display(), "图片缓存已清理"),
        Ok(false) => debug!(target: "cache", "图片缓存为空"),
        Err(e) => warn!(target: "cache", error = %e, "清理图片缓存失败"),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> DownloadResult<()> {
    let tmp = path.with_extension("binpart");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| DownloadError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| DownloadError::io(path, e))
}
