//! 下载主流程编排。
//!
//! 链接解析 → 获取书本信息 →（用户确认页码范围）→ 抓取图片 → 生成 PDF → 保存。
//! 同一时间只处理一本书；重新解析链接或重置会替换当前书本信息。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::acquire::{AcquireStrategy, ImageSource, acquire_images};
use super::cache::ImageCache;
use super::errors::{DownloadError, DownloadResult};
use super::metadata::fetch_metadata;
use super::models::{AssembledDocument, BookMetadata, PageRange, ResolvedTarget};
use super::progress::CombinedProgress;
use crate::base_system::book_ref;
use crate::base_system::context::{Config, safe_fs_name};
use crate::book_parser::pdf_generator::PdfGenerator;
use crate::network_parser::network::RelayNetwork;

pub struct BookSession {
    network: RelayNetwork,
    cache: Option<ImageCache>,
    jpeg_quality: u8,
    metadata_retry: bool,
    target: Option<ResolvedTarget>,
    meta: Option<BookMetadata>,
}

impl BookSession {
    pub fn new(config: &Config) -> DownloadResult<Self> {
        Ok(Self {
            network: RelayNetwork::new(config)?,
            cache: ImageCache::from_config(config),
            jpeg_quality: config.jpeg_quality,
            metadata_retry: config.metadata_retry,
            target: None,
            meta: None,
        })
    }

    /// 解析链接并获取书本信息，替换当前书本。
    pub async fn load(&mut self, raw: &str) -> DownloadResult<&BookMetadata> {
        self.reset();
        let target = book_ref::resolve(raw)?;

        let meta = match fetch_metadata(&self.network, &target).await {
            Err(e) if e.is_transport() && self.metadata_retry => {
                warn!(target: "download", error = %e, "获取书本信息失败，重试一次");
                fetch_metadata(&self.network, &target).await?
            }
            other => other?,
        };

        self.target = Some(target);
        let meta: &BookMetadata = self.meta.insert(meta);
        Ok(meta)
    }

    pub fn metadata(&self) -> Option<&BookMetadata> {
        self.meta.as_ref()
    }

    pub fn target(&self) -> Option<&ResolvedTarget> {
        self.target.as_ref()
    }

    pub fn reset(&mut self) {
        self.target = None;
        self.meta = None;
    }

    /// 封面图片的中转地址。封面固定取第 1 页，与 start_page 无关。
    pub fn cover_url(&self) -> Option<String> {
        let meta = self.meta.as_ref()?;
        self.network.relay_url(&meta.upstream_image_url(1)).ok()
    }

    /// 保存用的文件名：书名为空时退回书本标识。
    pub fn document_name(&self) -> Option<String> {
        let meta = self.meta.as_ref()?;
        if !meta.title.trim().is_empty() {
            return Some(meta.title.trim().to_string());
        }
        self.target.as_ref().map(|t| t.book_id().to_string())
    }

    pub fn uses_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn download(
        &self,
        range: PageRange,
        progress: &Arc<CombinedProgress>,
    ) -> DownloadResult<AssembledDocument> {
        let meta = self.meta.as_ref().ok_or(DownloadError::BookNotLoaded)?;
        build_document(
            &self.network,
            self.cache.as_ref(),
            meta,
            range,
            self.jpeg_quality,
            progress,
        )
        .await
    }
}

/// 抓图并组装 PDF。抓图占总进度 80%，组装占 20%。
pub(crate) async fn build_document<S: ImageSource>(
    source: &S,
    cache: Option<&ImageCache>,
    meta: &BookMetadata,
    range: PageRange,
    jpeg_quality: u8,
    progress: &Arc<CombinedProgress>,
) -> DownloadResult<AssembledDocument> {
    meta.ensure_accessible()?;
    let started = Instant::now();
    progress.reset();

    let strategy = AcquireStrategy::select(cache, jpeg_quality);
    let acquisition = progress.acquisition_phase(range.len());
    let images = acquire_images(source, &strategy, meta, range, &acquisition).await?;

    let assembly = progress.assembly_phase(images.len());
    let doc = PdfGenerator::new(jpeg_quality)
        .with_title(meta.title.clone())
        .assemble(&images, &assembly)
        .await?;
    drop(images);

    info!(
        target: "download",
        pages = doc.page_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "PDF 已生成"
    );
    Ok(doc)
}

/// 把生成的 PDF 写入目录，文件名取自书名。
///
/// 不允许覆盖时，在文件名后追加序号。
pub fn save_document(
    doc: &AssembledDocument,
    title: &str,
    dir: &Path,
    overwrite: bool,
) -> DownloadResult<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| DownloadError::io(dir, e))?;
    let stem = safe_fs_name(title, "_", 120);

    let mut path = dir.join(format!("{stem}.pdf"));
    let mut n = 1;
    while !overwrite && path.exists() {
        path = dir.join(format!("{stem} ({n}).pdf"));
        n += 1;
    }

    std::fs::write(&path, &doc.bytes).map_err(|e| DownloadError::io(&path, e))?;
    info!(target: "download", path = %path.display(), mime = AssembledDocument::MIME, "已保存");
    Ok(path)
}
