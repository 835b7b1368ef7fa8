//! 下载流程的错误分类。
//!
//! 解析期错误（链接无效/来源不支持/缺少书本标识）直接展示给用户；
//! 抓取/组装期错误一律 fail-fast，不返回部分结果。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid book link: {0}")]
    InvalidReference(String),
    #[error("not supported book url: {0}")]
    UnsupportedOrigin(String),
    #[error("missing book name in link")]
    MissingIdentifier,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("can't parse response data: {0}")]
    MalformedMetadata(String),
    #[error("book is not accessible")]
    BookNotAccessible,
    #[error("no book loaded, check a book link first")]
    BookNotLoaded,
    #[error("invalid page range {first}~{last} (book has {total} pages)")]
    InvalidRange { first: u32, last: u32, total: u32 },
    #[error("missing image, url: {url}")]
    MissingCachedImage { url: String },
    #[error("empty image blob, url: {url}")]
    EmptyEncodedImage { url: String },
    #[error("failed to decode image {url}: {source}")]
    Decode {
        url: String,
        source: image::ImageError,
    },
    #[error("failed to embed page {page}: {message}")]
    Embed { page: usize, message: String },
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl DownloadError {
    /// 网络类错误：调用方可以选择重试一次。
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
