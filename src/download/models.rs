//! 下载相关的数据模型定义。
//!
//! 包含解析后的书本目标、书本元数据、页码范围、单页图片记录与最终文档。

use serde::{Deserialize, Serialize};

use super::errors::{DownloadError, DownloadResult};

/// 校验并规范化之后的书本链接。只能由 `book_ref::resolve` 构造。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub(crate) origin: String,
    pub(crate) path: String,
    pub(crate) book_id: String,
}

impl ResolvedTarget {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// 由目标重新拼出书本链接，再次解析应得到相同的 book_id。
    pub fn reference_url(&self) -> String {
        let base = format!("{}{}", self.origin, self.path);
        match reqwest::Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("name", &self.book_id);
                url.to_string()
            }
            Err(_) => format!("{base}?name={}", self.book_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePaths {
    pub normal: String,
    pub large: String,
    pub thumb: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub origin_url: String,
    pub accessible: bool,
    pub home_url: String,
    pub text_direction: String,
    pub image_paths: ImagePaths,
    pub start_page: u32,
    pub total_page_count: u32,
    pub title: String,
    pub app_logo_icon: String,
    pub background_image_url: String,
}

impl BookMetadata {
    pub fn ensure_accessible(&self) -> DownloadResult<()> {
        if self.accessible {
            Ok(())
        } else {
            Err(DownloadError::BookNotAccessible)
        }
    }

    pub fn is_right_to_left(&self) -> bool {
        matches!(
            self.text_direction.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "rtl"
        )
    }

    /// 上游（未经中转）的大图地址。
    pub fn upstream_image_url(&self, page: u32) -> String {
        format!("{}{}{}.jpg", self.origin_url, self.image_paths.large, page)
    }
}

/// 1 起始、闭区间的页码范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    first_page: u32,
    last_page: u32,
}

impl PageRange {
    pub fn new(first_page: u32, last_page: u32, meta: &BookMetadata) -> DownloadResult<Self> {
        meta.ensure_accessible()?;
        let total = meta.total_page_count;
        if first_page < 1 || first_page > last_page || last_page > total {
            return Err(DownloadError::InvalidRange {
                first: first_page,
                last: last_page,
                total,
            });
        }
        Ok(Self {
            first_page,
            last_page,
        })
    }

    /// 默认范围：从 start_page 到最后一页。
    pub fn full(meta: &BookMetadata) -> DownloadResult<Self> {
        Self::new(meta.start_page.max(1), meta.total_page_count, meta)
    }

    pub fn first_page(&self) -> u32 {
        self.first_page
    }

    pub fn last_page(&self) -> u32 {
        self.last_page
    }

    pub fn len(&self) -> usize {
        (self.last_page - self.first_page + 1) as usize
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.first_page..=self.last_page
    }

    pub(crate) fn contained_in(&self, meta: &BookMetadata) -> bool {
        self.first_page >= 1 && self.last_page <= meta.total_page_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// 在请求范围内的位置，排序键。
    pub page_index: usize,
    pub page_number: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

impl AssembledDocument {
    pub const MIME: &'static str = "application/pdf";
}

#[cfg(test)]
pub(crate) fn sample_metadata(total: u32) -> BookMetadata {
    BookMetadata {
        origin_url: "https://www.myeschoolhome.com".to_string(),
        accessible: true,
        home_url: String::new(),
        text_direction: "false".to_string(),
        image_paths: ImagePaths {
            normal: "/books/abc123/normal/".to_string(),
            large: "/books/abc123/large/".to_string(),
            thumb: "/books/abc123/thumb/".to_string(),
        },
        start_page: 1,
        total_page_count: total,
        title: "Sample Book".to_string(),
        app_logo_icon: String::new(),
        background_image_url: String::new(),
    }
}
