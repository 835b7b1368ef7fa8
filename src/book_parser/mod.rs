//! 图片处理与 PDF 生成。

pub(crate) mod image_utils;
pub mod pdf_generator;
