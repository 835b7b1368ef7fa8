//! 把按页排好序的图片组装成 PDF。
//!
//! 每张图片作为一页，页面尺寸等于图片像素尺寸，图片画在原点、不缩放、无边距。

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info};

use super::image_utils::{self, JpegInfo};
use crate::download::errors::{DownloadError, DownloadResult};
use crate::download::join::join_ordered;
use crate::download::models::{AssembledDocument, ImageRecord};
use crate::download::progress::PhaseProgress;

const PRODUCER: &str = concat!("eschool-pdf-downloader ", env!("CARGO_PKG_VERSION"));

pub struct PdfGenerator {
    title: Option<String>,
    jpeg_quality: u8,
}

struct EmbeddedImage {
    page: usize,
    info: JpegInfo,
    stream: Stream,
}

impl PdfGenerator {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            title: None,
            jpeg_quality,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.trim().is_empty()).then_some(title);
        self
    }

    /// 组装文档。`progress` 在全部图片嵌入后前进 `n` 步，排版完成后再前进 `n` 步。
    pub async fn assemble(
        &self,
        images: &[ImageRecord],
        progress: &PhaseProgress,
    ) -> DownloadResult<AssembledDocument> {
        let embedded = join_ordered(images.iter().map(|record| async move {
            self.embed(record)
        }))
        .await?;
        progress.advance(embedded.len());
        debug!(target: "pdf", count = embedded.len(), "图片嵌入完成");

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(embedded.len());
        for image in embedded {
            kids.push(add_page(&mut doc, pages_id, image)?.into());
        }
        let page_count = kids.len();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info_dict = Dictionary::new();
        info_dict.set("Producer", Object::string_literal(PRODUCER));
        if let Some(title) = self.title.as_deref() {
            info_dict.set("Title", text_string(title));
        }
        let info_id = doc.add_object(info_dict);
        doc.trailer.set("Info", info_id);
        progress.advance(page_count);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(|e| DownloadError::Embed {
            page: 0,
            message: format!("serialize pdf: {e}"),
        })?;
        info!(target: "pdf", pages = page_count, size = bytes.len(), "PDF 生成完成");

        Ok(AssembledDocument { bytes, page_count })
    }

    fn embed(&self, record: &ImageRecord) -> DownloadResult<EmbeddedImage> {
        let page = record.page_number as usize;
        let embed_err = |message: String| DownloadError::Embed { page, message };

        let jpeg = if image_utils::sniff_mime(&record.bytes) == "image/jpeg" {
            record.bytes.clone()
        } else {
            let img = image_utils::decode(&record.bytes).map_err(|e| embed_err(e.to_string()))?;
            image_utils::encode_jpeg(&img, self.jpeg_quality)
                .map_err(|e| embed_err(e.to_string()))?
        };
        let info = image_utils::jpeg_info(&jpeg).map_err(|e| embed_err(e.to_string()))?;

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(info.width as i64));
        dict.set("Height", Object::Integer(info.height as i64));
        dict.set("ColorSpace", Object::Name(info.color_space.as_bytes().to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        if info.color_space == "DeviceCMYK" {
            // Adobe 写出的 CMYK JPEG 是反相的
            dict.set(
                "Decode",
                vec![1.into(), 0.into(), 1.into(), 0.into(), 1.into(), 0.into(), 1.into(), 0.into()],
            );
        }

        Ok(EmbeddedImage {
            page,
            info,
            stream: Stream::new(dict, jpeg),
        })
    }
}

fn add_page(doc: &mut Document, pages_id: ObjectId, image: EmbeddedImage) -> DownloadResult<ObjectId> {
    let page = image.page;
    let (w, h) = (image.info.width as i64, image.info.height as i64);
    let image_id = doc.add_object(image.stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content.encode().map_err(|e| DownloadError::Embed {
        page,
        message: format!("encode page content: {e}"),
    })?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}

/// 非 ASCII 标题按 UTF-16BE（带 BOM）写入。
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_parser::image_utils::{sample_jpeg, sample_png};

    fn records(images: Vec<Vec<u8>>) -> Vec<ImageRecord> {
        images
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| ImageRecord {
                page_index: i,
                page_number: i as u32 + 1,
                bytes,
            })
            .collect()
    }

    fn media_boxes(doc: &Document) -> Vec<(i64, i64)> {
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_object(*id).unwrap().as_dict().unwrap();
                let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
                (mb[2].as_i64().unwrap(), mb[3].as_i64().unwrap())
            })
            .collect()
    }

    #[tokio::test]
    async fn one_page_per_image_sized_to_pixels() {
        let images = records(vec![sample_jpeg(40, 60), sample_jpeg(80, 30), sample_jpeg(25, 25)]);
        let progress = PhaseProgress::new(images.len(), 2);

        let out = PdfGenerator::new(90)
            .with_title("Sample Book")
            .assemble(&images, &progress)
            .await
            .unwrap();

        assert_eq!(out.page_count, 3);
        assert_eq!(progress.units(), 3);
        let doc = Document::load_mem(&out.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert_eq!(media_boxes(&doc), vec![(40, 60), (80, 30), (25, 25)]);
    }

    #[tokio::test]
    async fn non_jpeg_input_is_converted() {
        let images = records(vec![sample_png(12, 9)]);
        let out = PdfGenerator::new(90)
            .assemble(&images, &PhaseProgress::new(1, 2))
            .await
            .unwrap();
        let doc = Document::load_mem(&out.bytes).unwrap();
        assert_eq!(media_boxes(&doc), vec![(12, 9)]);
    }

    #[tokio::test]
    async fn corrupt_image_fails_without_document() {
        let images = records(vec![sample_jpeg(10, 10), b"garbage".to_vec()]);
        let progress = PhaseProgress::new(2, 2);
        let res = PdfGenerator::new(90).assemble(&images, &progress).await;
        assert!(matches!(res, Err(DownloadError::Embed { page: 2, .. })));
        assert_eq!(progress.units(), 0);
    }

    #[tokio::test]
    async fn errors_carry_book_page_numbers() {
        let images = vec![
            ImageRecord {
                page_index: 0,
                page_number: 5,
                bytes: sample_jpeg(10, 10),
            },
            ImageRecord {
                page_index: 1,
                page_number: 6,
                bytes: b"not an image".to_vec(),
            },
        ];
        let res = PdfGenerator::new(90)
            .assemble(&images, &PhaseProgress::new(2, 2))
            .await;
        assert!(matches!(res, Err(DownloadError::Embed { page: 6, .. })));
    }

    #[test]
    fn page_objects_keep_their_page_number() {
        let generator = PdfGenerator::new(90);
        let record = ImageRecord {
            page_index: 0,
            page_number: 7,
            bytes: sample_jpeg(30, 20),
        };
        let image = generator.embed(&record).unwrap();
        assert_eq!(image.page, 7);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = add_page(&mut doc, pages_id, image).unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!((mb[2].as_i64().unwrap(), mb[3].as_i64().unwrap()), (30, 20));
    }

    #[test]
    fn unicode_title_is_utf16() {
        match text_string("كتاب") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(bytes.len(), 2 + 4 * 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
