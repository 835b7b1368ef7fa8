//! 图片解码、JPEG 转码与格式识别。

use std::io::Cursor;

use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{DynamicImage, ExtendedColorType, ImageDecoder};
use sha1::{Digest, Sha1};

// ── 哈希 ────────────────────────────────────────────────────────

pub(crate) fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

// ── MIME 识别 ───────────────────────────────────────────────────

pub(crate) fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.len() >= 3 && bytes[..3] == [0xFF, 0xD8, 0xFF] {
        return "image/jpeg";
    }
    if bytes.len() >= 8 && bytes[..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
        return "image/png";
    }
    if bytes.len() >= 6 && &bytes[0..3] == b"GIF" {
        return "image/gif";
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    "application/octet-stream"
}

// ── 解码 / 转码 ─────────────────────────────────────────────────

pub(crate) fn decode(bytes: &[u8]) -> image::ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// 按原始像素尺寸重新编码为 JPEG（丢弃透明通道）。
pub(crate) fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode(&rgb, rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(out)
}

/// PDF 中 DCTDecode 图像所需的头信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
}

pub(crate) fn jpeg_info(bytes: &[u8]) -> image::ImageResult<JpegInfo> {
    let decoder = JpegDecoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.original_color_type() {
        ExtendedColorType::L8 | ExtendedColorType::L16 => "DeviceGray",
        ExtendedColorType::Cmyk8 => "DeviceCMYK",
        _ => "DeviceRGB",
    };
    Ok(JpegInfo {
        width,
        height,
        color_space,
    })
}

#[cfg(test)]
pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7) as u8, (y * 5) as u8, 128])
    }));
    encode_jpeg(&img, 80).expect("encode sample jpeg")
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([10, 20, 30, 128]),
    ));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode sample png");
    out.into_inner()
}
