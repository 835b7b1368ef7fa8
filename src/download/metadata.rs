//! 书本元数据获取。
//!
//! 中转服务返回的 `bookConfig` 本身是一段 JSON 字符串，需要二次解析；
//! 外层的 `accessibleBook` 是可访问性的唯一依据，覆盖内层同名字段。

use serde::Deserialize;
use tracing::{info, warn};

use super::errors::{DownloadError, DownloadResult};
use super::models::{BookMetadata, ImagePaths, ResolvedTarget};
use crate::network_parser::network::RelayNetwork;

#[derive(Debug, Deserialize)]
struct BookInfoResponse {
    #[serde(rename = "accessibleBook", default)]
    accessible_book: bool,
    #[serde(rename = "bookConfig")]
    book_config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BookConfig {
    #[serde(rename = "HomeURL", deserialize_with = "string_or_scalar")]
    home_url: String,
    #[serde(rename = "RightToLeft", deserialize_with = "string_or_scalar")]
    right_to_left: String,
    #[serde(rename = "appLogoIcon", deserialize_with = "string_or_scalar")]
    app_logo_icon: String,
    #[serde(rename = "backGroundImgURL", deserialize_with = "string_or_scalar")]
    background_image_url: String,
    #[serde(rename = "largePath", deserialize_with = "string_or_scalar")]
    large_path: String,
    #[serde(rename = "normalPath", deserialize_with = "string_or_scalar")]
    normal_path: String,
    #[serde(rename = "thumbPath", deserialize_with = "string_or_scalar")]
    thumb_path: String,
    #[serde(rename = "startPage", deserialize_with = "number_or_string")]
    start_page: u32,
    #[serde(rename = "totalPageCount", deserialize_with = "number_or_string")]
    total_page_count: u32,
    #[serde(deserialize_with = "string_or_scalar")]
    title: String,
}

/// 一次请求获取书本元数据，不做缓存、不自动重试。
pub(crate) async fn fetch_metadata(
    network: &RelayNetwork,
    target: &ResolvedTarget,
) -> DownloadResult<BookMetadata> {
    let body = network.fetch_book_config(target.book_id()).await?;
    let meta = parse_book_info(&body, target)?;
    if meta.accessible {
        info!(
            target: "download",
            book_id = target.book_id(),
            title = %meta.title,
            pages = meta.total_page_count,
            "书本信息获取成功"
        );
    } else {
        warn!(target: "download", book_id = target.book_id(), "书本不可访问");
    }
    Ok(meta)
}

pub(crate) fn parse_book_info(body: &str, target: &ResolvedTarget) -> DownloadResult<BookMetadata> {
    let outer: BookInfoResponse = serde_json::from_str(body)
        .map_err(|e| DownloadError::MalformedMetadata(format!("response: {e}")))?;
    let inner = outer
        .book_config
        .as_deref()
        .ok_or_else(|| DownloadError::MalformedMetadata("bookConfig missing".to_string()))?;
    let config: BookConfig = serde_json::from_str(inner)
        .map_err(|e| DownloadError::MalformedMetadata(format!("bookConfig: {e}")))?;

    Ok(BookMetadata {
        origin_url: target.origin().to_string(),
        accessible: outer.accessible_book,
        home_url: config.home_url,
        text_direction: config.right_to_left,
        image_paths: ImagePaths {
            normal: config.normal_path,
            large: config.large_path,
            thumb: config.thumb_path,
        },
        start_page: config.start_page,
        total_page_count: config.total_page_count,
        title: config.title,
        app_logo_icon: config.app_logo_icon,
        background_image_url: config.background_image_url,
    })
}

fn number_or_string<'de, D>(de: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid page number {n}"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid page number {s:?}"))),
        serde_json::Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("invalid page number {other}"))),
    }
}

fn string_or_scalar<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::base_system::book_ref::resolve;

    fn target() -> ResolvedTarget {
        resolve("https://www.myeschoolhome.com/mEBook.html?name=abc123").unwrap()
    }

    fn body(accessible: bool, config: serde_json::Value) -> String {
        json!({ "accessibleBook": accessible, "bookConfig": config.to_string() }).to_string()
    }

    #[test]
    fn parses_nested_config() {
        let raw = body(
            true,
            json!({
                "startPage": 1,
                "totalPageCount": 3,
                "largePath": "/lib/abc123/large/",
                "normalPath": "/lib/abc123/normal/",
                "thumbPath": "/lib/abc123/thumb/",
                "title": "Science 4",
                "RightToLeft": "false",
                "HomeURL": "https://www.myeschoolhome.com/"
            }),
        );
        let meta = parse_book_info(&raw, &target()).unwrap();
        assert!(meta.accessible);
        assert_eq!(meta.total_page_count, 3);
        assert_eq!(meta.start_page, 1);
        assert_eq!(meta.title, "Science 4");
        assert_eq!(meta.origin_url, "https://www.myeschoolhome.com");
        assert_eq!(
            meta.upstream_image_url(3),
            "https://www.myeschoolhome.com/lib/abc123/large/3.jpg"
        );
        assert!(!meta.is_right_to_left());
    }

    #[test]
    fn outer_accessibility_wins() {
        let raw = body(
            false,
            json!({ "accessibleBook": true, "totalPageCount": "12", "RightToLeft": true }),
        );
        let meta = parse_book_info(&raw, &target()).unwrap();
        assert!(!meta.accessible);
        assert_eq!(meta.total_page_count, 12);
        assert!(meta.is_right_to_left());
    }

    #[test]
    fn null_and_numeric_text_fields_are_tolerated() {
        let raw = body(
            true,
            json!({
                "startPage": 1,
                "totalPageCount": 3,
                "largePath": "/l/",
                "normalPath": null,
                "HomeURL": null,
                "title": 2024,
                "appLogoIcon": null,
                "backGroundImgURL": null
            }),
        );
        let meta = parse_book_info(&raw, &target()).unwrap();
        assert_eq!(meta.title, "2024");
        assert_eq!(meta.app_logo_icon, "");
        assert_eq!(meta.background_image_url, "");
        assert_eq!(meta.image_paths.normal, "");
        assert_eq!(
            meta.upstream_image_url(2),
            "https://www.myeschoolhome.com/l/2.jpg"
        );
    }

    #[test]
    fn malformed_inner_config_fails_closed() {
        let raw = json!({ "accessibleBook": true, "bookConfig": "{not json" }).to_string();
        assert!(matches!(
            parse_book_info(&raw, &target()),
            Err(DownloadError::MalformedMetadata(_))
        ));

        let raw = json!({ "accessibleBook": true }).to_string();
        assert!(matches!(
            parse_book_info(&raw, &target()),
            Err(DownloadError::MalformedMetadata(_))
        ));

        assert!(matches!(
            parse_book_info("<html>bad gateway</html>", &target()),
            Err(DownloadError::MalformedMetadata(_))
        ));
    }

    /// 本地假中转：读完一个请求后返回固定响应，并把请求原文交回测试。
    async fn serve_once(
        status: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = format!("http://{}/", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let len = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + len || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (relay, handle)
    }

    fn network_for(relay: &str) -> RelayNetwork {
        let mut cfg = crate::base_system::context::Config::default();
        cfg.relay_endpoint = relay.to_string();
        RelayNetwork::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_parses_through_relay() {
        let raw = body(true, json!({ "totalPageCount": 4, "largePath": "/p/", "title": "Maths" }));
        let (relay, server) = serve_once("200 OK", raw).await;

        let meta = fetch_metadata(&network_for(&relay), &target()).await.unwrap();
        assert_eq!(meta.total_page_count, 4);
        assert_eq!(meta.title, "Maths");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /?url=https%3A%2F%2Fwww.myeschoolhome.com"));
        assert!(request.contains(r#""ebookNewName":"abc123""#));
        assert!(request.contains(r#""userId":null"#));
    }

    #[tokio::test]
    async fn relay_error_status_is_transport_error() {
        let (relay, server) = serve_once("502 Bad Gateway", String::new()).await;
        let res = fetch_metadata(&network_for(&relay), &target()).await;
        assert!(matches!(res, Err(ref e) if e.is_transport()));
        server.await.unwrap();
    }
}
