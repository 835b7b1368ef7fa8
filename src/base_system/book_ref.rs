//! 书本链接解析与规范化。
//!
//! 只接受 myeschoolhome 的电子书阅读页链接，并从 `name` 参数中取出书本标识。

use reqwest::Url;

use crate::download::errors::{DownloadError, DownloadResult};
use crate::download::models::ResolvedTarget;

const ALLOWED_HOSTS: [&str; 2] = ["www.myeschoolhome.com", "myeschoolhome.com"];
const ALLOWED_PATHS: [&str; 2] = ["/ebook.html", "/mebook.html"];

pub fn resolve(raw: &str) -> DownloadResult<ResolvedTarget> {
    let trimmed = raw.trim();
    let url =
        Url::parse(trimmed).map_err(|e| DownloadError::InvalidReference(format!("{trimmed}: {e}")))?;

    let host = match (url.host_str(), url.port()) {
        (Some(h), Some(port)) => format!("{h}:{port}"),
        (Some(h), None) => h.to_string(),
        (None, _) => String::new(),
    };
    if !ALLOWED_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
        return Err(DownloadError::UnsupportedOrigin(host));
    }

    let path = url.path().to_string();
    if !ALLOWED_PATHS.contains(&path.to_ascii_lowercase().as_str()) {
        return Err(DownloadError::UnsupportedOrigin(path));
    }

    let book_id = url
        .query_pairs()
        .find(|(k, _)| k == "name")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or(DownloadError::MissingIdentifier)?;

    Ok(ResolvedTarget {
        origin: url.origin().ascii_serialization(),
        path,
        book_id,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("https://www.myeschoolhome.com/mEBook.html?name=abc123", "abc123")]
    #[case("  https://myeschoolhome.com/eBook.html?name=xyz  ", "xyz")]
    #[case("HTTPS://WWW.MYESCHOOLHOME.COM/EBOOK.HTML?name=Up", "Up")]
    #[case("https://www.myeschoolhome.com/mebook.html?lang=ar&name=a%20b", "a b")]
    fn accepts_supported_links(#[case] raw: &str, #[case] expected: &str) {
        let target = resolve(raw).unwrap();
        assert_eq!(target.book_id(), expected);
    }

    #[rstest]
    #[case("https://evil.example.com/mEBook.html?name=abc123")]
    #[case("https://www.myeschoolhome.com.evil.com/mEBook.html?name=abc123")]
    #[case("https://www.myeschoolhome.com:8443/mEBook.html?name=abc123")]
    #[case("https://www.myeschoolhome.com/library/mEBook.html?name=abc123")]
    #[case("https://www.myeschoolhome.com/index.html?name=abc123")]
    fn rejects_unsupported_origins(#[case] raw: &str) {
        assert!(matches!(
            resolve(raw),
            Err(DownloadError::UnsupportedOrigin(_))
        ));
    }

    #[rstest]
    #[case("https://www.myeschoolhome.com/mEBook.html")]
    #[case("https://www.myeschoolhome.com/mEBook.html?name=")]
    #[case("https://www.myeschoolhome.com/mEBook.html?id=abc123")]
    fn rejects_missing_identifier(#[case] raw: &str) {
        assert!(matches!(resolve(raw), Err(DownloadError::MissingIdentifier)));
    }

    #[rstest]
    #[case("")]
    #[case("not a url")]
    #[case("www.myeschoolhome.com/mEBook.html?name=abc")]
    fn rejects_unparseable_input(#[case] raw: &str) {
        assert!(matches!(
            resolve(raw),
            Err(DownloadError::InvalidReference(_))
        ));
    }

    #[test]
    fn reference_round_trip_keeps_identifier() {
        for id in ["abc123", "with space", "ünï&code=1"] {
            let mut url = Url::parse("https://www.myeschoolhome.com/eBook.html").unwrap();
            url.query_pairs_mut().append_pair("name", id);
            let target = resolve(url.as_str()).unwrap();
            let again = resolve(&target.reference_url()).unwrap();
            assert_eq!(again.book_id(), id);
            assert_eq!(again, target);
        }
    }

    #[test]
    fn origin_is_normalized() {
        let target = resolve("https://MyEschoolHome.com/mEBook.html?name=abc").unwrap();
        assert_eq!(target.origin(), "https://myeschoolhome.com");
        assert_eq!(target.path(), "/mEBook.html");
    }
}
