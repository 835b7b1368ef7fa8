//! 经跨域中转服务访问上游：书本配置（POST）与页面图片（GET）。
//!
//! 上游接口不允许浏览器直接跨域调用，所有请求都以 `?url=<上游地址>` 的形式
//! 交给中转服务转发；图片缓存也以这个完整的中转地址作为键。

use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue,
    USER_AGENT,
};
use reqwest::{Client, Request, Url};
use serde_json::json;
use tracing::debug;

use crate::base_system::context::Config;
use crate::download::acquire::ImageSource;
use crate::download::errors::{DownloadError, DownloadResult};

#[derive(Debug, Clone)]
pub(crate) struct RelayNetwork {
    client: Client,
    relay_endpoint: String,
    metadata_service_url: String,
    authorization: String,
}

impl RelayNetwork {
    pub(crate) fn new(config: &Config) -> DownloadResult<Self> {
        // reqwest 未启用 gzip 解码，要求上游返回原始字节
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout());
        if let Some(t) = config.connect_timeout() {
            builder = builder.connect_timeout(t);
        }

        Ok(Self {
            client: builder.build()?,
            relay_endpoint: config.relay_endpoint.trim().to_string(),
            metadata_service_url: config.metadata_service_url.trim().to_string(),
            authorization: config.relay_authorization.clone(),
        })
    }

    /// 把上游地址包装成中转地址。
    pub(crate) fn relay_url(&self, upstream: &str) -> DownloadResult<String> {
        relay_url(&self.relay_endpoint, upstream)
    }

    /// 请求书本配置，返回原始响应体（外层 JSON）。非 2xx 视为传输错误。
    pub(crate) async fn fetch_book_config(&self, book_id: &str) -> DownloadResult<String> {
        let request = self.book_config_request(book_id)?;
        debug!(target: "network", book_id, url = %request.url(), "请求书本配置");
        let resp = self.client.execute(request).await?.error_for_status()?;
        Ok(resp.text().await?)
    }

    /// 构造书本配置请求：经中转 POST 到书本配置服务。
    fn book_config_request(&self, book_id: &str) -> DownloadResult<Request> {
        let url = self.relay_url(&self.metadata_service_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        if let Ok(v) = HeaderValue::from_str(&self.authorization) {
            headers.insert(AUTHORIZATION, v);
        }

        Ok(self
            .client
            .post(url)
            .headers(headers)
            .json(&json!({ "ebookNewName": book_id, "userId": null }))
            .build()?)
    }
}

impl ImageSource for RelayNetwork {
    async fn fetch(&self, url: &str) -> DownloadResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "image/*,*/*")
            .send()
            .await?
            .error_for_status()?;
        let bytes = resp.bytes().await?;
        debug!(target: "network", %url, len = bytes.len(), "图片下载完成");
        Ok(bytes.to_vec())
    }

    fn image_url(&self, upstream: &str) -> DownloadResult<String> {
        self.relay_url(upstream)
    }
}

pub(crate) fn relay_url(relay_endpoint: &str, upstream: &str) -> DownloadResult<String> {
    Url::parse_with_params(relay_endpoint, &[("url", upstream)])
        .map(String::from)
        .map_err(|e| DownloadError::Transport(format!("bad relay endpoint {relay_endpoint}: {e}")))
}
