//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

pub const DEFAULT_RELAY_ENDPOINT: &str = "https://cors.ali-yusuf.com/";
pub const DEFAULT_METADATA_SERVICE_URL: &str =
    "https://www.myeschoolhome.com/library/webservice/ebooks/getEbookConfig";
pub const DEFAULT_CACHE_NAMESPACE: &str = "images";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_relay_endpoint")]
    pub relay_endpoint: String,
    #[serde(default = "default_metadata_service_url")]
    pub metadata_service_url: String,
    #[serde(default = "default_relay_authorization")]
    pub relay_authorization: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub metadata_retry: bool,

    // 缓存配置
    #[serde(default = "default_true")]
    pub enable_image_cache: bool,
    #[serde(default)]
    pub cache_dir: String,
    #[serde(default = "default_cache_namespace")]
    pub cache_namespace: String,

    // 图片配置
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    // 保存配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_true")]
    pub allow_overwrite_files: bool,

    #[serde(skip)]
    data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_endpoint: default_relay_endpoint(),
            metadata_service_url: default_metadata_service_url(),
            relay_authorization: default_relay_authorization(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            metadata_retry: default_true(),
            enable_image_cache: default_true(),
            cache_dir: String::new(),
            cache_namespace: default_cache_namespace(),
            jpeg_quality: default_jpeg_quality(),
            save_path: String::new(),
            allow_overwrite_files: default_true(),
            data_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 13] = [
            FieldMeta {
                name: "relay_endpoint",
                description: "跨域中转服务地址（元数据与图片均经此转发）",
            },
            FieldMeta {
                name: "metadata_service_url",
                description: "上游书本配置接口地址",
            },
            FieldMeta {
                name: "relay_authorization",
                description: "请求中转服务时携带的 Authorization 头",
            },
            FieldMeta {
                name: "request_timeout",
                description: "单次请求超时（秒）",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "连接超时（秒，0 表示不限制）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "metadata_retry",
                description: "获取书本信息遇到网络错误时是否自动重试一次",
            },
            FieldMeta {
                name: "enable_image_cache",
                description: "是否启用本地图片缓存（关闭后改为逐页解码并重新编码 JPEG）",
            },
            FieldMeta {
                name: "cache_dir",
                description: "图片缓存目录（留空则使用数据目录下的 cache）",
            },
            FieldMeta {
                name: "cache_namespace",
                description: "图片缓存命名空间，清理缓存时整体删除",
            },
            FieldMeta {
                name: "jpeg_quality",
                description: "重新编码 JPEG 的质量（1-100）",
            },
            FieldMeta {
                name: "save_path",
                description: "PDF 保存目录（留空则为当前目录）",
            },
            FieldMeta {
                name: "allow_overwrite_files",
                description: "同名 PDF 已存在时是否覆盖",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if reqwest::Url::parse(self.relay_endpoint.trim()).is_err() {
            return Err(ConfigError::Validation(format!(
                "relay_endpoint 不是有效地址: {}",
                self.relay_endpoint
            )));
        }
        if reqwest::Url::parse(self.metadata_service_url.trim()).is_err() {
            return Err(ConfigError::Validation(format!(
                "metadata_service_url 不是有效地址: {}",
                self.metadata_service_url
            )));
        }
        if self.cache_namespace.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cache_namespace 不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.data_dir = dir;
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        if self.cache_dir.trim().is_empty() {
            self.data_dir().join("cache")
        } else {
            PathBuf::from(self.cache_dir.trim())
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout <= 0.0 {
            return None;
        }
        Some(Duration::from_millis((self.connect_timeout * 1000.0).round() as u64))
    }
}

/// 把任意书名转成可用作文件名的字符串。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => fallback,
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节字符中间截断
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
    }
    cleaned
}

fn default_true() -> bool {
    true
}

fn default_relay_endpoint() -> String {
    DEFAULT_RELAY_ENDPOINT.to_string()
}

fn default_metadata_service_url() -> String {
    DEFAULT_METADATA_SERVICE_URL.to_string()
}

fn default_relay_authorization() -> String {
    "Bearer null".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> f64 {
    10.0
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_cache_namespace() -> String {
    DEFAULT_CACHE_NAMESPACE.to_string()
}

fn default_jpeg_quality() -> u8 {
    90
}
